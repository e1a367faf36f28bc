pub mod adapter;
pub mod backend;
pub mod config;
pub mod reconcile;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
