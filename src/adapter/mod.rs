//! On-disk LoRA adapter artifacts: PEFT-format config and weight files.

mod loader;
mod types;

pub use loader::{AdapterLoadError, AdapterLoader};
pub use types::{AdapterConfig, LoraAdapter, LowRankPair};
