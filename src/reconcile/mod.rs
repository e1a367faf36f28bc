//! Reconciliation of the applied adapter set against a requested set.

mod plan;
mod session;

pub use plan::{plan, Plan};
pub use session::AdapterSession;
