//! Session state and the apply operation.

use crate::backend::{AdapterBackend, AdapterSlots, BackendError, BackendKind};

use super::plan::{plan, Plan};

/// Adapter state for one loaded model.
///
/// Owns the backend handle chosen at model-load time together with the
/// record of currently attached adapter names. The record lives and
/// dies with the model: construct a fresh session (or `invalidate`)
/// whenever the model is reloaded or swapped.
///
/// Calls are synchronous and blocking; callers must serialize them.
pub struct AdapterSession {
    backend: Box<dyn AdapterBackend>,
    active: Vec<String>,
}

impl AdapterSession {
    pub fn new(backend: Box<dyn AdapterBackend>) -> Self {
        Self {
            backend,
            active: Vec::new(),
        }
    }

    /// Adapter names currently attached, in attach order. The first
    /// entry is the primary adapter.
    pub fn active(&self) -> &[String] {
        &self.active
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Forget the attach record without touching the model. For use
    /// when the underlying model has been reloaded or swapped and the
    /// record no longer describes it.
    pub fn invalidate(&mut self) {
        self.active.clear();
    }

    /// Reconcile the attached adapter set with `requested`.
    ///
    /// Capability problems (a backend that cannot apply adapters at
    /// all) are logged and abort the operation with state unchanged.
    /// I/O and tensor errors propagate; a propagated error during a
    /// rebuild leaves `active` describing whatever was attached before
    /// the failure.
    pub fn apply(&mut self, requested: &[String]) -> Result<(), BackendError> {
        match self.backend.ensure_ready() {
            Ok(()) => {}
            Err(BackendError::Unsupported(reason)) => {
                tracing::error!(reason, "adapter application unavailable, skipping");
                return Ok(());
            }
            Err(other) => return Err(other),
        }

        let requested = self.clamp(requested);

        match plan(&self.active, &requested) {
            Plan::Unchanged => Ok(()),
            Plan::Attach(added) => {
                tracing::info!(adapters = ?added, "attaching adapters incrementally");
                for name in &added {
                    self.backend.attach(name)?;
                    self.active.push(name.clone());
                }
                Ok(())
            }
            Plan::Rebuild { reset } => {
                if reset {
                    self.backend.detach_all()?;
                    self.active.clear();
                }
                if let Some((first, rest)) = requested.split_first() {
                    tracing::info!(adapters = ?requested, "applying adapters from scratch");
                    self.backend.attach_base(first)?;
                    self.active.push(first.clone());
                    for name in rest {
                        self.backend.attach(name)?;
                        self.active.push(name.clone());
                    }
                    self.backend.finalize()?;
                }
                Ok(())
            }
        }
    }

    /// Truncate the request to backend capacity, warning when adapters
    /// get dropped.
    fn clamp(&self, requested: &[String]) -> Vec<String> {
        match self.backend.slots() {
            AdapterSlots::Single if requested.len() > 1 => {
                tracing::warn!(
                    kept = %requested[0],
                    dropped = requested.len() - 1,
                    "backend holds a single adapter; extras ignored"
                );
                requested[..1].to_vec()
            }
            _ => requested.to_vec(),
        }
    }
}
