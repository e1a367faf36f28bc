//! Backend capability interface for applying adapters to a loaded model.
//!
//! Each supported model backend gets one `AdapterBackend` implementation,
//! selected once at model-load time and stored with the session. The
//! reconciler drives these primitives; the adapter math itself lives
//! behind the collaborator traits.

mod exllama;
mod gptq;
mod peft;

pub use exllama::{ExllamaBackend, GeneratorHandle};
pub use gptq::{GptqBackend, MergeConfig, MergeTarget, ModelReload};
pub use peft::{AdapterSink, PeftBackend};

use thiserror::Error;

use crate::adapter::AdapterLoadError;

/// Which backend implementation a session was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Generic multi-adapter model wrapper (incremental attach/detach).
    Peft,
    /// Quantized engine; adapters are merged into the quantized weights.
    Gptq,
    /// Fast-inference engine; the adapter rides on the generator object.
    Exllama,
}

/// How many adapters a backend can hold at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterSlots {
    /// At most one adapter; extras in a request are dropped with a warning.
    Single,
    /// No fixed limit.
    Unbounded,
}

/// Errors from backend adapter operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend (or the build of its underlying engine) cannot apply
    /// adapters at all. Caught at the dispatch boundary, never after a
    /// mutation has begun.
    #[error("backend does not support adapter application: {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Load(#[from] AdapterLoadError),
    #[error("model reload failed: {0}")]
    Reload(String),
    #[error("tensor operation failed: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// Adapter attach/detach primitives for one model backend.
///
/// Callers must invoke `ensure_ready` before any mutating call and must
/// not interleave calls from multiple threads; an interrupted sequence
/// can leave the model partially detached.
pub trait AdapterBackend {
    fn kind(&self) -> BackendKind;

    fn slots(&self) -> AdapterSlots;

    /// Availability probe. Fails with [`BackendError::Unsupported`] when
    /// the backend cannot apply adapters; guaranteed not to mutate state.
    fn ensure_ready(&self) -> Result<(), BackendError>;

    /// Attach the first adapter of a from-scratch application.
    fn attach_base(&mut self, name: &str) -> Result<(), BackendError>;

    /// Attach a further adapter without disturbing those already applied.
    fn attach(&mut self, name: &str) -> Result<(), BackendError>;

    /// Restore the un-adapted base model. Destructive: previously
    /// attached adapters must be re-attached from scratch afterwards.
    fn detach_all(&mut self) -> Result<(), BackendError>;

    /// Post-load steps (precision cast, device placement). No-op where
    /// the backend has none or runtime flags suppress them.
    fn finalize(&mut self) -> Result<(), BackendError>;
}
