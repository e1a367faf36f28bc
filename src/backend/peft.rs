//! Generic multi-adapter backend.
//!
//! Drives a model wrapper that can host several adapters at once and
//! supports incremental attach. Detach is all-or-nothing: the wrapper
//! can only fall back to the bare base model.

use candle_core::{DType, Device};

use super::{AdapterBackend, AdapterSlots, BackendError, BackendKind};
use crate::adapter::{AdapterLoader, LoraAdapter};
use crate::config::RuntimeConfig;

/// Model-side primitives the generic backend drives.
///
/// Implementations own the actual weight injection; how a pair of
/// low-rank factors modifies a linear layer is their business.
pub trait AdapterSink {
    /// Inject an adapter into the model.
    fn install(&mut self, adapter: LoraAdapter) -> candle_core::Result<()>;

    /// Strip every adapter, restoring the bare base model.
    fn remove_all(&mut self) -> candle_core::Result<()>;

    /// Cast adapter weights and place them alongside the model. Device
    /// map details (parameter-name prefixes and all) are the sink's
    /// concern.
    fn relocate(&mut self, dtype: DType, device: &Device) -> candle_core::Result<()>;
}

pub struct PeftBackend {
    sink: Box<dyn AdapterSink>,
    loader: AdapterLoader,
    wants_post_load: bool,
    device: Device,
}

impl PeftBackend {
    pub fn new(sink: Box<dyn AdapterSink>, config: &RuntimeConfig, device: Device) -> Self {
        let loader = AdapterLoader::new(&config.lora_dir, device.clone(), DType::F32);
        Self {
            sink,
            loader,
            wants_post_load: config.wants_post_load(),
            device,
        }
    }

    fn load_and_install(&mut self, name: &str) -> Result<(), BackendError> {
        let adapter = self.loader.load(name)?;
        tracing::info!(adapter = name, layers = adapter.num_layers(), "attaching adapter");
        self.sink.install(adapter)?;
        Ok(())
    }
}

impl AdapterBackend for PeftBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Peft
    }

    fn slots(&self) -> AdapterSlots {
        AdapterSlots::Unbounded
    }

    fn ensure_ready(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn attach_base(&mut self, name: &str) -> Result<(), BackendError> {
        self.load_and_install(name)
    }

    fn attach(&mut self, name: &str) -> Result<(), BackendError> {
        self.load_and_install(name)
    }

    fn detach_all(&mut self) -> Result<(), BackendError> {
        self.sink.remove_all()?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), BackendError> {
        if self.wants_post_load {
            self.sink.relocate(DType::F16, &self.device)?;
        }
        Ok(())
    }
}
