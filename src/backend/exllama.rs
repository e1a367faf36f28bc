//! Fast-inference-engine backend.
//!
//! The engine's generator object carries at most one adapter as a
//! direct slot; applying means building the adapter from its on-disk
//! files and assigning the slot, clearing means emptying it.

use candle_core::{DType, Device};

use super::{AdapterBackend, AdapterSlots, BackendError, BackendKind};
use crate::adapter::{AdapterLoader, LoraAdapter};
use crate::config::RuntimeConfig;

/// The generator object's adapter slot.
pub trait GeneratorHandle {
    fn set_adapter(&mut self, adapter: Option<LoraAdapter>);
}

pub struct ExllamaBackend {
    generator: Box<dyn GeneratorHandle>,
    loader: AdapterLoader,
}

impl ExllamaBackend {
    pub fn new(
        generator: Box<dyn GeneratorHandle>,
        config: &RuntimeConfig,
        device: Device,
    ) -> Self {
        let loader = AdapterLoader::new(&config.lora_dir, device, DType::F16);
        Self { generator, loader }
    }
}

impl AdapterBackend for ExllamaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Exllama
    }

    fn slots(&self) -> AdapterSlots {
        AdapterSlots::Single
    }

    fn ensure_ready(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn attach_base(&mut self, name: &str) -> Result<(), BackendError> {
        let adapter = self.loader.load(name)?;
        tracing::info!(adapter = name, "assigning adapter to generator");
        self.generator.set_adapter(Some(adapter));
        Ok(())
    }

    fn attach(&mut self, _name: &str) -> Result<(), BackendError> {
        Err(BackendError::Unsupported(
            "generator holds at most one adapter",
        ))
    }

    fn detach_all(&mut self) -> Result<(), BackendError> {
        self.generator.set_adapter(None);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NullGenerator;

    #[test]
    fn detach_clears_slot() {
        let generator = NullGenerator::new();
        let mut backend = ExllamaBackend::new(
            Box::new(generator.clone()),
            &RuntimeConfig::default(),
            Device::Cpu,
        );
        backend.detach_all().unwrap();
        assert_eq!(generator.slot(), None);
        assert_eq!(generator.assignments(), 1);
    }

    #[test]
    fn attach_missing_adapter_leaves_slot_alone() {
        let generator = NullGenerator::new();
        let config = RuntimeConfig::default().with_lora_dir("/nonexistent");
        let mut backend = ExllamaBackend::new(Box::new(generator.clone()), &config, Device::Cpu);
        assert!(matches!(
            backend.attach_base("ghost"),
            Err(BackendError::Load(_))
        ));
        assert_eq!(generator.assignments(), 0);
    }
}
