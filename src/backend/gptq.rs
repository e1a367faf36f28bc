//! Quantized-engine backend.
//!
//! The quantized representation can only *merge* an adapter into its
//! weights; it cannot detach one in place. Clearing a merged adapter
//! therefore means reloading the whole model from scratch, and only one
//! adapter can be held at a time.

use candle_core::{DType, Device};

use super::{AdapterBackend, AdapterSlots, BackendError, BackendKind};
use crate::adapter::{AdapterLoader, LoraAdapter};
use crate::config::RuntimeConfig;

/// Adapter configuration handed to the quantized merge entry point.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Merge for inference only; no trainable state is kept.
    pub inference_mode: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            inference_mode: true,
        }
    }
}

/// The quantized model's adapter-merge entry point.
pub trait MergeTarget {
    /// Whether this build of the engine can merge adapters at all.
    fn supports_adapter_merge(&self) -> bool;

    fn merge_adapter(
        &mut self,
        adapter: &LoraAdapter,
        config: &MergeConfig,
    ) -> candle_core::Result<()>;
}

/// Full model reload, provided by the model loader.
pub trait ModelReload {
    fn reload(&mut self) -> Result<(), String>;
}

pub struct GptqBackend {
    target: Box<dyn MergeTarget>,
    reloader: Box<dyn ModelReload>,
    loader: AdapterLoader,
    merged: bool,
}

impl GptqBackend {
    pub fn new(
        target: Box<dyn MergeTarget>,
        reloader: Box<dyn ModelReload>,
        config: &RuntimeConfig,
        device: Device,
    ) -> Self {
        let loader = AdapterLoader::new(&config.lora_dir, device, DType::F32);
        Self {
            target,
            reloader,
            loader,
            merged: false,
        }
    }
}

impl AdapterBackend for GptqBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gptq
    }

    fn slots(&self) -> AdapterSlots {
        AdapterSlots::Single
    }

    fn ensure_ready(&self) -> Result<(), BackendError> {
        if self.target.supports_adapter_merge() {
            Ok(())
        } else {
            Err(BackendError::Unsupported(
                "this build of the quantized engine has no adapter-merge support",
            ))
        }
    }

    fn attach_base(&mut self, name: &str) -> Result<(), BackendError> {
        let adapter = self.loader.load(name)?;
        tracing::info!(adapter = name, "merging adapter into quantized model");
        self.target.merge_adapter(&adapter, &MergeConfig::default())?;
        self.merged = true;
        Ok(())
    }

    fn attach(&mut self, _name: &str) -> Result<(), BackendError> {
        Err(BackendError::Unsupported(
            "quantized engine holds at most one adapter",
        ))
    }

    fn detach_all(&mut self) -> Result<(), BackendError> {
        // A merged adapter cannot be separated from the quantized
        // weights; reload the model instead. Nothing to do otherwise.
        if self.merged {
            tracing::info!("reloading model to discard merged adapter");
            self.reloader.reload().map_err(BackendError::Reload)?;
            self.merged = false;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}
