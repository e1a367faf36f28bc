//! Loads adapters from the on-disk directory layout
//! `{lora_dir}/{name}/adapter_config.json` plus
//! `adapter_model.safetensors` (preferred) or `adapter_model.bin`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use thiserror::Error;

use super::types::{AdapterConfig, LoraAdapter, LowRankPair};

/// Errors surfaced while reading adapter files from disk.
#[derive(Debug, Error)]
pub enum AdapterLoadError {
    #[error("adapter directory not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to parse adapter config at {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },
    #[error("no adapter_model.safetensors or adapter_model.bin in {0}")]
    WeightsMissing(PathBuf),
    #[error("failed to load adapter weights: {0}")]
    WeightsLoad(String),
    #[error("mismatched factor shapes for {module}: a={a_shape:?}, b={b_shape:?}")]
    ShapeMismatch {
        module: String,
        a_shape: Vec<usize>,
        b_shape: Vec<usize>,
    },
    #[error("missing lora_a or lora_b factor for module {0}")]
    Incomplete(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads adapters out of a fixed root directory onto a fixed
/// device/dtype.
pub struct AdapterLoader {
    root: PathBuf,
    device: Device,
    dtype: DType,
}

impl AdapterLoader {
    pub fn new(root: impl AsRef<Path>, device: Device, dtype: DType) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            device,
            dtype,
        }
    }

    /// Directory a named adapter resolves to.
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Load a named adapter from `{root}/{name}/`.
    pub fn load(&self, name: &str) -> Result<LoraAdapter, AdapterLoadError> {
        let dir = self.resolve(name);
        if !dir.is_dir() {
            return Err(AdapterLoadError::NotFound(dir));
        }

        let config = self.read_config(&dir)?;
        let weights = self.read_weights(&dir)?;
        build_adapter(name, config, weights)
    }

    fn read_config(&self, dir: &Path) -> Result<AdapterConfig, AdapterLoadError> {
        let path = dir.join("adapter_config.json");
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|e| AdapterLoadError::ConfigParse {
            path,
            reason: e.to_string(),
        })
    }

    fn read_weights(&self, dir: &Path) -> Result<HashMap<String, Tensor>, AdapterLoadError> {
        let safetensors = dir.join("adapter_model.safetensors");
        if safetensors.is_file() {
            let tensors = candle_core::safetensors::load(&safetensors, &self.device)
                .map_err(|e| AdapterLoadError::WeightsLoad(e.to_string()))?;
            return self.convert_all(tensors);
        }

        let bin = dir.join("adapter_model.bin");
        if bin.is_file() {
            let tensors = candle_core::pickle::read_all(&bin)
                .map_err(|e| AdapterLoadError::WeightsLoad(e.to_string()))?;
            return self.convert_all(tensors.into_iter().collect());
        }

        Err(AdapterLoadError::WeightsMissing(dir.to_path_buf()))
    }

    /// Move tensors onto the loader's device/dtype.
    fn convert_all(
        &self,
        tensors: HashMap<String, Tensor>,
    ) -> Result<HashMap<String, Tensor>, AdapterLoadError> {
        tensors
            .into_iter()
            .map(|(name, t)| {
                let t = t
                    .to_device(&self.device)
                    .and_then(|t| t.to_dtype(self.dtype))
                    .map_err(|e| AdapterLoadError::WeightsLoad(e.to_string()))?;
                Ok((name, t))
            })
            .collect()
    }
}

/// Pair up `lora_A`/`lora_B` factors by module and assemble the adapter.
fn build_adapter(
    name: &str,
    config: AdapterConfig,
    weights: HashMap<String, Tensor>,
) -> Result<LoraAdapter, AdapterLoadError> {
    let mut grouped: HashMap<String, (Option<Tensor>, Option<Tensor>)> = HashMap::new();
    for (full_name, tensor) in weights {
        if let Some((module, factor)) = split_weight_name(&full_name) {
            let slot = grouped.entry(module.to_string()).or_default();
            match factor {
                Factor::A => slot.0 = Some(tensor),
                Factor::B => slot.1 = Some(tensor),
            }
        }
    }

    let scale = config.scaling();
    let mut adapter = LoraAdapter::new(name, config);
    for (module, (a, b)) in grouped {
        let a = a.ok_or_else(|| AdapterLoadError::Incomplete(module.clone()))?;
        let b = b.ok_or_else(|| AdapterLoadError::Incomplete(module.clone()))?;
        let (a_shape, b_shape) = (a.dims().to_vec(), b.dims().to_vec());
        let pair = LowRankPair::new(a, b, scale).ok_or(AdapterLoadError::ShapeMismatch {
            module: module.clone(),
            a_shape,
            b_shape,
        })?;
        adapter.insert(module, pair);
    }

    Ok(adapter)
}

enum Factor {
    A,
    B,
}

/// Split a PEFT weight name into (module path, factor).
///
/// `base_model.model.layers.0.self_attn.q_proj.lora_A.weight`
/// becomes `("layers.0.self_attn.q_proj", A)`. Leading
/// `base_model.model.` / `base_model.` / `model.` prefixes and the
/// trailing `.weight` are stripped; lowercase `lora_a`/`lora_b`
/// variants are accepted.
fn split_weight_name(name: &str) -> Option<(&str, Factor)> {
    let name = name
        .strip_prefix("base_model.model.")
        .or_else(|| name.strip_prefix("base_model."))
        .or_else(|| name.strip_prefix("model."))
        .unwrap_or(name);
    let name = name.strip_suffix(".weight").unwrap_or(name);

    for (marker, factor) in [
        (".lora_A", Factor::A),
        (".lora_B", Factor::B),
        (".lora_a", Factor::A),
        (".lora_b", Factor::B),
    ] {
        if let Some(pos) = name.rfind(marker) {
            if pos + marker.len() == name.len() {
                return Some((&name[..pos], factor));
            }
        }
    }
    None
}
