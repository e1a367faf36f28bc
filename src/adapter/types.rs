//! Adapter data structures.

use std::collections::HashMap;

use candle_core::Tensor;
use serde::Deserialize;

/// Parsed `adapter_config.json` (PEFT format).
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// LoRA rank.
    pub r: usize,
    /// Scaling numerator (alpha).
    pub lora_alpha: f32,
    /// Module paths the adapter targets.
    pub target_modules: Vec<String>,
    /// Dropout probability; irrelevant at inference time.
    #[serde(default)]
    pub lora_dropout: f32,
    /// Bias handling: "none", "all" or "lora_only".
    #[serde(default = "default_bias")]
    pub bias: String,
    /// Rank-stabilized scaling (alpha / sqrt(r) instead of alpha / r).
    #[serde(default)]
    pub use_rslora: bool,
    /// Base model the adapter was trained against.
    #[serde(default)]
    pub base_model_name_or_path: Option<String>,
}

fn default_bias() -> String {
    "none".to_string()
}

impl AdapterConfig {
    /// Scaling factor applied to the low-rank product.
    pub fn scaling(&self) -> f32 {
        if self.use_rslora {
            self.lora_alpha / (self.r as f32).sqrt()
        } else {
            self.lora_alpha / self.r as f32
        }
    }
}

/// Low-rank factor pair for one target module.
///
/// The adapted output is `base(x) + scale * (x @ a.T @ b.T)` with
/// `a: [rank, in_dim]` and `b: [out_dim, rank]`.
#[derive(Debug, Clone)]
pub struct LowRankPair {
    pub a: Tensor,
    pub b: Tensor,
    pub scale: f32,
}

impl LowRankPair {
    /// Build a pair, validating that both factors are rank-2 and agree
    /// on the inner dimension.
    ///
    /// Returns `None` when the shapes cannot form a low-rank product.
    pub fn new(a: Tensor, b: Tensor, scale: f32) -> Option<Self> {
        let a_dims = a.dims();
        let b_dims = b.dims();
        if a_dims.len() != 2 || b_dims.len() != 2 || a_dims[0] != b_dims[1] {
            return None;
        }
        Some(Self { a, b, scale })
    }

    /// Rank shared by both factors.
    pub fn rank(&self) -> usize {
        self.a.dims()[0]
    }

    /// Input dimension of the adapted module.
    pub fn in_dim(&self) -> usize {
        self.a.dims()[1]
    }

    /// Output dimension of the adapted module.
    pub fn out_dim(&self) -> usize {
        self.b.dims()[0]
    }
}

/// A fully loaded adapter: parsed config plus one factor pair per
/// target module path (e.g. `layers.0.self_attn.q_proj`).
#[derive(Debug, Clone)]
pub struct LoraAdapter {
    pub name: String,
    pub config: AdapterConfig,
    layers: HashMap<String, LowRankPair>,
}

impl LoraAdapter {
    pub fn new(name: impl Into<String>, config: AdapterConfig) -> Self {
        Self {
            name: name.into(),
            config,
            layers: HashMap::new(),
        }
    }

    pub fn insert(&mut self, module: impl Into<String>, pair: LowRankPair) {
        self.layers.insert(module.into(), pair);
    }

    pub fn layer(&self, module: &str) -> Option<&LowRankPair> {
        self.layers.get(module)
    }

    pub fn layers(&self) -> impl Iterator<Item = (&str, &LowRankPair)> {
        self.layers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}
