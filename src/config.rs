use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Runtime flags governing how adapters are applied.
///
/// Mirrors the launch flags of the serving process: where adapter
/// directories live and whether post-load precision/placement steps
/// should run.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Root directory containing one subdirectory per adapter.
    #[serde(default = "default_lora_dir")]
    pub lora_dir: PathBuf,
    /// CPU-only mode. Skips the post-load precision cast and device
    /// placement.
    #[serde(default)]
    pub cpu: bool,
    /// Model weights are held in 8-bit. The post-load cast would
    /// corrupt them, so it is skipped.
    #[serde(default)]
    pub load_in_8bit: bool,
}

fn default_lora_dir() -> PathBuf {
    PathBuf::from("loras")
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lora_dir: default_lora_dir(),
            cpu: false,
            load_in_8bit: false,
        }
    }
}

impl RuntimeConfig {
    /// Directory holding a named adapter's config and weight files.
    pub fn adapter_dir(&self, name: &str) -> PathBuf {
        self.lora_dir.join(name)
    }

    /// Whether the post-load precision cast and device placement
    /// should run at all.
    pub fn wants_post_load(&self) -> bool {
        !self.cpu && !self.load_in_8bit
    }

    /// Override the adapter root, keeping other flags.
    pub fn with_lora_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.lora_dir = dir.as_ref().to_path_buf();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.lora_dir, PathBuf::from("loras"));
        assert!(!config.cpu);
        assert!(!config.load_in_8bit);
        assert!(config.wants_post_load());
    }

    #[test]
    fn parse_partial_json() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"lora_dir": "/srv/adapters", "cpu": true}"#)
                .expect("failed to parse config");
        assert_eq!(config.lora_dir, PathBuf::from("/srv/adapters"));
        assert!(config.cpu);
        assert!(!config.load_in_8bit);
        assert!(!config.wants_post_load());
    }

    #[test]
    fn adapter_dir_joins_name() {
        let config = RuntimeConfig::default().with_lora_dir("/data/loras");
        assert_eq!(
            config.adapter_dir("sql-assistant"),
            PathBuf::from("/data/loras/sql-assistant")
        );
    }

    #[test]
    fn eight_bit_suppresses_post_load() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"load_in_8bit": true}"#).expect("failed to parse config");
        assert!(!config.wants_post_load());
    }
}
