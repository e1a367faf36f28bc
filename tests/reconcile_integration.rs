//! End-to-end reconciliation scenarios with a real adapter directory.
//!
//! Adapter fixtures are written to a tempdir in the on-disk layout the
//! loader expects (`adapter_config.json` + `adapter_model.safetensors`);
//! model-side effects are observed through the mock collaborators.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};

use lora_switch::backend::{ExllamaBackend, GptqBackend, PeftBackend};
use lora_switch::config::RuntimeConfig;
use lora_switch::reconcile::AdapterSession;
use lora_switch::testing::{CountingReload, MergeProbe, NullGenerator, RecordingSink};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Write a minimal valid adapter under `{root}/{name}/`.
fn write_adapter(root: &Path, name: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();

    std::fs::write(
        dir.join("adapter_config.json"),
        r#"{"r": 2, "lora_alpha": 4, "target_modules": ["q_proj"]}"#,
    )
    .unwrap();

    let mut tensors = HashMap::new();
    tensors.insert(
        "base_model.model.layers.0.self_attn.q_proj.lora_A.weight".to_string(),
        Tensor::zeros((2, 16), DType::F32, &Device::Cpu).unwrap(),
    );
    tensors.insert(
        "base_model.model.layers.0.self_attn.q_proj.lora_B.weight".to_string(),
        Tensor::zeros((16, 2), DType::F32, &Device::Cpu).unwrap(),
    );
    candle_core::safetensors::save(&tensors, dir.join("adapter_model.safetensors")).unwrap();
}

fn peft_session(root: &Path) -> (AdapterSession, RecordingSink) {
    let config = RuntimeConfig::default().with_lora_dir(root);
    let sink = RecordingSink::new();
    let backend = PeftBackend::new(Box::new(sink.clone()), &config, Device::Cpu);
    (AdapterSession::new(Box::new(backend)), sink)
}

#[test]
fn peft_cold_start_attaches_base_adapter() {
    let dir = tempfile::tempdir().unwrap();
    write_adapter(dir.path(), "alpha");
    let (mut session, sink) = peft_session(dir.path());

    session.apply(&names(&["alpha"])).unwrap();

    assert_eq!(session.active(), &names(&["alpha"]));
    assert_eq!(sink.installed(), names(&["alpha"]));
    assert_eq!(sink.relocations(), 1);
}

#[test]
fn peft_incremental_add_leaves_existing_attached() {
    let dir = tempfile::tempdir().unwrap();
    write_adapter(dir.path(), "alpha");
    write_adapter(dir.path(), "beta");
    let (mut session, sink) = peft_session(dir.path());

    session.apply(&names(&["alpha"])).unwrap();
    session.apply(&names(&["alpha", "beta"])).unwrap();

    assert_eq!(session.active(), &names(&["alpha", "beta"]));
    assert_eq!(sink.installed(), names(&["alpha", "beta"]));
    assert_eq!(sink.removals(), 0);
}

#[test]
fn peft_removal_resets_and_reapplies() {
    let dir = tempfile::tempdir().unwrap();
    write_adapter(dir.path(), "alpha");
    write_adapter(dir.path(), "beta");
    let (mut session, sink) = peft_session(dir.path());

    session.apply(&names(&["alpha", "beta"])).unwrap();
    session.apply(&names(&["beta"])).unwrap();

    assert_eq!(session.active(), &names(&["beta"]));
    assert_eq!(sink.removals(), 1);
    // The sink was wiped by the reset; only beta went back on.
    assert_eq!(sink.installed(), names(&["beta"]));
}

#[test]
fn peft_clearing_detaches_everything() {
    let dir = tempfile::tempdir().unwrap();
    write_adapter(dir.path(), "alpha");
    let (mut session, sink) = peft_session(dir.path());

    session.apply(&names(&["alpha"])).unwrap();
    session.apply(&[]).unwrap();

    assert!(session.active().is_empty());
    assert!(sink.installed().is_empty());
    assert_eq!(sink.removals(), 1);
}

#[test]
fn peft_missing_adapter_dir_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, sink) = peft_session(dir.path());

    assert!(session.apply(&names(&["ghost"])).is_err());
    assert!(session.active().is_empty());
    assert!(sink.installed().is_empty());
}

#[test]
fn gptq_honors_first_adapter_only() {
    let dir = tempfile::tempdir().unwrap();
    write_adapter(dir.path(), "alpha");
    write_adapter(dir.path(), "beta");
    let config = RuntimeConfig::default().with_lora_dir(dir.path());

    let probe = MergeProbe::new(true);
    let reload = CountingReload::new();
    let backend = GptqBackend::new(
        Box::new(probe.clone()),
        Box::new(reload.clone()),
        &config,
        Device::Cpu,
    );
    let mut session = AdapterSession::new(Box::new(backend));

    session.apply(&names(&["alpha", "beta"])).unwrap();

    assert_eq!(session.active(), &names(&["alpha"]));
    assert_eq!(probe.merges(), 1);
    assert_eq!(probe.last_merge(), Some(("alpha".to_string(), true)));
    assert_eq!(reload.count(), 0);
}

#[test]
fn gptq_clearing_merged_adapter_reloads_model() {
    let dir = tempfile::tempdir().unwrap();
    write_adapter(dir.path(), "alpha");
    let config = RuntimeConfig::default().with_lora_dir(dir.path());

    let probe = MergeProbe::new(true);
    let reload = CountingReload::new();
    let backend = GptqBackend::new(
        Box::new(probe.clone()),
        Box::new(reload.clone()),
        &config,
        Device::Cpu,
    );
    let mut session = AdapterSession::new(Box::new(backend));

    session.apply(&names(&["alpha"])).unwrap();
    assert_eq!(reload.count(), 0);

    session.apply(&[]).unwrap();
    assert!(session.active().is_empty());
    assert_eq!(reload.count(), 1);
}

#[test]
fn gptq_swapping_adapters_reloads_before_merge() {
    let dir = tempfile::tempdir().unwrap();
    write_adapter(dir.path(), "alpha");
    write_adapter(dir.path(), "beta");
    let config = RuntimeConfig::default().with_lora_dir(dir.path());

    let probe = MergeProbe::new(true);
    let reload = CountingReload::new();
    let backend = GptqBackend::new(
        Box::new(probe.clone()),
        Box::new(reload.clone()),
        &config,
        Device::Cpu,
    );
    let mut session = AdapterSession::new(Box::new(backend));

    session.apply(&names(&["alpha"])).unwrap();
    session.apply(&names(&["beta"])).unwrap();

    assert_eq!(session.active(), &names(&["beta"]));
    assert_eq!(reload.count(), 1);
    assert_eq!(probe.merges(), 2);
    assert_eq!(probe.last_merge(), Some(("beta".to_string(), true)));
}

#[test]
fn gptq_without_merge_support_aborts_untouched() {
    let dir = tempfile::tempdir().unwrap();
    write_adapter(dir.path(), "alpha");
    let config = RuntimeConfig::default().with_lora_dir(dir.path());

    let probe = MergeProbe::new(false);
    let reload = CountingReload::new();
    let backend = GptqBackend::new(
        Box::new(probe.clone()),
        Box::new(reload.clone()),
        &config,
        Device::Cpu,
    );
    let mut session = AdapterSession::new(Box::new(backend));

    session.apply(&names(&["alpha"])).unwrap();

    assert!(session.active().is_empty());
    assert_eq!(probe.merges(), 0);
    assert_eq!(reload.count(), 0);
}

#[test]
fn exllama_assigns_and_clears_generator_slot() {
    let dir = tempfile::tempdir().unwrap();
    write_adapter(dir.path(), "alpha");
    write_adapter(dir.path(), "beta");
    let config = RuntimeConfig::default().with_lora_dir(dir.path());

    let generator = NullGenerator::new();
    let backend = ExllamaBackend::new(Box::new(generator.clone()), &config, Device::Cpu);
    let mut session = AdapterSession::new(Box::new(backend));

    // Only the first of two requested adapters is honored.
    session.apply(&names(&["alpha", "beta"])).unwrap();
    assert_eq!(session.active(), &names(&["alpha"]));
    assert_eq!(generator.slot(), Some("alpha".to_string()));

    session.apply(&[]).unwrap();
    assert!(session.active().is_empty());
    assert_eq!(generator.slot(), None);
}
