//! Test doubles for the reconciler and backends.
//!
//! Shared-state mocks: each double is `Clone` and all clones observe the
//! same call record, so a clone can be handed to the code under test
//! while the original stays behind for assertions.

use std::sync::{Arc, Mutex};

use candle_core::{DType, Device};

use crate::adapter::{AdapterLoadError, LoraAdapter};
use crate::backend::{
    AdapterBackend, AdapterSink, AdapterSlots, BackendError, BackendKind, GeneratorHandle,
    MergeConfig, MergeTarget, ModelReload,
};

/// One call observed by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    AttachBase(String),
    Attach(String),
    DetachAll,
    Finalize,
}

#[derive(Default)]
struct ScriptedState {
    calls: Vec<BackendCall>,
    fail_next_attach: bool,
}

/// Backend double that records every call instead of touching a model.
#[derive(Clone)]
pub struct ScriptedBackend {
    kind: BackendKind,
    slots: AdapterSlots,
    available: bool,
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedBackend {
    pub fn new(kind: BackendKind, slots: AdapterSlots) -> Self {
        Self {
            kind,
            slots,
            available: true,
            state: Arc::new(Mutex::new(ScriptedState::default())),
        }
    }

    /// Make `ensure_ready` fail with `Unsupported`.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Arm a one-shot failure for the next attach or attach_base.
    pub fn fail_next_attach(&self) {
        self.state.lock().unwrap().fail_next_attach = true;
    }

    fn record_attach(&self, call: BackendCall) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_attach {
            state.fail_next_attach = false;
            return Err(BackendError::Load(AdapterLoadError::WeightsLoad(
                "scripted attach failure".to_string(),
            )));
        }
        state.calls.push(call);
        Ok(())
    }
}

impl AdapterBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn slots(&self) -> AdapterSlots {
        self.slots
    }

    fn ensure_ready(&self) -> Result<(), BackendError> {
        if self.available {
            Ok(())
        } else {
            Err(BackendError::Unsupported("scripted as unavailable"))
        }
    }

    fn attach_base(&mut self, name: &str) -> Result<(), BackendError> {
        self.record_attach(BackendCall::AttachBase(name.to_string()))
    }

    fn attach(&mut self, name: &str) -> Result<(), BackendError> {
        self.record_attach(BackendCall::Attach(name.to_string()))
    }

    fn detach_all(&mut self) -> Result<(), BackendError> {
        self.state.lock().unwrap().calls.push(BackendCall::DetachAll);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), BackendError> {
        self.state.lock().unwrap().calls.push(BackendCall::Finalize);
        Ok(())
    }
}

#[derive(Default)]
struct SinkState {
    installed: Vec<String>,
    removals: usize,
    relocations: usize,
}

/// `AdapterSink` double recording installed adapter names.
#[derive(Clone)]
pub struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState::default())),
        }
    }

    pub fn installed(&self) -> Vec<String> {
        self.state.lock().unwrap().installed.clone()
    }

    pub fn removals(&self) -> usize {
        self.state.lock().unwrap().removals
    }

    pub fn relocations(&self) -> usize {
        self.state.lock().unwrap().relocations
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterSink for RecordingSink {
    fn install(&mut self, adapter: LoraAdapter) -> candle_core::Result<()> {
        self.state.lock().unwrap().installed.push(adapter.name);
        Ok(())
    }

    fn remove_all(&mut self) -> candle_core::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.installed.clear();
        state.removals += 1;
        Ok(())
    }

    fn relocate(&mut self, _dtype: DType, _device: &Device) -> candle_core::Result<()> {
        self.state.lock().unwrap().relocations += 1;
        Ok(())
    }
}

#[derive(Default)]
struct MergeState {
    merges: Vec<(String, bool)>,
}

/// `MergeTarget` double with a switchable capability flag.
#[derive(Clone)]
pub struct MergeProbe {
    supported: bool,
    state: Arc<Mutex<MergeState>>,
}

impl MergeProbe {
    pub fn new(supported: bool) -> Self {
        Self {
            supported,
            state: Arc::new(Mutex::new(MergeState::default())),
        }
    }

    pub fn merges(&self) -> usize {
        self.state.lock().unwrap().merges.len()
    }

    /// Name and inference_mode of the most recent merge.
    pub fn last_merge(&self) -> Option<(String, bool)> {
        self.state.lock().unwrap().merges.last().cloned()
    }
}

impl MergeTarget for MergeProbe {
    fn supports_adapter_merge(&self) -> bool {
        self.supported
    }

    fn merge_adapter(
        &mut self,
        adapter: &LoraAdapter,
        config: &MergeConfig,
    ) -> candle_core::Result<()> {
        self.state
            .lock()
            .unwrap()
            .merges
            .push((adapter.name.clone(), config.inference_mode));
        Ok(())
    }
}

/// `ModelReload` double counting reloads.
#[derive(Clone)]
pub struct CountingReload {
    count: Arc<Mutex<usize>>,
}

impl CountingReload {
    pub fn new() -> Self {
        Self {
            count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn count(&self) -> usize {
        *self.count.lock().unwrap()
    }
}

impl Default for CountingReload {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelReload for CountingReload {
    fn reload(&mut self) -> Result<(), String> {
        *self.count.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Default)]
struct GeneratorState {
    slot: Option<String>,
    assignments: usize,
}

/// `GeneratorHandle` double tracking the adapter slot by name.
#[derive(Clone)]
pub struct NullGenerator {
    state: Arc<Mutex<GeneratorState>>,
}

impl NullGenerator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(GeneratorState::default())),
        }
    }

    /// Name of the adapter currently in the slot.
    pub fn slot(&self) -> Option<String> {
        self.state.lock().unwrap().slot.clone()
    }

    pub fn assignments(&self) -> usize {
        self.state.lock().unwrap().assignments
    }
}

impl Default for NullGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl GeneratorHandle for NullGenerator {
    fn set_adapter(&mut self, adapter: Option<LoraAdapter>) {
        let mut state = self.state.lock().unwrap();
        state.slot = adapter.map(|a| a.name);
        state.assignments += 1;
    }
}
