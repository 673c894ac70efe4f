use indexmap::IndexMap;
use scanflow_types::StepData;
use serde_json::Value;

use super::StepKey;

/// Per-manager context handed to every step invocation.
///
/// Named values live as long as the manager, so steps can pass results to
/// later steps. The step data is the payload attached to the running step;
/// changes made to it are stored back when the step returns.
#[derive(Debug, Default)]
pub struct ProcessContext {
    values: IndexMap<String, Value>,
    step_data: Option<StepData>,
    current_step: Option<StepKey>,
}

impl ProcessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn remove_value(&mut self, name: &str) -> Option<Value> {
        self.values.shift_remove(name)
    }

    pub fn step_data(&self) -> Option<&StepData> {
        self.step_data.as_ref()
    }

    pub fn step_data_mut(&mut self) -> Option<&mut StepData> {
        self.step_data.as_mut()
    }

    /// Key of the step being processed or notified.
    pub fn current_step(&self) -> Option<StepKey> {
        self.current_step
    }

    pub(crate) fn enter(&mut self, key: StepKey, data: Option<StepData>) {
        self.current_step = Some(key);
        self.step_data = data;
    }

    /// Hands the step data back to the manager.
    pub(crate) fn leave(&mut self) -> Option<StepData> {
        self.step_data.take()
    }

    pub(crate) fn focus(&mut self, key: StepKey) {
        self.current_step = Some(key);
    }
}
