//! Name → workflow lookup.
//!
//! The registry is an ordinary value owned by whoever assembles workflows;
//! there is no process-wide instance. Entries live as long as the registry.

use indexmap::IndexMap;
use tracing::debug;

use super::Workflow;
use crate::error::WorkflowError;

#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    workflows: IndexMap<String, Workflow>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `workflow` under `name`. Fails if the name is taken;
    /// the existing entry is left untouched.
    pub fn register(&mut self, name: impl Into<String>, workflow: Workflow) -> Result<&mut Workflow, WorkflowError> {
        let name = name.into();
        if self.workflows.contains_key(&name) {
            return Err(WorkflowError::duplicate_workflow_name(name));
        }
        debug!(workflow = %name, "registered workflow");
        let entry = self.workflows.entry(name).or_insert(workflow);
        Ok(entry)
    }

    pub fn get(&self, name: &str) -> Option<&Workflow> {
        self.workflows.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Workflow> {
        self.workflows.get_mut(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Workflow)> {
        self.workflows.iter_mut().map(|(name, workflow)| (name.as_str(), workflow))
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
