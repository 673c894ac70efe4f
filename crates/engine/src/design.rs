//! Declarative workflow designs and their assembly into step trees.
//!
//! A design names a workflow and lists steps by component. Assembly resolves
//! each component through a [`StepComponentProvider`] and builds a
//! [`WorkflowManager`] directly; nothing is generated or persisted.
//!
//! ```yaml
//! name: filling
//! options:
//!   circular: true
//! steps:
//!   - component: open_valve
//!     step: 10
//!     data:
//!       valve: V1
//!   - component: wait_level
//!     name: wait
//! ```

use std::{collections::HashSet, fs, path::Path};

use anyhow::{Context, Result};
use scanflow_types::StepData;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::EngineConfig,
    error::WorkflowError,
    provider::StepComponentProvider,
    step::{StepKey, WorkflowManager},
};

/// Options of a design. Unset options are taken from the components the
/// design uses: it starts active only if every component kick-starts, and
/// loops if any component asks for circular processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignOptions {
    /// The assembled manager starts with its first step current. Otherwise
    /// it starts suspended until restarted explicitly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kick_start: Option<bool>,
    /// Assemble the step tree in loop mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circular: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDesign {
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StepData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDesign {
    pub name: String,
    #[serde(default)]
    pub options: DesignOptions,
    #[serde(default)]
    pub steps: Vec<StepDesign>,
}

impl WorkflowDesign {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse workflow design")
    }

    /// Loads a design file; `.json` files are parsed as JSON, everything else
    /// as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read workflow design: {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

        if is_json {
            serde_json::from_str(&content).with_context(|| format!("Failed to parse workflow design: {}", path.display()))
        } else {
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse workflow design: {}", path.display()))
        }
    }

    fn validate(&self) -> Result<(), WorkflowError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::illegal_design("workflow design has no name"));
        }
        let mut keys = HashSet::new();
        for step in &self.steps {
            if let Some(key) = step.step
                && !keys.insert(key)
            {
                return Err(WorkflowError::illegal_design(format!(
                    "workflow '{}' uses step key {} more than once",
                    self.name, key
                )));
            }
        }
        Ok(())
    }
}

/// Builds a step tree from `design`, resolving components through `provider`.
pub fn assemble_manager(
    design: &WorkflowDesign,
    provider: &dyn StepComponentProvider,
    config: &EngineConfig,
) -> Result<WorkflowManager, WorkflowError> {
    design.validate()?;

    let mut manager = WorkflowManager::with_config(config.clone());
    let mut kick_start = true;
    let mut circular = false;

    for step in &design.steps {
        let component = provider
            .step_component(&step.component)
            .ok_or_else(|| WorkflowError::component_not_found(&step.component))?;
        let options = component.options();
        kick_start &= options.kick_start;
        circular |= options.circular_processing;

        let step_name = step.name.as_deref().unwrap_or(&step.component);
        let source = component
            .make_step(step.data.as_ref(), step_name, step.step)
            .map_err(|err| WorkflowError::compilation(&step.component, format!("{err:#}")))?;

        if let Some(expected) = step.step
            && source.key() != Some(expected)
        {
            return Err(WorkflowError::compilation(
                &step.component,
                format!("built step reports key {:?}, design requires {}", source.key(), expected),
            ));
        }

        let key = manager.insert_step(source, step.data.clone());
        debug!(workflow = %design.name, component = %step.component, step = key, "assembled step");
    }

    let kick_start = design.options.kick_start.unwrap_or(kick_start);
    let circular = design.options.circular.unwrap_or(circular);
    manager.set_loop_workflow(circular);
    if !kick_start {
        manager.suspend();
    }

    info!(workflow = %design.name, steps = manager.len(), circular, kick_start, "assembled workflow");
    Ok(manager)
}
