//! Structural error taxonomy shared by both interpreters.
//!
//! Only structural problems surface as `Err`: duplicate registrations,
//! unresolved jump targets, registry collisions and design assembly failures.
//! Runtime instruction failures are recorded on the workflow instead and must
//! be released explicitly.

use thiserror::Error;

use crate::instruction::InstructionId;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The instruction (or a label with the same name) is already registered.
    #[error("duplicate instruction {instruction}: {reason}")]
    DuplicateInstruction { instruction: InstructionId, reason: String },

    /// A jump references a label that does not exist in the workflow.
    #[error("instruction {jump} references unknown label '{label}'")]
    InstructionReference { jump: InstructionId, label: String },

    /// The handle does not belong to this workflow's arena.
    #[error("instruction {instruction} does not belong to this workflow")]
    UnknownInstruction { instruction: InstructionId },

    #[error("a workflow named '{name}' is already registered")]
    DuplicateWorkflowName { name: String },

    #[error("step component '{name}' not found")]
    ComponentNotFound { name: String },

    #[error("illegal workflow design: {reason}")]
    IllegalDesign { reason: String },

    #[error("component '{component}' failed to build step: {reason}")]
    Compilation { component: String, reason: String },

    /// A process driven by the scan cycle failed; `name` identifies it.
    #[error("process '{name}' failed: {source}")]
    Process {
        name: String,
        #[source]
        source: Box<WorkflowError>,
    },
}

impl WorkflowError {
    pub fn duplicate_instruction(instruction: InstructionId) -> Self {
        Self::DuplicateInstruction {
            instruction,
            reason: "instruction is already registered".to_string(),
        }
    }

    pub fn duplicate_label(instruction: InstructionId, label: &str) -> Self {
        Self::DuplicateInstruction {
            instruction,
            reason: format!("label '{}' already exists", label),
        }
    }

    pub fn instruction_reference(jump: InstructionId, label: impl Into<String>) -> Self {
        Self::InstructionReference { jump, label: label.into() }
    }

    pub fn duplicate_workflow_name(name: impl Into<String>) -> Self {
        Self::DuplicateWorkflowName { name: name.into() }
    }

    pub fn component_not_found(name: impl Into<String>) -> Self {
        Self::ComponentNotFound { name: name.into() }
    }

    pub fn illegal_design(reason: impl Into<String>) -> Self {
        Self::IllegalDesign { reason: reason.into() }
    }

    pub fn compilation(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Compilation {
            component: component.into(),
            reason: reason.into(),
        }
    }

    /// Attributes `self` to the named process.
    pub fn in_process(self, name: impl Into<String>) -> Self {
        Self::Process {
            name: name.into(),
            source: Box::new(self),
        }
    }
}
