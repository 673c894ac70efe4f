//! # Scanflow Engine
//!
//! Cyclic, resumable interpreters for control-logic workflows. An external
//! scheduler calls into the engine once per scan cycle; every call does a
//! bounded amount of work and returns, leaving the cursor where the next
//! cycle picks up.
//!
//! ## Execution models
//!
//! - **`workflow`**: linked instructions with jump/label resolution and a
//!   single pending cursor driven by per-instruction result codes.
//! - **`step`**: a sparse, keyed set of steps rebuilt into an ordered chain
//!   (or ring), driven by the outcome each step returns.
//!
//! Both share the [`timer`] and [`condition`] building blocks and report
//! structural problems through [`WorkflowError`].
//!
//! ## Usage
//!
//! ```rust
//! use scanflow_engine::{Condition, Instruction, Workflow};
//! use scanflow_types::{InMemoryRegister, MemoryRegister};
//!
//! let mut workflow = Workflow::new();
//! workflow.append_instruction(Instruction::set_status("pump", 1, true))?;
//! workflow.append_instruction(Instruction::jump("done"))?;
//! workflow.append_instruction(Instruction::set_status("alarm", 1, true))?;
//! workflow.append_instruction(Instruction::label("done"))?;
//! workflow.enable();
//!
//! let mut register = InMemoryRegister::new();
//! workflow.process(&mut register)?;
//! assert!(register.get_status("pump").on);
//! assert!(!register.get_status("alarm").on);
//! assert!(Condition::has_status("pump", 1).evaluate(&register));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`instruction`**: instruction kinds and the arena they are lowered into
//! - **`workflow`**: the instruction interpreter and the workflow registry
//! - **`step`**: steps, built-in steps and the step-tree interpreter
//! - **`provider`** / **`design`**: component lookup and design assembly
//! - **`scan`**: runs a set of named processes once per cycle
//! - **`config`**: engine configuration loaded from YAML or JSON

pub mod condition;
pub mod config;
pub mod design;
pub mod error;
pub mod instruction;
pub mod provider;
pub mod scan;
pub mod step;
pub mod timer;
pub mod workflow;

pub use condition::Condition;
pub use config::EngineConfig;
pub use design::{DesignOptions, StepDesign, WorkflowDesign, assemble_manager};
pub use error::WorkflowError;
pub use instruction::{
    CallbackInstruction, ConditionInstruction, Instruction, InstructionBlock, InstructionId, InstructionSource, LogInstruction,
    ProcessResult, TimedConditionInstruction, WaitForTimer,
};
pub use provider::{ChainStepComponentProvider, ComponentOptions, FnStepComponent, StaticComponentProvider, StepComponent, StepComponentProvider};
pub use scan::{CyclicProcess, ScanCycle};
pub use step::{
    CallbackResetStep, CallbackStep, Flow, MarkerStep, ProcessContext, RepeatWholeWorkflowStep, Step, StepGenerator, StepKey, StepOutcome,
    StepRef, StepSource, Transition, WorkflowManager,
};
pub use timer::{Timer, TimerUnit};
pub use workflow::{InstructionSelector, Workflow, WorkflowRegistry, WorkflowStatus};
