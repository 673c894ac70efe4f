//! Instruction kinds for the linked-instruction interpreter.
//!
//! Instructions are described as plain values ([`Instruction`]) and moved into
//! a workflow, which lowers them into its arena and hands back an
//! [`InstructionId`]. Links between instructions (next, alternative branch,
//! jump target) are arena handles, never owning references, so cyclic graphs
//! built from jumps and labels need no shared mutability.
//!
//! Every instruction reports one [`ProcessResult`] per invocation; the
//! workflow turns that into a cursor move.

use std::fmt;

use scanflow_types::MemoryRegister;
use serde_json::Value;
use tracing::Level;

use crate::condition::Condition;

pub(crate) mod arena;
pub mod timed;

pub use arena::InstructionId;
pub use timed::{TimedConditionInstruction, WaitForTimer};

/// Outcome of a single instruction invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// Done; advance and wait for the next cycle.
    Success,
    /// Done; advance and keep going within the current cycle.
    ContinueImmediately,
    /// Not done; invoke the same instruction next cycle.
    Repeat,
    /// Failed; record the failure and advance.
    FailureAndContinue,
    /// Failed; record the failure and invoke the same instruction next cycle.
    FailureAndRepeat,
}

impl ProcessResult {
    pub fn is_failure(self) -> bool {
        matches!(self, ProcessResult::FailureAndContinue | ProcessResult::FailureAndRepeat)
    }
}

pub(crate) type CallbackFn = Box<dyn FnMut(&mut dyn MemoryRegister) -> ProcessResult>;

/// Runs a closure against the register.
pub struct CallbackInstruction {
    pub(crate) callback: CallbackFn,
}

impl CallbackInstruction {
    /// Wraps a side-effect closure; the instruction always continues immediately.
    pub fn new<F>(mut callback: F) -> Self
    where
        F: FnMut(&mut dyn MemoryRegister) + 'static,
    {
        Self::with_result(move |register| {
            callback(register);
            ProcessResult::ContinueImmediately
        })
    }

    /// Wraps a closure that decides the instruction's outcome itself.
    pub fn with_result<F>(callback: F) -> Self
    where
        F: FnMut(&mut dyn MemoryRegister) -> ProcessResult + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl fmt::Debug for CallbackInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackInstruction").finish_non_exhaustive()
    }
}

/// Emits a message through `tracing` and continues immediately.
#[derive(Debug, Clone)]
pub struct LogInstruction {
    pub(crate) level: Level,
    pub(crate) message: String,
}

impl LogInstruction {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Level::INFO, message)
    }
}

/// Evaluates a condition and branches: next instruction when true, the
/// alternative when false. Zero-duration, so it always continues immediately.
#[derive(Debug)]
pub struct ConditionInstruction {
    pub(crate) condition: Condition,
    pub(crate) alternative: Option<Box<Instruction>>,
}

impl ConditionInstruction {
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            alternative: None,
        }
    }

    pub fn with_alternative(mut self, alternative: impl Into<Instruction>) -> Self {
        self.alternative = Some(Box::new(alternative.into()));
        self
    }
}

/// A fixed sub-sequence presented to the outer graph as one instruction.
///
/// The children are chained in declaration order; once the last child is done
/// control moves to whatever follows the block.
#[derive(Debug, Default)]
pub struct InstructionBlock {
    pub(crate) instructions: Vec<Instruction>,
}

impl InstructionBlock {
    pub fn new(instructions: impl IntoIterator<Item = Instruction>) -> Self {
        Self {
            instructions: instructions.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl FromIterator<Instruction> for InstructionBlock {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[derive(Debug)]
pub enum Instruction {
    Callback(CallbackInstruction),
    Log(LogInstruction),
    /// Zero-effect jump target; names are unique per workflow.
    Label(String),
    /// Continues at the label with this name, resolved at the link pass.
    Jump(String),
    Condition(ConditionInstruction),
    WaitForTimer(WaitForTimer),
    TimedCondition(TimedConditionInstruction),
    Block(InstructionBlock),
    /// Writes a status entry and continues immediately.
    SetStatus { name: String, level: i64, on: bool },
    /// Writes a value and continues immediately.
    PutValue {
        name: String,
        namespace: String,
        value: Value,
        persist: bool,
    },
}

impl Instruction {
    pub fn label(name: impl Into<String>) -> Self {
        Instruction::Label(name.into())
    }

    pub fn jump(label: impl Into<String>) -> Self {
        Instruction::Jump(label.into())
    }

    pub fn callback<F>(callback: F) -> Self
    where
        F: FnMut(&mut dyn MemoryRegister) + 'static,
    {
        Instruction::Callback(CallbackInstruction::new(callback))
    }

    pub fn log(level: Level, message: impl Into<String>) -> Self {
        Instruction::Log(LogInstruction::new(level, message))
    }

    pub fn block(instructions: impl IntoIterator<Item = Instruction>) -> Self {
        Instruction::Block(InstructionBlock::new(instructions))
    }

    pub fn set_status(name: impl Into<String>, level: i64, on: bool) -> Self {
        Instruction::SetStatus {
            name: name.into(),
            level,
            on,
        }
    }

    pub fn put_value(name: impl Into<String>, namespace: impl Into<String>, value: Value, persist: bool) -> Self {
        Instruction::PutValue {
            name: name.into(),
            namespace: namespace.into(),
            value,
            persist,
        }
    }

    /// Short kind name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Instruction::Callback(_) => "callback",
            Instruction::Log(_) => "log",
            Instruction::Label(_) => "label",
            Instruction::Jump(_) => "jump",
            Instruction::Condition(_) => "condition",
            Instruction::WaitForTimer(_) => "wait-for-timer",
            Instruction::TimedCondition(_) => "timed-condition",
            Instruction::Block(_) => "block",
            Instruction::SetStatus { .. } => "set-status",
            Instruction::PutValue { .. } => "put-value",
        }
    }
}

macro_rules! impl_into_instruction {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Instruction {
                fn from(value: $source) -> Self {
                    Instruction::$variant(value)
                }
            }

            impl From<$source> for InstructionSource {
                fn from(value: $source) -> Self {
                    InstructionSource::New(Instruction::$variant(value))
                }
            }
        )*
    };
}

impl_into_instruction! {
    CallbackInstruction => Callback,
    LogInstruction => Log,
    ConditionInstruction => Condition,
    WaitForTimer => WaitForTimer,
    TimedConditionInstruction => TimedCondition,
    InstructionBlock => Block,
}

/// What a workflow registers: a fresh instruction or a handle created earlier
/// with [`Workflow::create_instruction`](crate::workflow::Workflow::create_instruction).
#[derive(Debug)]
pub enum InstructionSource {
    New(Instruction),
    Existing(InstructionId),
}

impl From<Instruction> for InstructionSource {
    fn from(instruction: Instruction) -> Self {
        InstructionSource::New(instruction)
    }
}

impl From<InstructionId> for InstructionSource {
    fn from(id: InstructionId) -> Self {
        InstructionSource::Existing(id)
    }
}
