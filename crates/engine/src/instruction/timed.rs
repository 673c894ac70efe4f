//! Time-bounded instructions.
//!
//! Both kinds share one processing template: while the timer runs, a
//! "waiting" step decides the result; once it expires, a "completed" step
//! does. Entering the instruction as the pending instruction restarts the
//! timer, so every visit through a loop gets a fresh deadline.

use scanflow_types::MemoryRegister;

use super::{Instruction, InstructionId, ProcessResult};
use crate::{condition::Condition, timer::Timer};

/// Waits until the timer expires, then succeeds.
#[derive(Debug, Clone)]
pub struct WaitForTimer {
    pub(crate) timer: Timer,
}

impl WaitForTimer {
    pub fn new(timer: Timer) -> Self {
        Self { timer }
    }
}

/// Races a condition against a deadline.
///
/// If the condition turns true first, control continues with the next
/// instruction in the same cycle. If the deadline passes first, control
/// continues with the alternative instruction (typically a jump).
#[derive(Debug)]
pub struct TimedConditionInstruction {
    pub(crate) timer: Timer,
    pub(crate) condition: Condition,
    pub(crate) alternative: Option<Box<Instruction>>,
}

impl TimedConditionInstruction {
    pub fn new(timer: Timer, condition: Condition) -> Self {
        Self {
            timer,
            condition,
            alternative: None,
        }
    }

    pub fn with_alternative(mut self, alternative: impl Into<Instruction>) -> Self {
        self.alternative = Some(Box::new(alternative.into()));
        self
    }
}

#[derive(Debug)]
pub(crate) enum TimedMode {
    Wait,
    Condition {
        condition: Condition,
        alternative: Option<InstructionId>,
    },
}

/// Arena-side state of a timed instruction.
#[derive(Debug)]
pub(crate) struct TimedNode {
    timer: Timer,
    mode: TimedMode,
    result: bool,
}

impl TimedNode {
    pub(crate) fn wait(timer: Timer) -> Self {
        Self {
            timer,
            mode: TimedMode::Wait,
            result: false,
        }
    }

    pub(crate) fn condition(timer: Timer, condition: Condition, alternative: Option<InstructionId>) -> Self {
        Self {
            timer,
            mode: TimedMode::Condition { condition, alternative },
            result: false,
        }
    }

    pub(crate) fn process(&mut self, register: &dyn MemoryRegister) -> ProcessResult {
        if self.timer.is_time_up() {
            self.timer_completed()
        } else {
            self.waiting(register)
        }
    }

    fn waiting(&mut self, register: &dyn MemoryRegister) -> ProcessResult {
        match &self.mode {
            TimedMode::Wait => ProcessResult::Repeat,
            TimedMode::Condition { condition, .. } => {
                if condition.evaluate(register) {
                    self.result = true;
                    ProcessResult::ContinueImmediately
                } else {
                    ProcessResult::Repeat
                }
            }
        }
    }

    fn timer_completed(&mut self) -> ProcessResult {
        match self.mode {
            TimedMode::Wait => {
                self.result = true;
                ProcessResult::Success
            }
            TimedMode::Condition { .. } => {
                self.result = false;
                ProcessResult::ContinueImmediately
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        self.timer.reset();
        self.result = false;
    }

    pub(crate) fn alternative(&self) -> Option<InstructionId> {
        match self.mode {
            TimedMode::Wait => None,
            TimedMode::Condition { alternative, .. } => alternative,
        }
    }

    /// Picks the successor: `next` on a positive result, the alternative
    /// branch on a negative one.
    pub(crate) fn successor(&self, next: Option<InstructionId>) -> Option<InstructionId> {
        match self.mode {
            TimedMode::Wait => next,
            TimedMode::Condition { alternative, .. } => {
                if self.result {
                    next
                } else {
                    alternative
                }
            }
        }
    }
}
