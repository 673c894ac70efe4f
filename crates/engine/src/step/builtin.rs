//! Ready-made steps.

use std::fmt;

use scanflow_types::MemoryRegister;

use super::{ProcessContext, Step, StepKey, StepOutcome};

type StepCallback = Box<dyn FnMut(&mut ProcessContext, &mut dyn MemoryRegister) -> StepOutcome>;
type ResetCallback = Box<dyn FnMut(&mut ProcessContext)>;

/// Runs a closure as the step body.
pub struct CallbackStep {
    name: String,
    key: Option<StepKey>,
    callback: StepCallback,
}

impl CallbackStep {
    /// The step advances to the next step on the next scan.
    pub fn new<F>(name: impl Into<String>, mut callback: F) -> Self
    where
        F: FnMut(&mut ProcessContext, &mut dyn MemoryRegister) + 'static,
    {
        Self::with_outcome(name, move |context, register| {
            callback(context, register);
            StepOutcome::advance()
        })
    }

    /// The closure decides the outcome itself.
    pub fn with_outcome<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: FnMut(&mut ProcessContext, &mut dyn MemoryRegister) -> StepOutcome + 'static,
    {
        Self {
            name: name.into(),
            key: None,
            callback: Box::new(callback),
        }
    }

    pub fn with_key(mut self, key: StepKey) -> Self {
        self.key = Some(key);
        self
    }
}

impl fmt::Debug for CallbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackStep")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl Step for CallbackStep {
    fn key(&self) -> Option<StepKey> {
        self.key
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn process(&mut self, context: &mut ProcessContext, register: &mut dyn MemoryRegister) -> StepOutcome {
        (self.callback)(context, register)
    }
}

/// A [`CallbackStep`] with an extra closure run when the tree is reset.
pub struct CallbackResetStep {
    inner: CallbackStep,
    on_reset: Option<ResetCallback>,
}

impl CallbackResetStep {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: FnMut(&mut ProcessContext, &mut dyn MemoryRegister) + 'static,
    {
        Self {
            inner: CallbackStep::new(name, callback),
            on_reset: None,
        }
    }

    pub fn with_key(mut self, key: StepKey) -> Self {
        self.inner = self.inner.with_key(key);
        self
    }

    pub fn with_reset<F>(mut self, on_reset: F) -> Self
    where
        F: FnMut(&mut ProcessContext) + 'static,
    {
        self.on_reset = Some(Box::new(on_reset));
        self
    }
}

impl fmt::Debug for CallbackResetStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackResetStep")
            .field("inner", &self.inner)
            .field("has_reset", &self.on_reset.is_some())
            .finish()
    }
}

impl Step for CallbackResetStep {
    fn key(&self) -> Option<StepKey> {
        self.inner.key()
    }

    fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    fn process(&mut self, context: &mut ProcessContext, register: &mut dyn MemoryRegister) -> StepOutcome {
        self.inner.process(context, register)
    }

    fn reset(&mut self, context: &mut ProcessContext) {
        if let Some(on_reset) = self.on_reset.as_mut() {
            on_reset(context);
        }
    }
}

/// Does nothing and moves on within the same scan. Useful as a jump target.
#[derive(Debug, Clone)]
pub struct MarkerStep {
    name: String,
    key: Option<StepKey>,
}

impl MarkerStep {
    pub fn new(name: impl Into<String>, key: StepKey) -> Self {
        Self {
            name: name.into(),
            key: Some(key),
        }
    }

    pub fn unkeyed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
        }
    }
}

impl Step for MarkerStep {
    fn key(&self) -> Option<StepKey> {
        self.key
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn process(&mut self, _context: &mut ProcessContext, _register: &mut dyn MemoryRegister) -> StepOutcome {
        StepOutcome::advance().in_current_cycle()
    }
}

/// Resets the whole tree and reruns the first step in the same scan.
#[derive(Debug, Clone)]
pub struct RepeatWholeWorkflowStep {
    name: String,
    key: Option<StepKey>,
}

impl RepeatWholeWorkflowStep {
    pub fn new(name: impl Into<String>, key: StepKey) -> Self {
        Self {
            name: name.into(),
            key: Some(key),
        }
    }
}

impl Step for RepeatWholeWorkflowStep {
    fn key(&self) -> Option<StepKey> {
        self.key
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn process(&mut self, _context: &mut ProcessContext, _register: &mut dyn MemoryRegister) -> StepOutcome {
        StepOutcome::repeat_whole().in_current_cycle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::Flow;
    use scanflow_types::InMemoryRegister;
    use std::{cell::Cell, rc::Rc};

    #[test]
    fn callback_step_advances_after_running() {
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let mut step = CallbackStep::new("cb", move |_, _| flag.set(true)).with_key(3);

        let mut context = ProcessContext::new();
        let mut register = InMemoryRegister::new();
        let outcome = step.process(&mut context, &mut register);

        assert!(ran.get());
        assert_eq!(outcome, StepOutcome::advance());
        assert_eq!(step.key(), Some(3));
        assert_eq!(step.name(), Some("cb"));
    }

    #[test]
    fn reset_callback_runs_only_on_reset() {
        let resets = Rc::new(Cell::new(0));
        let counter = Rc::clone(&resets);
        let mut step = CallbackResetStep::new("cb", |_, _| {}).with_reset(move |_| counter.set(counter.get() + 1));

        let mut context = ProcessContext::new();
        let mut register = InMemoryRegister::new();
        step.process(&mut context, &mut register);
        assert_eq!(resets.get(), 0);

        step.reset(&mut context);
        assert_eq!(resets.get(), 1);
    }

    #[test]
    fn marker_and_repeat_continue_in_cycle() {
        let mut context = ProcessContext::new();
        let mut register = InMemoryRegister::new();

        let marker = MarkerStep::new("mk", 9).process(&mut context, &mut register);
        assert_eq!(marker.flow, Flow::ContinueInCycle);

        let repeat = RepeatWholeWorkflowStep::new("rp", 44).process(&mut context, &mut register);
        assert_eq!(repeat.flow, Flow::RepeatWhole { continue_in_cycle: true });
    }
}
