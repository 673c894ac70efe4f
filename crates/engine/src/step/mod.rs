//! Step-tree model.
//!
//! Steps are keyed by a sparse integer and executed in ascending key order by
//! a [`WorkflowManager`]. Each invocation returns a [`StepOutcome`] that
//! tells the manager where to go next and whether to keep going within the
//! current scan.

use scanflow_types::MemoryRegister;

pub mod builtin;
pub mod context;
pub mod manager;

pub use builtin::{CallbackResetStep, CallbackStep, MarkerStep, RepeatWholeWorkflowStep};
pub use context::ProcessContext;
pub use manager::WorkflowManager;

/// Sparse ordering key of a step.
pub type StepKey = i64;

pub trait Step {
    /// Explicit key, or `None` to let the manager assign the next free one.
    fn key(&self) -> Option<StepKey>;

    fn name(&self) -> Option<&str> {
        None
    }

    fn process(&mut self, context: &mut ProcessContext, register: &mut dyn MemoryRegister) -> StepOutcome;

    /// Called right after the step became the current one.
    fn step_did_begin(&mut self, _context: &mut ProcessContext, _register: &mut dyn MemoryRegister) {}

    /// Called right before the step stops being the current one.
    fn step_will_end(&mut self, _context: &mut ProcessContext, _register: &mut dyn MemoryRegister) {}

    /// Called when the whole tree is reset (repeat-whole, terminate, explicit reset).
    fn reset(&mut self, _context: &mut ProcessContext) {}
}

/// Produces a fresh step every time the step tree is rebuilt.
pub trait StepGenerator {
    fn key(&self) -> Option<StepKey>;

    fn name(&self) -> Option<&str> {
        None
    }

    fn generate_step(&self) -> Box<dyn Step>;
}

/// What a manager stores under a key.
pub enum StepSource {
    Step(Box<dyn Step>),
    Generator(Box<dyn StepGenerator>),
}

impl StepSource {
    pub fn key(&self) -> Option<StepKey> {
        match self {
            StepSource::Step(step) => step.key(),
            StepSource::Generator(generator) => generator.key(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            StepSource::Step(step) => step.name(),
            StepSource::Generator(generator) => generator.name(),
        }
    }
}

impl std::fmt::Debug for StepSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            StepSource::Step(_) => "Step",
            StepSource::Generator(_) => "Generator",
        };
        f.debug_struct(kind)
            .field("key", &self.key())
            .field("name", &self.name())
            .finish()
    }
}

/// Looks a step up by key or by name.
///
/// A step instance is referenced through its key: [`StepRef::of`] builds the
/// reference from the step itself, and the key returned by
/// [`WorkflowManager::add_step`] works for steps that let the manager pick one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRef {
    Key(StepKey),
    Name(String),
}

impl StepRef {
    /// Reference to `step` by its explicit key, falling back to its name.
    pub fn of(step: &dyn Step) -> Option<Self> {
        step.key()
            .map(StepRef::Key)
            .or_else(|| step.name().map(|name| StepRef::Name(name.to_string())))
    }
}

impl From<StepKey> for StepRef {
    fn from(key: StepKey) -> Self {
        StepRef::Key(key)
    }
}

impl From<&str> for StepRef {
    fn from(name: &str) -> Self {
        StepRef::Name(name.to_string())
    }
}

impl From<String> for StepRef {
    fn from(name: String) -> Self {
        StepRef::Name(name)
    }
}

/// Where the cursor moves after a step ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Move to the following step (wrapping in loop mode).
    Advance,
    /// Run the same step again.
    Stay,
    /// Move to the referenced step. An unknown reference advances instead.
    JumpTo(StepRef),
}

/// What happens with the rest of the scan once the cursor moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Return and wait for the next scan.
    NextCycle,
    /// Run the new current step within this scan.
    ContinueInCycle,
    /// Reset every step and restart from the first one. With
    /// `continue_in_cycle` the first step also runs within this scan.
    RepeatWhole { continue_in_cycle: bool },
    /// Reset every step and suspend the manager.
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub transition: Transition,
    pub flow: Flow,
}

impl Default for StepOutcome {
    fn default() -> Self {
        Self::advance()
    }
}

impl StepOutcome {
    pub fn advance() -> Self {
        Self {
            transition: Transition::Advance,
            flow: Flow::NextCycle,
        }
    }

    pub fn stay() -> Self {
        Self {
            transition: Transition::Stay,
            flow: Flow::NextCycle,
        }
    }

    pub fn jump_to(step: impl Into<StepRef>) -> Self {
        Self {
            transition: Transition::JumpTo(step.into()),
            flow: Flow::NextCycle,
        }
    }

    pub fn repeat_whole() -> Self {
        Self {
            transition: Transition::Advance,
            flow: Flow::RepeatWhole { continue_in_cycle: false },
        }
    }

    pub fn terminate() -> Self {
        Self {
            transition: Transition::Stay,
            flow: Flow::Terminate,
        }
    }

    /// Keeps going within the current scan. Has no effect on [`Flow::Terminate`].
    pub fn in_current_cycle(mut self) -> Self {
        self.flow = match self.flow {
            Flow::NextCycle | Flow::ContinueInCycle => Flow::ContinueInCycle,
            Flow::RepeatWhole { .. } => Flow::RepeatWhole { continue_in_cycle: true },
            Flow::Terminate => Flow::Terminate,
        };
        self
    }
}
