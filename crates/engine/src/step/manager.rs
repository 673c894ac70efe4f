//! Step-tree interpreter.
//!
//! Steps live in a map ordered by key. The first time the manager needs
//! them after a structural change it resolves generators and lays the keys
//! out as a chain (a ring in loop mode); the cursor then starts at the first
//! step. Rebuilding never runs lifecycle hooks.

use std::{collections::BTreeMap, fmt};

use scanflow_types::{MemoryRegister, StepData};
use tracing::{debug, info, warn};

use super::{Flow, ProcessContext, Step, StepGenerator, StepKey, StepOutcome, StepRef, StepSource, Transition};
use crate::config::EngineConfig;

struct StepEntry {
    source: StepSource,
    /// Step produced by the generator at the last tree build.
    generated: Option<Box<dyn Step>>,
    data: Option<StepData>,
}

impl StepEntry {
    fn step_mut(&mut self) -> Option<&mut Box<dyn Step>> {
        match &mut self.source {
            StepSource::Step(step) => Some(step),
            StepSource::Generator(_) => self.generated.as_mut(),
        }
    }

    fn step(&self) -> Option<&dyn Step> {
        match &self.source {
            StepSource::Step(step) => Some(step.as_ref()),
            StepSource::Generator(_) => self.generated.as_deref(),
        }
    }

    fn name(&self) -> Option<&str> {
        self.step().and_then(|step| step.name()).or_else(|| self.source.name())
    }
}

#[derive(Debug)]
struct StepTree {
    keys: Vec<StepKey>,
    ring: bool,
}

impl StepTree {
    fn successor(&self, position: usize) -> Option<usize> {
        if position + 1 < self.keys.len() {
            Some(position + 1)
        } else if self.ring && !self.keys.is_empty() {
            Some(0)
        } else {
            None
        }
    }
}

pub struct WorkflowManager {
    steps: BTreeMap<StepKey, StepEntry>,
    next_key: StepKey,
    tree: Option<StepTree>,
    current: Option<usize>,
    context: ProcessContext,
    loop_workflow: bool,
    config: EngineConfig,
}

impl Default for WorkflowManager {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

impl fmt::Debug for WorkflowManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowManager")
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("current", &self.current_key())
            .field("loop_workflow", &self.loop_workflow)
            .finish_non_exhaustive()
    }
}

impl WorkflowManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            steps: BTreeMap::new(),
            next_key: 1,
            tree: None,
            current: None,
            context: ProcessContext::new(),
            loop_workflow: config.loop_workflows,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn add_step(&mut self, step: impl Step + 'static) -> StepKey {
        self.insert_step(StepSource::Step(Box::new(step)), None)
    }

    pub fn add_step_with_data(&mut self, step: impl Step + 'static, data: StepData) -> StepKey {
        self.insert_step(StepSource::Step(Box::new(step)), Some(data))
    }

    pub fn add_step_generator(&mut self, generator: impl StepGenerator + 'static) -> StepKey {
        self.insert_step(StepSource::Generator(Box::new(generator)), None)
    }

    /// Stores `source` under its own key or the next free one and returns
    /// the key. A step already stored under that key is replaced.
    pub fn insert_step(&mut self, source: StepSource, data: Option<StepData>) -> StepKey {
        let key = source.key().unwrap_or(self.next_key);
        self.next_key = self.next_key.max(key).saturating_add(1);

        debug!(step = key, name = source.name().unwrap_or_default(), "added step");
        self.steps.insert(
            key,
            StepEntry {
                source,
                generated: None,
                data,
            },
        );
        self.tree = None;
        key
    }

    fn key_of(&self, step: &StepRef) -> Option<StepKey> {
        match step {
            StepRef::Key(key) => self.steps.contains_key(key).then_some(*key),
            StepRef::Name(name) => self
                .steps
                .iter()
                .find(|(_, entry)| entry.name() == Some(name.as_str()))
                .map(|(key, _)| *key),
        }
    }

    /// Removes a step by key or name. The tree is rebuilt on next use and the
    /// cursor is cleared.
    pub fn remove_step(&mut self, step: impl Into<StepRef>) -> Option<StepSource> {
        let key = self.key_of(&step.into())?;
        let entry = self.steps.remove(&key)?;
        debug!(step = key, "removed step");
        self.tree = None;
        self.current = None;
        Some(entry.source)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_loop_workflow(&self) -> bool {
        self.loop_workflow
    }

    /// Takes effect the next time the tree is rebuilt.
    pub fn set_loop_workflow(&mut self, loop_workflow: bool) {
        self.loop_workflow = loop_workflow;
    }

    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ProcessContext {
        &mut self.context
    }

    /// Data attached to the step stored under `key`.
    pub fn step_data(&self, key: StepKey) -> Option<&StepData> {
        self.steps.get(&key).and_then(|entry| entry.data.as_ref())
    }

    fn ensure_tree(&mut self) {
        if self.tree.is_some() {
            return;
        }

        for entry in self.steps.values_mut() {
            if let StepSource::Generator(generator) = &entry.source {
                entry.generated = Some(generator.generate_step());
            }
        }

        let keys: Vec<StepKey> = self.steps.keys().copied().collect();
        self.current = (!keys.is_empty()).then_some(0);
        debug!(steps = keys.len(), ring = self.loop_workflow, "rebuilt step tree");
        self.tree = Some(StepTree {
            keys,
            ring: self.loop_workflow,
        });
    }

    fn current_key(&self) -> Option<StepKey> {
        let tree = self.tree.as_ref()?;
        self.current.and_then(|position| tree.keys.get(position).copied())
    }

    fn position_of(&self, key: StepKey) -> Option<usize> {
        self.tree.as_ref()?.keys.iter().position(|candidate| *candidate == key)
    }

    /// True while a current step exists.
    pub fn needs_process(&mut self) -> bool {
        self.ensure_tree();
        self.current.is_some()
    }

    pub fn current_step(&self) -> Option<&dyn Step> {
        let key = self.current_key()?;
        self.steps.get(&key).and_then(StepEntry::step)
    }

    pub fn current_step_key(&self) -> Option<StepKey> {
        self.current_key()
    }

    pub fn get_step(&mut self, step: impl Into<StepRef>) -> Option<&dyn Step> {
        self.ensure_tree();
        let key = self.key_of(&step.into())?;
        self.steps.get(&key).and_then(StepEntry::step)
    }

    /// The step with the lowest key.
    pub fn get_initial_step(&mut self) -> Option<&dyn Step> {
        self.ensure_tree();
        self.steps.values().next().and_then(StepEntry::step)
    }

    /// Moves the cursor, notifying the step that ends and the step that begins.
    fn make_current(&mut self, position: Option<usize>, register: &mut dyn MemoryRegister) {
        if let Some(key) = self.current_key()
            && let Some(step) = self.steps.get_mut(&key).and_then(StepEntry::step_mut)
        {
            self.context.focus(key);
            step.step_will_end(&mut self.context, register);
        }

        self.current = position;

        if let Some(key) = self.current_key()
            && let Some(step) = self.steps.get_mut(&key).and_then(StepEntry::step_mut)
        {
            self.context.focus(key);
            step.step_did_begin(&mut self.context, register);
        }
    }

    fn advance(&mut self, register: &mut dyn MemoryRegister) {
        let next = match (&self.tree, self.current) {
            (Some(tree), Some(position)) => tree.successor(position),
            _ => None,
        };
        self.make_current(next, register);
    }

    /// Runs the reset hook of every step and rebuilds the tree, leaving the
    /// cursor on the first step.
    pub fn reset(&mut self) {
        for (key, entry) in self.steps.iter_mut() {
            if let Some(step) = entry.step_mut() {
                self.context.focus(*key);
                step.reset(&mut self.context);
            }
        }
        self.tree = None;
        self.ensure_tree();
    }

    /// Resets every step and clears the cursor. [`WorkflowManager::restart_with_step`]
    /// resumes a suspended manager.
    pub fn suspend(&mut self) {
        self.reset();
        self.current = None;
    }

    /// Makes `step` the current step. Returns `false` and leaves the cursor
    /// alone when no such step exists.
    pub fn restart_with_step(&mut self, step: impl Into<StepRef>, register: &mut dyn MemoryRegister) -> bool {
        self.ensure_tree();
        let Some(position) = self.key_of(&step.into()).and_then(|key| self.position_of(key)) else {
            return false;
        };
        self.make_current(Some(position), register);
        true
    }

    fn run_current(&mut self, key: StepKey, register: &mut dyn MemoryRegister) -> StepOutcome {
        let Some(entry) = self.steps.get_mut(&key) else {
            return StepOutcome::advance();
        };
        self.context.enter(key, entry.data.take());
        let outcome = match entry.step_mut() {
            Some(step) => step.process(&mut self.context, register),
            None => StepOutcome::advance(),
        };
        entry.data = self.context.leave();
        outcome
    }

    /// Runs one scan cycle.
    pub fn process(&mut self, register: &mut dyn MemoryRegister) {
        self.ensure_tree();

        let budget = self.config.transition_budget();
        let mut reentries = 0usize;

        while let Some(key) = self.current_key() {
            let outcome = self.run_current(key, register);

            match outcome.transition {
                Transition::Advance => self.advance(register),
                Transition::Stay => {}
                Transition::JumpTo(target) => match self.key_of(&target).and_then(|key| self.position_of(key)) {
                    Some(position) => {
                        debug!(from = key, to = ?target, "jumping to step");
                        self.make_current(Some(position), register);
                    }
                    None => {
                        warn!(from = key, to = ?target, "jump target not found, advancing");
                        self.advance(register);
                    }
                },
            }

            let keep_going = match outcome.flow {
                Flow::NextCycle => false,
                Flow::ContinueInCycle => true,
                Flow::RepeatWhole { continue_in_cycle } => {
                    info!(step = key, continue_in_cycle, "repeating whole workflow");
                    self.reset();
                    continue_in_cycle
                }
                Flow::Terminate => {
                    info!(step = key, "workflow terminated");
                    self.make_current(None, register);
                    self.suspend();
                    false
                }
            };

            if !keep_going {
                return;
            }

            reentries += 1;
            if reentries >= budget {
                warn!(limit = budget, current = ?self.current_key(), "immediate transition limit reached, resuming next cycle");
                return;
            }
        }
    }
}
