//! Instruction-linked interpreter.
//!
//! A [`Workflow`] owns an arena of lowered instructions, the ordered list of
//! registered (top-level) instructions and a single pending cursor. Each call
//! to [`Workflow::process`] runs the pending instruction and moves the cursor
//! according to its [`ProcessResult`]. Zero-duration instructions fall
//! through within the same call; everything else waits for the next scan.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use scanflow_types::MemoryRegister;
use tracing::{debug, info, warn};

use crate::{
    config::EngineConfig,
    error::WorkflowError,
    instruction::{Instruction, InstructionId, InstructionSource, ProcessResult, arena::InstructionArena},
};

pub mod registry;

pub use registry::WorkflowRegistry;

/// Instruction number reported while no instruction is pending.
pub const IDLE_INSTRUCTION_NUMBER: i64 = -1;
/// Instruction name reported while no instruction is pending.
pub const IDLE_INSTRUCTION_NAME: &str = "Waiting";

/// On/error bits of a workflow. The two flags are independent: a workflow
/// can be on and in error at the same time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowStatus {
    on: bool,
    error: bool,
}

impl WorkflowStatus {
    pub const OFF: u8 = 0;
    pub const ON: u8 = 1;
    pub const ERROR: u8 = 2;

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    pub fn bits(&self) -> u8 {
        let mut bits = Self::OFF;
        if self.on {
            bits |= Self::ON;
        }
        if self.error {
            bits |= Self::ERROR;
        }
        bits
    }
}

/// Identifies a registered instruction for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionSelector {
    Id(InstructionId),
    Number(i64),
    Name(String),
}

impl From<InstructionId> for InstructionSelector {
    fn from(id: InstructionId) -> Self {
        InstructionSelector::Id(id)
    }
}

impl From<i64> for InstructionSelector {
    fn from(number: i64) -> Self {
        InstructionSelector::Number(number)
    }
}

impl From<&str> for InstructionSelector {
    fn from(name: &str) -> Self {
        InstructionSelector::Name(name.to_string())
    }
}

impl From<String> for InstructionSelector {
    fn from(name: String) -> Self {
        InstructionSelector::Name(name)
    }
}

#[derive(Debug, Clone)]
struct RegisteredInstruction {
    id: InstructionId,
    number: i64,
    name: Option<String>,
}

pub struct Workflow {
    arena: InstructionArena,
    registered: Vec<RegisteredInstruction>,
    pending: Option<InstructionId>,
    failed: Option<InstructionId>,
    status: WorkflowStatus,
    links_stale: bool,
    config: EngineConfig,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("registered", &self.registered)
            .field("pending", &self.pending)
            .field("failed", &self.failed)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            arena: InstructionArena::default(),
            registered: Vec::new(),
            pending: None,
            failed: None,
            status: WorkflowStatus::default(),
            links_stale: true,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Lowers `instruction` into this workflow without registering it.
    ///
    /// The returned handle can be registered later through
    /// [`Workflow::add_instruction`] or [`Workflow::append_instruction`].
    pub fn create_instruction(&mut self, instruction: impl Into<Instruction>) -> InstructionId {
        self.arena.insert(instruction.into(), None)
    }

    /// Registers an instruction without linking it to the previous one.
    pub fn add_instruction(&mut self, instruction: impl Into<InstructionSource>) -> Result<InstructionId, WorkflowError> {
        self.add_instruction_with(instruction, None, None)
    }

    /// Registers an instruction with an explicit display number and name.
    /// Without a number the registration position is used.
    pub fn add_instruction_with(
        &mut self,
        instruction: impl Into<InstructionSource>,
        number: Option<i64>,
        name: Option<&str>,
    ) -> Result<InstructionId, WorkflowError> {
        let id = match instruction.into() {
            InstructionSource::New(instruction) => self.arena.insert(instruction, None),
            InstructionSource::Existing(id) => {
                if !self.arena.contains(id) {
                    return Err(WorkflowError::UnknownInstruction { instruction: id });
                }
                if self.is_registered(id) || self.arena.owner(id).is_some() {
                    return Err(WorkflowError::duplicate_instruction(id));
                }
                id
            }
        };

        self.check_labels(id)?;

        let number = number.unwrap_or(self.registered.len() as i64);
        debug!(instruction = %id, number, name = name.unwrap_or_default(), "registered instruction");
        self.registered.push(RegisteredInstruction {
            id,
            number,
            name: name.map(str::to_string),
        });
        self.links_stale = true;
        Ok(id)
    }

    /// Registers an instruction and links the previously registered one to it.
    pub fn append_instruction(&mut self, instruction: impl Into<InstructionSource>) -> Result<InstructionId, WorkflowError> {
        self.append_instruction_with(instruction, None, None)
    }

    pub fn append_instruction_with(
        &mut self,
        instruction: impl Into<InstructionSource>,
        number: Option<i64>,
        name: Option<&str>,
    ) -> Result<InstructionId, WorkflowError> {
        let previous = self.registered.last().map(|entry| entry.id);
        let id = self.add_instruction_with(instruction, number, name)?;
        if let Some(previous) = previous {
            self.arena.set_next(previous, Some(id));
        }
        Ok(id)
    }

    fn is_registered(&self, id: InstructionId) -> bool {
        self.registered.iter().any(|entry| entry.id == id)
    }

    /// Registered instructions and everything nested in them.
    fn live_nodes(&self) -> Vec<InstructionId> {
        self.registered.iter().flat_map(|entry| self.arena.subtree(entry.id)).collect()
    }

    fn check_labels(&self, candidate: InstructionId) -> Result<(), WorkflowError> {
        let mut labels: HashSet<&str> = self
            .live_nodes()
            .into_iter()
            .filter_map(|node| self.arena.label_name(node))
            .collect();

        for node in self.arena.subtree(candidate) {
            if let Some(label) = self.arena.label_name(node)
                && !labels.insert(label)
            {
                return Err(WorkflowError::duplicate_label(node, label));
            }
        }
        Ok(())
    }

    /// Binds every jump reachable from the registered instructions to its label.
    fn link_instructions(&mut self) -> Result<(), WorkflowError> {
        let bindings = {
            let live = self.live_nodes();
            let labels: HashMap<&str, InstructionId> = live
                .iter()
                .filter_map(|node| self.arena.label_name(*node).map(|label| (label, *node)))
                .collect();

            let mut bindings = Vec::new();
            for node in &live {
                let Some(label) = self.arena.jump_label(*node) else {
                    continue;
                };
                match labels.get(label) {
                    Some(target) => bindings.push((*node, *target)),
                    None => {
                        warn!(jump = %node, label, "jump target not found");
                        return Err(WorkflowError::instruction_reference(*node, label));
                    }
                }
            }
            bindings
        };

        debug!(jumps = bindings.len(), "linked workflow instructions");
        for (jump, target) in bindings {
            self.arena.resolve_jump(jump, target);
        }
        Ok(())
    }

    /// Makes `instruction` the pending one, re-arming its per-visit state.
    /// `None` leaves the workflow idle and switches it off.
    fn make_pending(&mut self, instruction: Option<InstructionId>) {
        match instruction {
            Some(id) => {
                self.arena.reset(id);
                self.pending = Some(id);
            }
            None => {
                self.pending = None;
                self.status.on = false;
            }
        }
    }

    fn advance_from(&mut self, instruction: InstructionId) {
        let next = self.arena.next_instruction(instruction);
        if next.is_none() {
            debug!(instruction = %instruction, "workflow reached the end of its instructions");
        }
        self.make_pending(next);
    }

    fn record_failure(&mut self, instruction: InstructionId) {
        warn!(instruction = %instruction, number = self.instruction_number(instruction), "instruction failed");
        self.status.error = true;
        self.failed = Some(instruction);
    }

    /// Switches the workflow on and makes the first registered instruction
    /// pending. A workflow without instructions stays off.
    pub fn enable(&mut self) {
        if self.status.on {
            return;
        }
        self.status.on = true;
        let first = self.registered.first().map(|entry| entry.id);
        self.make_pending(first);
        info!(instructions = self.registered.len(), on = self.status.on, "workflow enabled");
    }

    pub fn disable(&mut self) {
        if self.status.on {
            self.make_pending(None);
            info!("workflow disabled");
        }
    }

    /// Runs one scan cycle.
    ///
    /// Structural problems found by the link pass abort the call; the link
    /// pass is retried on the next call until it succeeds.
    pub fn process(&mut self, register: &mut dyn MemoryRegister) -> Result<(), WorkflowError> {
        if !self.status.on {
            return Ok(());
        }

        if self.links_stale {
            self.link_instructions()?;
            self.links_stale = false;
        }

        let budget = self.config.transition_budget();
        let mut transitions = 0usize;

        while let Some(pending) = self.pending {
            match self.arena.process(pending, register) {
                ProcessResult::Success => {
                    self.advance_from(pending);
                    return Ok(());
                }
                ProcessResult::ContinueImmediately => {
                    self.advance_from(pending);
                    transitions += 1;
                    if transitions >= budget {
                        warn!(limit = budget, pending = ?self.pending, "immediate transition limit reached, resuming next cycle");
                        return Ok(());
                    }
                }
                ProcessResult::Repeat => return Ok(()),
                ProcessResult::FailureAndContinue => {
                    self.record_failure(pending);
                    self.advance_from(pending);
                    return Ok(());
                }
                ProcessResult::FailureAndRepeat => {
                    self.record_failure(pending);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn failed_instruction(&self) -> Option<InstructionId> {
        self.failed
    }

    /// Clears the error state if `instruction` is the recorded failure, or
    /// unconditionally when `None` is passed.
    pub fn release_failure(&mut self, instruction: Option<InstructionId>) {
        if instruction.is_none() || instruction == self.failed {
            if let Some(failed) = self.failed.take() {
                debug!(instruction = %failed, "failure released");
            }
            self.status.error = false;
        }
    }

    pub fn find_instruction_by_name(&self, name: &str) -> Option<InstructionId> {
        self.registered
            .iter()
            .find(|entry| entry.name.as_deref() == Some(name))
            .map(|entry| entry.id)
    }

    pub fn find_instruction_by_number(&self, number: i64) -> Option<InstructionId> {
        self.registered.iter().find(|entry| entry.number == number).map(|entry| entry.id)
    }

    /// Unregisters an instruction. Returns `false` when nothing matched.
    ///
    /// The instruction stays in the arena, so links pointing at it keep
    /// working, but its labels no longer resolve jumps.
    pub fn remove_instruction(&mut self, selector: impl Into<InstructionSelector>) -> bool {
        let id = match selector.into() {
            InstructionSelector::Id(id) => Some(id),
            InstructionSelector::Number(number) => self.find_instruction_by_number(number),
            InstructionSelector::Name(name) => self.find_instruction_by_name(&name),
        };
        let Some(position) = id.and_then(|id| self.registered.iter().position(|entry| entry.id == id)) else {
            return false;
        };
        let removed = self.registered.remove(position);
        debug!(instruction = %removed.id, number = removed.number, "removed instruction");
        self.links_stale = true;
        true
    }

    pub fn remove_all_instructions(&mut self) {
        self.registered.clear();
        self.links_stale = true;
    }

    pub fn instruction_count(&self) -> usize {
        self.registered.len()
    }

    pub fn has_pending_instructions(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_instruction(&self) -> Option<InstructionId> {
        self.pending
    }

    /// The registered instruction that is, or encloses, `id`.
    fn registration_of(&self, id: InstructionId) -> Option<&RegisteredInstruction> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if let Some(entry) = self.registered.iter().find(|entry| entry.id == current) {
                return Some(entry);
            }
            cursor = self.arena.owner(current);
        }
        None
    }

    fn instruction_number(&self, id: InstructionId) -> i64 {
        self.registration_of(id).map_or(IDLE_INSTRUCTION_NUMBER, |entry| entry.number)
    }

    /// Display number of the pending instruction; nested instructions report
    /// the number of their enclosing registered instruction.
    pub fn current_instruction_number(&self) -> i64 {
        self.pending.map_or(IDLE_INSTRUCTION_NUMBER, |pending| self.instruction_number(pending))
    }

    pub fn current_instruction_name(&self) -> &str {
        self.pending
            .and_then(|pending| self.registration_of(pending))
            .and_then(|entry| entry.name.as_deref())
            .unwrap_or(IDLE_INSTRUCTION_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::CallbackInstruction;
    use scanflow_types::InMemoryRegister;
    use std::{
        cell::RefCell,
        io,
        rc::Rc,
        sync::{Arc, Mutex},
    };

    /// Log sink shared between a test and its subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn with_captured_logs(run: impl FnOnce()) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, run);
        logs.text()
    }

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Instruction) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |tag: &'static str| {
            let sink = Rc::clone(&sink);
            Instruction::callback(move |_| sink.borrow_mut().push(tag))
        };
        (log, make)
    }

    #[test]
    fn status_bits_are_independent() {
        let mut workflow = Workflow::new();
        workflow
            .append_instruction(CallbackInstruction::with_result(|_| ProcessResult::FailureAndRepeat))
            .expect("append");

        assert_eq!(workflow.status().bits(), WorkflowStatus::OFF);
        workflow.enable();
        assert_eq!(workflow.status().bits(), WorkflowStatus::ON);

        let mut register = InMemoryRegister::new();
        workflow.process(&mut register).expect("process");
        assert_eq!(workflow.status().bits(), WorkflowStatus::ON | WorkflowStatus::ERROR);

        workflow.disable();
        assert!(!workflow.status().is_on());
        assert!(workflow.status().is_error());
    }

    #[test]
    fn enabling_an_empty_workflow_keeps_it_off() {
        let mut workflow = Workflow::new();
        workflow.enable();
        assert!(!workflow.status().is_on());
        assert!(!workflow.has_pending_instructions());
        assert_eq!(workflow.current_instruction_number(), IDLE_INSTRUCTION_NUMBER);
        assert_eq!(workflow.current_instruction_name(), IDLE_INSTRUCTION_NAME);
    }

    #[test]
    fn failure_and_continue_advances_and_records_failure() {
        let (log, make) = recorder();
        let mut workflow = Workflow::new();
        let failing = workflow
            .append_instruction(CallbackInstruction::with_result(|_| ProcessResult::FailureAndContinue))
            .expect("append failing");
        workflow.append_instruction(make("after")).expect("append after");
        workflow.enable();

        let mut register = InMemoryRegister::new();
        workflow.process(&mut register).expect("first cycle");
        assert_eq!(workflow.failed_instruction(), Some(failing));
        assert!(workflow.status().is_error());
        assert!(log.borrow().is_empty());

        workflow.process(&mut register).expect("second cycle");
        assert_eq!(*log.borrow(), vec!["after"]);
        assert!(!workflow.status().is_on());
        assert!(workflow.status().is_error());
    }

    #[test]
    fn release_failure_only_matches_recorded_instruction() {
        let mut workflow = Workflow::new();
        let failing = workflow
            .append_instruction(CallbackInstruction::with_result(|_| ProcessResult::FailureAndRepeat))
            .expect("append");
        let other = workflow.create_instruction(Instruction::label("unrelated"));
        workflow.enable();

        let mut register = InMemoryRegister::new();
        workflow.process(&mut register).expect("process");

        workflow.release_failure(Some(other));
        assert!(workflow.status().is_error());

        workflow.release_failure(Some(failing));
        assert!(!workflow.status().is_error());
        assert_eq!(workflow.failed_instruction(), None);

        workflow.process(&mut register).expect("process again");
        assert!(workflow.status().is_error());
        workflow.release_failure(None);
        assert!(!workflow.status().is_error());
    }

    #[test]
    fn registering_the_same_handle_twice_fails() {
        let mut workflow = Workflow::new();
        let label = workflow.create_instruction(Instruction::label("a"));
        workflow.add_instruction(label).expect("first registration");

        let err = workflow.add_instruction(label).expect_err("second registration");
        assert!(matches!(err, WorkflowError::DuplicateInstruction { instruction, .. } if instruction == label));
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let mut first = Workflow::new();
        let mut second = Workflow::new();
        let foreign = first.create_instruction(Instruction::label("a"));

        let err = second.add_instruction(foreign).expect_err("foreign handle");
        assert!(matches!(err, WorkflowError::UnknownInstruction { .. }));
    }

    #[test]
    fn labels_nested_in_blocks_collide_with_registered_labels() {
        let mut workflow = Workflow::new();
        workflow.append_instruction(Instruction::label("start")).expect("label");

        let err = workflow
            .append_instruction(Instruction::block([Instruction::label("start")]))
            .expect_err("duplicate nested label");
        assert!(matches!(err, WorkflowError::DuplicateInstruction { .. }));
        assert_eq!(workflow.instruction_count(), 1);
    }

    #[test]
    fn instructions_are_found_and_removed_by_number_and_name() {
        let mut workflow = Workflow::new();
        let first = workflow.append_instruction(Instruction::label("a")).expect("a");
        let second = workflow
            .append_instruction_with(Instruction::label("b"), Some(20), Some("second"))
            .expect("b");

        assert_eq!(workflow.find_instruction_by_number(0), Some(first));
        assert_eq!(workflow.find_instruction_by_number(20), Some(second));
        assert_eq!(workflow.find_instruction_by_name("second"), Some(second));
        assert_eq!(workflow.find_instruction_by_name("missing"), None);

        assert!(workflow.remove_instruction("second"));
        assert!(!workflow.remove_instruction(20_i64));
        assert!(workflow.remove_instruction(first));
        assert_eq!(workflow.instruction_count(), 0);
    }

    #[test]
    fn removing_a_label_breaks_jumps_at_next_process() {
        let mut workflow = Workflow::new();
        workflow.append_instruction(Instruction::jump("end")).expect("jump");
        workflow.append_instruction_with(Instruction::label("end"), None, Some("end")).expect("label");
        workflow.enable();

        let mut register = InMemoryRegister::new();
        workflow.process(&mut register).expect("linked");
        assert!(!workflow.status().is_on());

        assert!(workflow.remove_instruction("end"));
        workflow.enable();
        let err = workflow.process(&mut register).expect_err("label removed");
        assert!(matches!(err, WorkflowError::InstructionReference { ref label, .. } if label == "end"));
    }

    #[test]
    fn current_instruction_reports_enclosing_registration() {
        let mut workflow = Workflow::new();
        workflow
            .append_instruction_with(
                Instruction::block([Instruction::Callback(CallbackInstruction::with_result(|_| ProcessResult::Repeat))]),
                Some(7),
                Some("wait in block"),
            )
            .expect("block");
        workflow.enable();

        let mut register = InMemoryRegister::new();
        workflow.process(&mut register).expect("process");
        assert_eq!(workflow.current_instruction_number(), 7);
        assert_eq!(workflow.current_instruction_name(), "wait in block");
    }

    #[test]
    fn cyclic_immediate_chain_yields_after_the_limit() {
        let config = EngineConfig {
            immediate_transition_limit: 8,
            ..EngineConfig::default()
        };
        let counter = Rc::new(RefCell::new(0usize));
        let sink = Rc::clone(&counter);

        let mut workflow = Workflow::with_config(config);
        workflow.append_instruction(Instruction::label("top")).expect("label");
        workflow
            .append_instruction(Instruction::callback(move |_| *sink.borrow_mut() += 1))
            .expect("callback");
        workflow.append_instruction(Instruction::jump("top")).expect("jump");
        workflow.enable();

        let mut register = InMemoryRegister::new();
        workflow.process(&mut register).expect("first cycle");
        assert!(workflow.status().is_on());
        assert!(workflow.has_pending_instructions());
        let after_first = *counter.borrow();
        assert!(after_first > 0 && after_first <= 8);

        workflow.process(&mut register).expect("second cycle");
        assert!(*counter.borrow() > after_first);
    }

    #[test]
    fn end_of_chain_is_logged_only_when_reached() {
        let disabled = with_captured_logs(|| {
            let mut workflow = Workflow::new();
            workflow
                .append_instruction(CallbackInstruction::with_result(|_| ProcessResult::Repeat))
                .expect("append");
            workflow.enable();
            workflow.process(&mut InMemoryRegister::new()).expect("process");
            workflow.disable();
        });
        assert!(disabled.contains("workflow disabled"), "logs: {disabled}");
        assert!(!disabled.contains("reached the end"), "logs: {disabled}");

        let finished = with_captured_logs(|| {
            let mut workflow = Workflow::new();
            workflow.append_instruction(Instruction::label("only")).expect("append");
            workflow.enable();
            workflow.process(&mut InMemoryRegister::new()).expect("process");
            assert!(!workflow.status().is_on());
        });
        assert!(finished.contains("reached the end"), "logs: {finished}");
    }

    #[test]
    fn set_status_and_put_value_write_the_register() {
        let mut workflow = Workflow::new();
        workflow.append_instruction(Instruction::set_status("pump", 2, true)).expect("status");
        workflow
            .append_instruction(Instruction::put_value("speed", "drive", serde_json::json!(1200), true))
            .expect("value");
        workflow.enable();

        let mut register = InMemoryRegister::new();
        workflow.process(&mut register).expect("process");
        assert_eq!(register.get_status("pump").level, 2);
        assert!(register.get_status("pump").on);
        assert_eq!(register.get_value("speed", "drive"), Some(&serde_json::json!(1200)));
        assert!(!workflow.status().is_on());
    }
}
