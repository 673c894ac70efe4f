//! One scan over a set of named processes.
//!
//! The embedding scheduler owns the register and calls
//! [`ScanCycle::run_cycle`] once per tick. Every active process gets exactly
//! one `process` call; inactive ones are skipped.

use indexmap::IndexMap;
use scanflow_types::MemoryRegister;
use tracing::{trace, warn};

use crate::{error::WorkflowError, step::WorkflowManager, workflow::Workflow};

/// Something the scan driver can run once per cycle.
pub trait CyclicProcess {
    /// Whether the process has work to do this cycle.
    fn is_active(&mut self) -> bool;

    fn process_cycle(&mut self, register: &mut dyn MemoryRegister) -> Result<(), WorkflowError>;
}

impl CyclicProcess for Workflow {
    fn is_active(&mut self) -> bool {
        self.status().is_on()
    }

    fn process_cycle(&mut self, register: &mut dyn MemoryRegister) -> Result<(), WorkflowError> {
        self.process(register)
    }
}

impl CyclicProcess for WorkflowManager {
    fn is_active(&mut self) -> bool {
        self.needs_process()
    }

    fn process_cycle(&mut self, register: &mut dyn MemoryRegister) -> Result<(), WorkflowError> {
        self.process(register);
        Ok(())
    }
}

#[derive(Default)]
pub struct ScanCycle {
    processes: IndexMap<String, Box<dyn CyclicProcess>>,
}

impl ScanCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a process under `name`, replacing any process with that name.
    pub fn add_process(&mut self, name: impl Into<String>, process: impl CyclicProcess + 'static) {
        self.processes.insert(name.into(), Box::new(process));
    }

    pub fn remove_process(&mut self, name: &str) -> Option<Box<dyn CyclicProcess>> {
        self.processes.shift_remove(name)
    }

    pub fn process_mut(&mut self, name: &str) -> Option<&mut (dyn CyclicProcess + 'static)> {
        self.processes.get_mut(name).map(|process| process.as_mut())
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Runs every active process once, in insertion order.
    ///
    /// Stops at the first structural error and returns it attributed to the
    /// failing process. Returns the number of processes that ran.
    pub fn run_cycle(&mut self, register: &mut dyn MemoryRegister) -> Result<usize, WorkflowError> {
        let mut ran = 0;
        for (name, process) in self.processes.iter_mut() {
            if !process.is_active() {
                trace!(process = %name, "skipping inactive process");
                continue;
            }
            if let Err(err) = process.process_cycle(register) {
                warn!(process = %name, error = %err, "process failed");
                return Err(err.in_process(name.as_str()));
            }
            ran += 1;
        }
        Ok(ran)
    }
}
