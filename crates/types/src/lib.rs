//! Shared types for the scanflow engine.
//!
//! The engine never owns the process image it operates on. Everything it reads
//! or writes goes through the [`MemoryRegister`] contract defined here, which
//! keeps the interpreters independent of how an embedding PLC runtime stores
//! its state.

pub mod register;
pub mod step_data;

pub use register::{DEFAULT_NAMESPACE, InMemoryRegister, MemoryRegister, Status, StoredValue};
pub use step_data::StepData;
