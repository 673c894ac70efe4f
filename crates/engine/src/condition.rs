//! Boolean condition trees evaluated against the shared register.
//!
//! Conditions are pure: evaluating the same tree against an unchanged
//! register always yields the same answer, so instructions may re-evaluate
//! them every cycle.

use scanflow_types::MemoryRegister;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    True,
    False,
    Not(Box<Condition>),
    /// True on the first true child; false when empty.
    AnyOf(Vec<Condition>),
    /// False on the first false child; true when empty.
    AllOf(Vec<Condition>),
    /// True when the status level stored under `name` equals `level`.
    HasStatus { name: String, level: i64 },
}

impl Condition {
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    pub fn any_of(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::AnyOf(conditions.into_iter().collect())
    }

    pub fn all_of(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::AllOf(conditions.into_iter().collect())
    }

    pub fn has_status(name: impl Into<String>, level: i64) -> Self {
        Condition::HasStatus { name: name.into(), level }
    }

    pub fn evaluate(&self, register: &dyn MemoryRegister) -> bool {
        match self {
            Condition::True => true,
            Condition::False => false,
            Condition::Not(inner) => !inner.evaluate(register),
            Condition::AnyOf(children) => children.iter().any(|child| child.evaluate(register)),
            Condition::AllOf(children) => children.iter().all(|child| child.evaluate(register)),
            Condition::HasStatus { name, level } => register.get_status(name).level == *level,
        }
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        if value { Condition::True } else { Condition::False }
    }
}
