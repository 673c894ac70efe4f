//! Shared state register contract.
//!
//! A register is the process image every workflow reads and writes during a
//! scan. It carries two independent tables:
//!
//! - named **status** entries, each an integer level plus an on/off bit
//! - namespaced **values** holding arbitrary JSON
//!
//! The level of a status entry is an opaque, comparable counter. It is not
//! derived from the on/off bit and the engine never assumes an enumerated
//! meaning for it; conditions compare against the level only.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace used when callers do not care about value partitioning.
pub const DEFAULT_NAMESPACE: &str = "global";

/// Snapshot of a named status entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Integer level of the entry. Unknown entries report `0`.
    pub level: i64,
    /// On/off interpretation of the entry, independent of `level`.
    pub on: bool,
}

impl Status {
    pub fn new(level: i64, on: bool) -> Self {
        Self { level, on }
    }
}

/// Narrow read/write contract the engine consumes.
///
/// Implementations are owned by the embedding runtime and outlive every
/// workflow that touches them.
pub trait MemoryRegister {
    /// Returns the status stored under `name`, or the zero status when absent.
    fn get_status(&self, name: &str) -> Status;

    /// Stores `level` and the on/off bit under `name`.
    fn set_status(&mut self, level: i64, name: &str, on: bool);

    /// Returns the value stored under `name` in `namespace`.
    fn get_value(&self, name: &str, namespace: &str) -> Option<&Value>;

    /// Stores `value` under `name` in `namespace`. `persist` marks the value
    /// for the embedder's persistence layer.
    fn put_value(&mut self, value: Value, name: &str, namespace: &str, persist: bool);

    /// Stores `level` under `name` and switches the entry on.
    fn set_status_on(&mut self, level: i64, name: &str) {
        self.set_status(level, name, true);
    }
}

/// A value entry together with its persistence marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: Value,
    pub persist: bool,
}

/// Insertion-ordered, heap-backed register.
///
/// Suitable for tests, simulations and single-process embedders. Iteration
/// follows first-write order so snapshots are deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryRegister {
    statuses: IndexMap<String, Status>,
    values: IndexMap<String, IndexMap<String, StoredValue>>,
}

impl InMemoryRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates over all status entries in first-write order.
    pub fn statuses(&self) -> impl Iterator<Item = (&str, Status)> {
        self.statuses.iter().map(|(name, status)| (name.as_str(), *status))
    }

    /// Iterates over `(namespace, name, value)` triples flagged for persistence.
    pub fn persistent_values(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.values.iter().flat_map(|(namespace, entries)| {
            entries
                .iter()
                .filter(|(_, stored)| stored.persist)
                .map(move |(name, stored)| (namespace.as_str(), name.as_str(), &stored.value))
        })
    }

    /// Removes every value in `namespace`, returning how many were dropped.
    pub fn clear_namespace(&mut self, namespace: &str) -> usize {
        self.values.shift_remove(namespace).map(|entries| entries.len()).unwrap_or(0)
    }
}

impl MemoryRegister for InMemoryRegister {
    fn get_status(&self, name: &str) -> Status {
        self.statuses.get(name).copied().unwrap_or_default()
    }

    fn set_status(&mut self, level: i64, name: &str, on: bool) {
        self.statuses.insert(name.to_string(), Status::new(level, on));
    }

    fn get_value(&self, name: &str, namespace: &str) -> Option<&Value> {
        self.values.get(namespace)?.get(name).map(|stored| &stored.value)
    }

    fn put_value(&mut self, value: Value, name: &str, namespace: &str, persist: bool) {
        self.values
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), StoredValue { value, persist });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_status_reads_as_zero_and_off() {
        let register = InMemoryRegister::new();
        assert_eq!(register.get_status("missing"), Status::new(0, false));
    }

    #[test]
    fn level_and_on_bit_are_independent() {
        let mut register = InMemoryRegister::new();
        register.set_status(0, "pump", false);
        register.set_status_on(1, "pump");
        assert_eq!(register.get_status("pump"), Status::new(1, true));

        register.set_status(2, "pump", false);
        let status = register.get_status("pump");
        assert_eq!(status.level, 2);
        assert!(!status.on);
    }

    #[test]
    fn values_are_partitioned_by_namespace() {
        let mut register = InMemoryRegister::new();
        register.put_value(json!(42), "speed", "line-a", false);
        register.put_value(json!("fast"), "speed", "line-b", true);

        assert_eq!(register.get_value("speed", "line-a"), Some(&json!(42)));
        assert_eq!(register.get_value("speed", "line-b"), Some(&json!("fast")));
        assert_eq!(register.get_value("speed", DEFAULT_NAMESPACE), None);

        let persisted: Vec<_> = register.persistent_values().collect();
        assert_eq!(persisted, vec![("line-b", "speed", &json!("fast"))]);
    }

    #[test]
    fn clear_namespace_drops_only_that_namespace() {
        let mut register = InMemoryRegister::new();
        register.put_value(json!(1), "a", "scratch", false);
        register.put_value(json!(2), "b", "scratch", false);
        register.put_value(json!(3), "a", DEFAULT_NAMESPACE, false);

        assert_eq!(register.clear_namespace("scratch"), 2);
        assert_eq!(register.get_value("a", "scratch"), None);
        assert_eq!(register.get_value("a", DEFAULT_NAMESPACE), Some(&json!(3)));
    }
}
