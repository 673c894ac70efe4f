//! Engine configuration.
//!
//! The configuration bounds the amount of work a
//! single `process` call may do and sets defaults for newly created step
//! trees. Documents may be YAML or JSON; the format is picked from the file
//! extension and falls back to YAML.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default upper bound on same-call re-entries within one `process` call.
pub const DEFAULT_IMMEDIATE_TRANSITION_LIMIT: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of continue-immediately / continue-in-cycle re-entries
    /// performed by one `process` call before control is handed back to the
    /// scheduler. The cursor is left in place so the next cycle resumes.
    pub immediate_transition_limit: usize,
    /// Loop mode applied to newly created step trees.
    pub loop_workflows: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            immediate_transition_limit: DEFAULT_IMMEDIATE_TRANSITION_LIMIT,
            loop_workflows: false,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration document. JSON is a subset of YAML, so both
    /// formats are accepted here.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse engine configuration")
    }

    /// Loads a configuration file, choosing the parser by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read engine configuration: {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

        if is_json {
            serde_json::from_str(&content).with_context(|| format!("Failed to parse engine configuration: {}", path.display()))
        } else {
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse engine configuration: {}", path.display()))
        }
    }

    /// Effective re-entry budget; a zero limit still allows one pass.
    pub(crate) fn transition_budget(&self) -> usize {
        self.immediate_transition_limit.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = EngineConfig::from_yaml_str("loop_workflows: true\n").expect("parse config");
        assert!(config.loop_workflows);
        assert_eq!(config.immediate_transition_limit, DEFAULT_IMMEDIATE_TRANSITION_LIMIT);
    }

    #[test]
    fn load_picks_parser_from_extension() {
        let temp_dir = tempfile::tempdir().unwrap();

        let json_path = temp_dir.path().join("engine.json");
        fs::write(&json_path, r#"{ "immediate_transition_limit": 25 }"#).unwrap();
        let config = EngineConfig::load(&json_path).expect("load json config");
        assert_eq!(config.immediate_transition_limit, 25);
        assert!(!config.loop_workflows);

        let yaml_path = temp_dir.path().join("engine.yaml");
        fs::write(&yaml_path, "immediate_transition_limit: 7\nloop_workflows: true\n").unwrap();
        let config = EngineConfig::load(&yaml_path).expect("load yaml config");
        assert_eq!(config.immediate_transition_limit, 7);
        assert!(config.loop_workflows);
    }

    #[test]
    fn load_reports_path_on_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        fs::write(&path, "immediate_transition_limit: [not, a, number]\n").unwrap();

        let error = EngineConfig::load(&path).expect_err("invalid config must fail");
        assert!(format!("{error}").contains("broken.yaml"), "unexpected error: {error}");
    }

    #[test]
    fn zero_limit_still_allows_a_pass() {
        let config = EngineConfig {
            immediate_transition_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.transition_budget(), 1);
    }
}
