//! # Configuration
//!
//! Pipeline topology needs a typed configuration surface even though full
//! YAML/JSON file *loading* is out of core scope (§1) — the core only
//! requires that whatever external loader parses a config file hand it a
//! `serde_json::Value` tree. Mirrors the teacher's `TransportConfig`: one
//! flat struct per concern, with `serde_json::Value` for the
//! per-action parameter bags a fixed struct can't anticipate (stage names
//! and their parameters are a factory keyed on configuration, per Design
//! Notes §9).

use crate::error::{FailurePolicy, MultioError, Result};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfigSpec {
    pub kind: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub communicator_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    /// The registered stage name (`"select"`, `"add-const"`, `"windspeed"`, ...).
    pub kind: String,
    /// Stage-specific parameters, parsed by the stage's own constructor.
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    pub kind: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub journaled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// The category this pipeline handles (matched against `Select`'s
    /// configured categories and the listener's destination-domain lookup).
    pub name: String,
    pub actions: Vec<ActionConfig>,
    pub sink: SinkConfig,
    #[serde(default)]
    pub failure_policy: Option<String>,
}

impl PipelineConfig {
    pub fn try_from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| MultioError::Configuration(format!("invalid pipeline configuration: {e}")))
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
            .as_deref()
            .map(FailurePolicy::from_str_lenient)
            .unwrap_or_default()
    }
}

/// The full process configuration: one transport, and the named pipelines
/// messages are routed into by destination category.
#[derive(Debug, Clone, Deserialize)]
pub struct RootConfig {
    pub transport: TransportConfigSpec,
    pub pipelines: Vec<PipelineConfig>,
}

impl RootConfig {
    pub fn try_from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| MultioError::Configuration(format!("invalid configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_minimal_pipeline_config() {
        let value = json!({
            "name": "ocean",
            "actions": [
                {"kind": "select", "params": {"categories": ["ocean"]}},
                {"kind": "sink"}
            ],
            "sink": {"kind": "file", "path": "/tmp/out.bin"}
        });
        let config = PipelineConfig::try_from_value(value).unwrap();
        assert_eq!(config.name, "ocean");
        assert_eq!(config.actions.len(), 2);
        assert_eq!(config.failure_policy(), FailurePolicy::Continue);
    }

    #[test]
    fn rejects_malformed_configuration() {
        let value = json!({"name": "ocean"});
        assert!(PipelineConfig::try_from_value(value).is_err());
    }

    #[test]
    fn abort_failure_policy_parses() {
        let value = json!({
            "name": "ocean",
            "actions": [],
            "sink": {"kind": "file", "path": "/tmp/out.bin"},
            "failure_policy": "abort"
        });
        let config = PipelineConfig::try_from_value(value).unwrap();
        assert_eq!(config.failure_policy(), FailurePolicy::Abort);
    }
}
