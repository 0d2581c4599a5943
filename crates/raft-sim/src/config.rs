//! # config
//!
//! why: collect every knob of a simulation run in one serializable place
//! relations: consumed by engine.rs; loaded from json by the raft-sim binary
//! what: SimConfig with defaults, json loading and validation

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use raft_core::{NodeId, RaftConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Default seed for timeout jitter
pub const DEFAULT_SEED: u64 = 42;

/// Default number of ticks a message spends on the wire
pub const MESSAGE_TRAVEL_TICKS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Cluster members, in the order the engine processes them
    pub node_ids: Vec<NodeId>,
    pub message_travel_ticks: u64,
    /// Seed for every node's election timeout jitter
    pub seed: u64,
    pub raft: RaftConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            node_ids: (1..=5).map(|i| format!("S{i}")).collect(),
            message_travel_ticks: MESSAGE_TRAVEL_TICKS,
            seed: DEFAULT_SEED,
            raft: RaftConfig::default(),
        }
    }
}

impl SimConfig {
    /// Parse and validate a json config. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a json config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_ids.is_empty() {
            return Err(SimError::InvalidConfig("cluster has no nodes".into()));
        }
        let unique: BTreeSet<&NodeId> = self.node_ids.iter().collect();
        if unique.len() != self.node_ids.len() {
            return Err(SimError::InvalidConfig("node ids must be unique".into()));
        }
        if self.node_ids.iter().any(|id| id.is_empty()) {
            return Err(SimError::InvalidConfig("node ids must not be empty".into()));
        }
        if self.message_travel_ticks == 0 {
            return Err(SimError::InvalidConfig(
                "message_travel_ticks must be at least 1".into(),
            ));
        }
        if self.raft.heartbeat_interval == 0 {
            return Err(SimError::InvalidConfig(
                "heartbeat_interval must be at least 1".into(),
            ));
        }
        if self.raft.election_timeout_min == 0
            || self.raft.election_timeout_min >= self.raft.election_timeout_max
        {
            return Err(SimError::InvalidConfig(format!(
                "election timeout range {}..{} is empty",
                self.raft.election_timeout_min, self.raft.election_timeout_max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid_five_node_cluster() {
        let config = SimConfig::default();
        assert_eq!(config.node_ids, vec!["S1", "S2", "S3", "S4", "S5"]);
        assert_eq!(config.message_travel_ticks, 5);
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config = SimConfig::from_json_str(r#"{"seed": 7, "raft": {"heartbeat_interval": 4}}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.raft.heartbeat_interval, 4);
        assert_eq!(config.raft.election_timeout_min, 25);
        assert_eq!(config.node_ids.len(), 5);
    }

    #[test]
    fn rejects_invalid_configs() {
        for json in [
            r#"{"node_ids": []}"#,
            r#"{"node_ids": ["A", "A"]}"#,
            r#"{"message_travel_ticks": 0}"#,
            r#"{"raft": {"heartbeat_interval": 0}}"#,
            r#"{"raft": {"election_timeout_min": 30, "election_timeout_max": 30}}"#,
        ] {
            assert!(
                matches!(SimConfig::from_json_str(json), Err(SimError::InvalidConfig(_))),
                "accepted {json}"
            );
        }
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(SimConfig::from_json_str("{"), Err(SimError::Json(_))));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"node_ids": ["A", "B", "C"], "seed": 3}}"#).unwrap();

        let config = SimConfig::load(file.path()).unwrap();

        assert_eq!(config.node_ids, vec!["A", "B", "C"]);
        assert_eq!(config.seed, 3);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = SimConfig::load(dir.path().join("missing.json"));
        assert!(matches!(result, Err(SimError::Io(_))));
    }
}
