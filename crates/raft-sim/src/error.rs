//! # error
//!
//! why: report caller mistakes at the control surface as typed errors
//! relations: returned by engine.rs and config.rs
//! what: SimError and the crate Result alias

use raft_core::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let err = SimError::UnknownNode("S9".to_string());
        assert_eq!(err.to_string(), "Unknown node: S9");

        let err = SimError::InvalidPartition("group is empty".to_string());
        assert!(err.to_string().contains("group is empty"));
    }

    #[test]
    fn test_error_from_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "missing.json");
        match SimError::from(io_error) {
            SimError::Io(_) => {}
            other => panic!("Should convert to Io error, got {other:?}"),
        }

        let json_error = serde_json::from_str::<u64>("nope").unwrap_err();
        assert!(matches!(SimError::from(json_error), SimError::Json(_)));
    }
}
