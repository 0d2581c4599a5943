//! # message
//!
//! why: define all raft rpc message types for node communication
//! relations: produced and consumed by node.rs, carried by the simulation bus
//! what: RaftMessage payloads and the Envelope addressing them

use serde::{Deserialize, Serialize};

use crate::log::LogEntry;
use crate::NodeId;

/// All possible Raft messages between nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RaftMessage {
    /// Request a vote during leader election
    RequestVote {
        last_log_index: u64,
        last_log_term: u64,
    },
    /// Vote given to the candidate for the envelope's term
    VoteGranted,
    /// Vote refused; the envelope carries the voter's term
    VoteDenied,
    /// Replicate log entries starting after `prev_log_index`
    AppendEntries {
        prev_log_index: u64,
        prev_log_term: u64,
        entries: Vec<LogEntry>,
        leader_commit: u64,
    },
    /// The follower's log matches the leader's up to `match_index`
    AppendAck { match_index: u64 },
    /// Consistency check failed; `match_index` is the follower's log length
    AppendNack { match_index: u64 },
    /// Content-free AppendEntries: asserts leadership and carries the
    /// commit index along with the consistency point
    Heartbeat {
        prev_log_index: u64,
        prev_log_term: u64,
        leader_commit: u64,
    },
}

impl RaftMessage {
    /// Short name of the message type, used by snapshots and logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestVote { .. } => "RequestVote",
            Self::VoteGranted => "VoteGranted",
            Self::VoteDenied => "VoteDenied",
            Self::AppendEntries { .. } => "AppendEntries",
            Self::AppendAck { .. } => "AppendAck",
            Self::AppendNack { .. } => "AppendNack",
            Self::Heartbeat { .. } => "Heartbeat",
        }
    }
}

/// A message addressed from one node to another, stamped with the sender's term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: NodeId,
    pub to: NodeId,
    pub term: u64,
    pub message: RaftMessage,
}

impl Envelope {
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>, term: u64, message: RaftMessage) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            term,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let vote = RaftMessage::RequestVote { last_log_index: 0, last_log_term: 0 };
        assert_eq!(vote.kind(), "RequestVote");
        assert_eq!(RaftMessage::AppendNack { match_index: 3 }.kind(), "AppendNack");
        let hb = RaftMessage::Heartbeat { prev_log_index: 0, prev_log_term: 0, leader_commit: 0 };
        assert_eq!(hb.kind(), "Heartbeat");
    }

    #[test]
    fn serializes_with_type_tag() {
        let env = Envelope::new("S1", "S2", 3, RaftMessage::AppendAck { match_index: 2 });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["message"]["type"], "AppendAck");
        assert_eq!(json["message"]["match_index"], 2);
        assert_eq!(json["term"], 3);
    }
}
