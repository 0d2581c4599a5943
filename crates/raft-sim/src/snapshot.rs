//! # snapshot
//!
//! why: give renderers a read-only, serializable picture of the cluster
//! relations: built by engine.rs from nodes, the bus and the partition
//! what: ClusterSnapshot, NodeSnapshot, MessageSnapshot

use std::collections::BTreeMap;

use raft_core::{LogEntry, NodeId, NodeState, RaftMessage, RaftNode};
use serde::{Deserialize, Serialize};

use crate::bus::InFlight;
use crate::partition::Partition;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub state: NodeState,
    pub alive: bool,
    pub term: u64,
    pub voted_for: Option<NodeId>,
    pub leader_id: Option<NodeId>,
    pub log: Vec<LogEntry>,
    pub commit_index: u64,
    pub election_timer: u64,
    pub heartbeat_timer: u64,
    pub votes_received: Vec<NodeId>,
    pub next_index: BTreeMap<NodeId, u64>,
    pub match_index: BTreeMap<NodeId, u64>,
}

impl From<&RaftNode> for NodeSnapshot {
    fn from(node: &RaftNode) -> Self {
        Self {
            id: node.id.clone(),
            state: node.state,
            alive: node.alive,
            term: node.current_term,
            voted_for: node.voted_for.clone(),
            leader_id: node.leader_id.clone(),
            log: node.log.entries().to_vec(),
            commit_index: node.commit_index,
            election_timer: node.election_timer.remaining(),
            heartbeat_timer: node.heartbeat_timer.remaining(),
            votes_received: node.votes_received.iter().cloned().collect(),
            next_index: node.next_index.clone(),
            match_index: node.match_index.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub id: u64,
    pub from: NodeId,
    pub to: NodeId,
    pub kind: String,
    pub term: u64,
    pub payload: RaftMessage,
    pub progress: f64,
}

impl From<&InFlight> for MessageSnapshot {
    fn from(message: &InFlight) -> Self {
        Self {
            id: message.id,
            from: message.envelope.from.clone(),
            to: message.envelope.to.clone(),
            kind: message.envelope.message.kind().to_string(),
            term: message.envelope.term,
            payload: message.envelope.message.clone(),
            progress: message.progress(),
        }
    }
}

/// Everything a renderer needs to draw one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub tick: u64,
    pub nodes: Vec<NodeSnapshot>,
    pub messages: Vec<MessageSnapshot>,
    pub partition: Option<Partition>,
    pub leader: Option<NodeId>,
}

impl ClusterSnapshot {
    pub fn node(&self, id: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
