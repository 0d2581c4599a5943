//! # event
//!
//! why: report what happened during a tick to whoever renders the cluster
//! relations: emitted by node.rs transitions and by the simulation engine
//! what: Event taxonomy and message drop reasons

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Why the bus discarded a message instead of delivering it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// The sender was dead when the message arrived
    SenderDown,
    /// The recipient was dead when the message arrived
    RecipientDown,
    /// A partition separated sender and recipient when the message arrived
    Partitioned,
}

/// Domain events produced by the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    ElectionStarted { node: NodeId, term: u64 },
    VoteGranted { from: NodeId, to: NodeId, term: u64 },
    LeaderElected { node: NodeId, term: u64 },
    SteppedDown { node: NodeId, new_term: u64 },
    EntryReplicated { leader: NodeId, follower: NodeId, indices: RangeInclusive<u64> },
    EntryCommitted { index: u64 },
    NodeKilled { node: NodeId },
    NodeRevived { node: NodeId },
    PartitionFormed { group_a: Vec<NodeId>, group_b: Vec<NodeId> },
    PartitionHealed,
    ClientRequestAccepted { leader: NodeId, index: u64 },
    ClientRequestRejected { reason: String },
    MessageDropped { id: u64, from: NodeId, to: NodeId, reason: DropReason },
}
