//! # partition
//!
//! why: model a network split between two groups of nodes
//! relations: consulted by engine.rs when the bus delivers a message
//! what: Partition with validation and the reachability check

use std::collections::BTreeSet;

use raft_core::NodeId;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// A bisection of the cluster. Two nodes can talk only if they are in the
/// same group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub group_a: BTreeSet<NodeId>,
    pub group_b: BTreeSet<NodeId>,
}

impl Partition {
    /// Split `members` into `group_a` and everyone else.
    ///
    /// Both sides must be non-empty and `group_a` may only name members.
    pub fn bisect<I>(members: &[NodeId], group_a: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        let group_a: BTreeSet<NodeId> = group_a.into_iter().map(Into::into).collect();
        if let Some(unknown) = group_a.iter().find(|id| !members.contains(id)) {
            return Err(SimError::UnknownNode(unknown.clone()));
        }
        if group_a.is_empty() {
            return Err(SimError::InvalidPartition("group A is empty".into()));
        }
        let group_b: BTreeSet<NodeId> = members
            .iter()
            .filter(|id| !group_a.contains(*id))
            .cloned()
            .collect();
        if group_b.is_empty() {
            return Err(SimError::InvalidPartition(
                "group A covers the whole cluster".into(),
            ));
        }
        Ok(Self { group_a, group_b })
    }

    /// Whether a message from `a` to `b` may cross this partition
    pub fn can_communicate(&self, a: &str, b: &str) -> bool {
        (self.group_a.contains(a) && self.group_a.contains(b))
            || (self.group_b.contains(a) && self.group_b.contains(b))
    }
}
