//! # engine
//!
//! why: run a whole cluster one discrete tick at a time, deterministically
//! relations: drives raft-core nodes, owns bus.rs, partition.rs and clock.rs;
//!            its public methods are the control surface used by renderers
//! what: Simulation (step, client requests, crash/revive, partition/heal,
//!       reset, snapshot) and ClientReply

use std::collections::BTreeMap;

use raft_core::{DropReason, Envelope, Event, NodeId, RaftMessage, RaftNode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bus::{Delivery, MessageBus};
use crate::clock::Clock;
use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::partition::Partition;
use crate::snapshot::{ClusterSnapshot, MessageSnapshot, NodeSnapshot};

/// Outcome of a client request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientReply {
    pub accepted: bool,
    /// The leader the request was routed to, if one exists
    pub leader_id: Option<NodeId>,
    /// Log index of the appended entry when accepted
    pub index: Option<u64>,
}

/// A fixed cluster of Raft nodes connected by a simulated network.
///
/// All state is owned here and only changes through the methods below.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimConfig,
    clock: Clock,
    nodes: BTreeMap<NodeId, RaftNode>,
    bus: MessageBus,
    partition: Option<Partition>,
    /// Events raised by control operations, returned by the next step
    pending: Vec<Event>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::build(SimConfig::default())
    }
}

impl Simulation {
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimConfig) -> Self {
        let nodes = config
            .node_ids
            .iter()
            .enumerate()
            .map(|(position, id)| {
                let node = RaftNode::with_seed(
                    id.clone(),
                    config.node_ids.clone(),
                    config.raft.clone(),
                    config.seed.wrapping_add(position as u64),
                );
                (id.clone(), node)
            })
            .collect();
        info!(
            "cluster of {} nodes created (seed {})",
            config.node_ids.len(),
            config.seed
        );
        Self {
            clock: Clock::new(),
            nodes,
            bus: MessageBus::new(config.message_travel_ticks),
            partition: None,
            pending: Vec::new(),
            config,
        }
    }

    // -- read access --

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Number of completed steps
    pub fn tick(&self) -> u64 {
        self.clock.now()
    }

    pub fn node(&self, id: &str) -> Option<&RaftNode> {
        self.nodes.get(id)
    }

    /// Nodes in ascending id order
    pub fn nodes(&self) -> impl Iterator<Item = &RaftNode> {
        self.nodes.values()
    }

    /// The alive leader with the highest term. A stale leader cut off by a
    /// partition can coexist with a newer one until it hears of it.
    pub fn leader(&self) -> Option<&RaftNode> {
        self.nodes
            .values()
            .filter(|n| n.alive && n.is_leader())
            .max_by_key(|n| n.current_term)
    }

    pub fn partition(&self) -> Option<&Partition> {
        self.partition.as_ref()
    }

    pub fn in_flight(&self) -> usize {
        self.bus.len()
    }

    pub fn snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot {
            tick: self.clock.now(),
            nodes: self.nodes.values().map(NodeSnapshot::from).collect(),
            messages: self.bus.in_flight().iter().map(MessageSnapshot::from).collect(),
            partition: self.partition.clone(),
            leader: self.leader().map(|n| n.id.clone()),
        }
    }

    // -- the tick --

    /// Advance the cluster by one tick and return what happened.
    ///
    /// Messages arriving this tick are delivered and fully handled before any
    /// timer runs; nodes are visited in ascending id order.
    pub fn step(&mut self) -> Vec<Event> {
        let mut events = std::mem::take(&mut self.pending);
        let tick = self.clock.advance();

        let nodes = &self.nodes;
        let partition = self.partition.as_ref();
        let deliveries = self
            .bus
            .advance(|envelope| drop_reason(nodes, partition, envelope));

        for delivery in deliveries {
            match delivery {
                Delivery::Delivered(message) => {
                    let to = message.envelope.to.clone();
                    if let Some(node) = self.nodes.get_mut(&to) {
                        node.handle_message(message.envelope);
                    }
                    self.collect(&to, &mut events);
                }
                Delivery::Dropped(message, reason) => events.push(Event::MessageDropped {
                    id: message.id,
                    from: message.envelope.from,
                    to: message.envelope.to,
                    reason,
                }),
            }
        }

        let ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        for id in ids {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.tick();
            }
            self.collect(&id, &mut events);
        }

        debug!(
            "tick {}: {} events, {} messages in flight",
            tick,
            events.len(),
            self.bus.len()
        );
        events
    }

    /// Step `ticks` times, concatenating the events
    pub fn run(&mut self, ticks: u64) -> Vec<Event> {
        (0..ticks).flat_map(|_| self.step()).collect()
    }

    /// Move a node's outbound messages onto the bus and its events into
    /// `events`. Vote requests go only to nodes that are up; everything
    /// else travels and is judged on arrival.
    fn collect(&mut self, id: &str, events: &mut Vec<Event>) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let outbox = node.take_outbox();
        events.extend(node.take_events());
        for envelope in outbox {
            let is_vote_request = matches!(envelope.message, RaftMessage::RequestVote { .. });
            if is_vote_request && !self.nodes.get(&envelope.to).is_some_and(|n| n.alive) {
                continue;
            }
            self.bus.send(envelope);
        }
    }

    // -- control surface --

    /// Hand a command to the current leader.
    ///
    /// Without a leader the request is rejected and not retried.
    pub fn client_request(&mut self, command: &str) -> ClientReply {
        let leader_id = self.leader().map(|n| n.id.clone());
        if command.trim().is_empty() {
            return self.reject("empty command", leader_id);
        }
        let Some(leader_id) = leader_id else {
            return self.reject("no leader available", None);
        };
        let Some(node) = self.nodes.get_mut(&leader_id) else {
            return self.reject("no leader available", None);
        };
        let Some(index) = node.propose(command) else {
            return self.reject("leader refused the command", Some(leader_id));
        };

        let node_events = node.take_events();
        info!("client command {:?} appended by {} at index {}", command, leader_id, index);
        self.pending.push(Event::ClientRequestAccepted {
            leader: leader_id.clone(),
            index,
        });
        self.pending.extend(node_events);
        ClientReply {
            accepted: true,
            leader_id: Some(leader_id),
            index: Some(index),
        }
    }

    fn reject(&mut self, reason: &str, leader_id: Option<NodeId>) -> ClientReply {
        warn!("client request rejected: {}", reason);
        self.pending.push(Event::ClientRequestRejected {
            reason: reason.to_string(),
        });
        ClientReply {
            accepted: false,
            leader_id,
            index: None,
        }
    }

    /// Crash or revive a node. Setting the current state again is a no-op.
    pub fn set_node_alive(&mut self, id: &str, alive: bool) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| SimError::UnknownNode(id.to_string()))?;
        if node.alive == alive {
            return Ok(());
        }
        if alive {
            node.recover();
            self.pending.push(Event::NodeRevived { node: id.to_string() });
        } else {
            node.crash();
            self.pending.push(Event::NodeKilled { node: id.to_string() });
        }
        for peer in self.nodes.values_mut() {
            peer.set_peer_alive(id, alive);
        }
        Ok(())
    }

    /// Split the network into `group_a` and the remaining nodes, replacing
    /// any existing partition. Messages already in flight are judged when
    /// they arrive.
    pub fn set_partition<I>(&mut self, group_a: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        let partition = Partition::bisect(&self.config.node_ids, group_a)?;
        info!(
            "network partitioned: {:?} | {:?}",
            partition.group_a, partition.group_b
        );
        self.pending.push(Event::PartitionFormed {
            group_a: partition.group_a.iter().cloned().collect(),
            group_b: partition.group_b.iter().cloned().collect(),
        });
        self.partition = Some(partition);
        Ok(())
    }

    pub fn heal_partition(&mut self) {
        if self.partition.take().is_some() {
            info!("network partition healed");
            self.pending.push(Event::PartitionHealed);
        }
    }

    /// Force a node's election countdown, e.g. to trigger an election on
    /// the next step with `ticks = 1`
    pub fn set_election_timer(&mut self, id: &str, ticks: u64) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| SimError::UnknownNode(id.to_string()))?;
        node.set_election_timer(ticks);
        Ok(())
    }

    /// Discard all state and rebuild the cluster from the same config,
    /// so the run replays identically
    pub fn reset(&mut self) {
        info!("simulation reset at tick {}", self.clock.now());
        *self = Self::build(self.config.clone());
    }
}

/// Decide at arrival time whether a message can be delivered
fn drop_reason(
    nodes: &BTreeMap<NodeId, RaftNode>,
    partition: Option<&Partition>,
    envelope: &Envelope,
) -> Option<DropReason> {
    let alive = |id: &str| nodes.get(id).is_some_and(|n| n.alive);
    if !alive(&envelope.from) {
        Some(DropReason::SenderDown)
    } else if !alive(&envelope.to) {
        Some(DropReason::RecipientDown)
    } else if partition.is_some_and(|p| !p.can_communicate(&envelope.from, &envelope.to)) {
        Some(DropReason::Partitioned)
    } else {
        None
    }
}
