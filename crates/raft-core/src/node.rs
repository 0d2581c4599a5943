//! # node
//!
//! why: define the raft node state machine and state transitions
//! relations: uses message.rs for rpc types, log.rs for entry management,
//!            timer.rs for countdowns, event.rs to report transitions
//! what: NodeState enum, RaftConfig, RaftNode with election, replication and
//!       commit logic

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::event::Event;
use crate::log::{Log, LogEntry};
use crate::message::{Envelope, RaftMessage};
use crate::timer::Countdown;
use crate::NodeId;

/// The three possible states a Raft node can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Passive state - listens for heartbeats, votes when asked
    Follower,
    /// Transitional state - requesting votes to become leader
    Candidate,
    /// Active state - manages log replication, sends heartbeats
    Leader,
}

impl Default for NodeState {
    fn default() -> Self {
        Self::Follower
    }
}

/// Timing parameters, all measured in simulation ticks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    /// Lower bound (inclusive) of the randomized election timeout
    pub election_timeout_min: u64,
    /// Upper bound (exclusive) of the randomized election timeout
    pub election_timeout_max: u64,
    /// Ticks between leader replication rounds
    pub heartbeat_interval: u64,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: 25,
            election_timeout_max: 50,
            heartbeat_interval: 10,
        }
    }
}

/// Number of votes (or replicas) needed out of `cluster_size` members
pub fn majority(cluster_size: usize) -> usize {
    cluster_size / 2 + 1
}

/// A single Raft node in the cluster.
///
/// The node never talks to other nodes directly. Outbound messages and
/// domain events are buffered and collected by the driver with
/// [`RaftNode::take_outbox`] and [`RaftNode::take_events`].
#[derive(Debug, Clone)]
pub struct RaftNode {
    /// Unique identifier for this node
    pub id: NodeId,
    /// Every member of the cluster, this node included
    pub cluster_nodes: Vec<NodeId>,
    pub config: RaftConfig,
    /// Current state (Follower, Candidate, or Leader)
    pub state: NodeState,
    /// Current term number
    pub current_term: u64,
    /// Node that received our vote in the current term, or the leader we
    /// accepted replication from in it
    pub voted_for: Option<NodeId>,
    /// Leader known for the current term
    pub leader_id: Option<NodeId>,
    pub log: Log,
    /// Highest index known to be replicated on a majority
    pub commit_index: u64,
    /// A dead node runs no timers and handles no messages
    pub alive: bool,
    pub election_timer: Countdown,
    pub heartbeat_timer: Countdown,
    /// Peers that granted a vote in the current candidacy, self excluded
    pub votes_received: BTreeSet<NodeId>,
    /// Leader only: next log index to send to each peer
    pub next_index: BTreeMap<NodeId, u64>,
    /// Leader only: highest index known replicated on each peer
    pub match_index: BTreeMap<NodeId, u64>,
    /// Peers the driver reports as crashed; they do not count toward a
    /// commit majority
    pub down_peers: BTreeSet<NodeId>,
    rng: StdRng,
    outbox: Vec<Envelope>,
    events: Vec<Event>,
}

impl RaftNode {
    /// Create a new Raft node in Follower state with default timing
    pub fn new(id: impl Into<NodeId>, cluster_nodes: Vec<NodeId>) -> Self {
        Self::with_config(id, cluster_nodes, RaftConfig::default())
    }

    /// Create a node whose timeout jitter is seeded from its id
    pub fn with_config(id: impl Into<NodeId>, cluster_nodes: Vec<NodeId>, config: RaftConfig) -> Self {
        let id = id.into();
        let seed = id
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3));
        Self::with_seed(id, cluster_nodes, config, seed)
    }

    /// Create a node with an explicit jitter seed, for reproducible runs
    pub fn with_seed(
        id: impl Into<NodeId>,
        cluster_nodes: Vec<NodeId>,
        config: RaftConfig,
        seed: u64,
    ) -> Self {
        let mut node = Self {
            id: id.into(),
            cluster_nodes,
            config,
            state: NodeState::Follower,
            current_term: 0,
            voted_for: None,
            leader_id: None,
            log: Log::new(),
            commit_index: 0,
            alive: true,
            election_timer: Countdown::default(),
            heartbeat_timer: Countdown::default(),
            votes_received: BTreeSet::new(),
            next_index: BTreeMap::new(),
            match_index: BTreeMap::new(),
            down_peers: BTreeSet::new(),
            rng: StdRng::seed_from_u64(seed),
            outbox: Vec::new(),
            events: Vec::new(),
        };
        node.reset_election_timer();
        node
    }

    // -- cluster helpers --

    /// Every member except this node
    pub fn peers(&self) -> impl Iterator<Item = &NodeId> + '_ {
        self.cluster_nodes.iter().filter(move |p| **p != self.id)
    }

    pub fn quorum_size(&self) -> usize {
        majority(self.cluster_nodes.len())
    }

    /// Whether the current candidacy holds a majority, counting our own vote
    pub fn has_quorum(&self) -> bool {
        self.votes_received.len() + 1 >= self.quorum_size()
    }

    pub fn is_leader(&self) -> bool {
        self.state == NodeState::Leader
    }

    pub fn last_log_index(&self) -> u64 {
        self.log.last_index()
    }

    pub fn last_log_term(&self) -> u64 {
        self.log.last_term()
    }

    pub fn get_entry(&self, index: u64) -> Option<&LogEntry> {
        self.log.get(index)
    }

    // -- driver interface --

    /// Drain the messages produced since the last call
    pub fn take_outbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    /// Drain the events produced since the last call
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Advance both timers by one tick.
    ///
    /// Leaders fire a replication round whenever the heartbeat countdown
    /// expires; everyone else starts an election when the election
    /// countdown expires.
    pub fn tick(&mut self) {
        if !self.alive {
            return;
        }
        match self.state {
            NodeState::Leader => {
                if self.heartbeat_timer.tick() {
                    self.broadcast_append_entries();
                    self.heartbeat_timer.set(self.config.heartbeat_interval);
                }
            }
            NodeState::Follower | NodeState::Candidate => {
                if self.election_timer.tick() {
                    self.start_election();
                }
            }
        }
    }

    /// Force the election countdown, e.g. to trigger an election on demand
    pub fn set_election_timer(&mut self, ticks: u64) {
        self.election_timer.set(ticks);
    }

    pub fn reset_election_timer(&mut self) {
        self.election_timer.arm_jittered(
            &mut self.rng,
            self.config.election_timeout_min,
            self.config.election_timeout_max,
        );
    }

    /// Stop the node. It keeps its term, vote and log, but loses all
    /// volatile role state.
    pub fn crash(&mut self) {
        info!("Node {}: crashed in term {}", self.id, self.current_term);
        self.alive = false;
        self.state = NodeState::Follower;
        self.leader_id = None;
        self.votes_received.clear();
        self.next_index.clear();
        self.match_index.clear();
        self.outbox.clear();
    }

    /// Record whether `peer` is running. Liveness is only consulted when
    /// counting replicas for a commit.
    pub fn set_peer_alive(&mut self, peer: &str, alive: bool) {
        if alive {
            self.down_peers.remove(peer);
        } else if peer != self.id && self.cluster_nodes.iter().any(|p| p == peer) {
            self.down_peers.insert(peer.to_string());
        }
    }

    /// Bring a crashed node back with a fresh election timeout
    pub fn recover(&mut self) {
        info!("Node {}: recovered in term {}", self.id, self.current_term);
        self.alive = true;
        self.reset_election_timer();
    }

    /// Append a client command if this node is the leader.
    /// Returns the index of the new entry.
    pub fn propose(&mut self, command: impl Into<String>) -> Option<u64> {
        if !self.alive || self.state != NodeState::Leader {
            return None;
        }
        let index = self.log.last_index() + 1;
        self.log.append(LogEntry::new(index, self.current_term, command));
        info!("Node {}: appended entry {} in term {}", self.id, index, self.current_term);
        // replicate on this tick's timer phase
        self.heartbeat_timer.set(0);
        self.advance_commit_index();
        Some(index)
    }

    /// Dispatch one delivered message
    pub fn handle_message(&mut self, envelope: Envelope) {
        if !self.alive {
            return;
        }
        assert_eq!(envelope.to, self.id, "message delivered to the wrong node");
        debug!(
            "Node {}: {} from {} (term {})",
            self.id,
            envelope.message.kind(),
            envelope.from,
            envelope.term
        );

        if envelope.term > self.current_term {
            self.become_follower(envelope.term);
        }

        let Envelope { from, term, message, .. } = envelope;
        match message {
            RaftMessage::RequestVote { last_log_index, last_log_term } => {
                self.handle_vote_request(&from, term, last_log_index, last_log_term)
            }
            RaftMessage::VoteGranted => self.handle_vote_response(&from, term, true),
            RaftMessage::VoteDenied => self.handle_vote_response(&from, term, false),
            RaftMessage::AppendEntries {
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            } => self.handle_append_entries(&from, term, prev_log_index, prev_log_term, entries, leader_commit),
            RaftMessage::Heartbeat {
                prev_log_index,
                prev_log_term,
                leader_commit,
            } => self.handle_append_entries(&from, term, prev_log_index, prev_log_term, Vec::new(), leader_commit),
            RaftMessage::AppendAck { match_index } => {
                self.handle_append_response(&from, term, true, match_index)
            }
            RaftMessage::AppendNack { match_index } => {
                self.handle_append_response(&from, term, false, match_index)
            }
        }
    }

    // -- state transitions --

    /// Transition: Follower/Candidate -> Candidate
    pub fn start_election(&mut self) {
        self.current_term += 1;
        self.state = NodeState::Candidate;
        self.voted_for = Some(self.id.clone());
        self.leader_id = None;
        self.votes_received.clear();
        self.next_index.clear();
        self.match_index.clear();
        self.reset_election_timer();
        info!("Node {}: election timeout, becoming candidate for term {}", self.id, self.current_term);
        self.events.push(Event::ElectionStarted {
            node: self.id.clone(),
            term: self.current_term,
        });

        let request = RaftMessage::RequestVote {
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
        };
        let peers: Vec<NodeId> = self.peers().cloned().collect();
        for peer in peers {
            self.send(peer, request.clone());
        }

        if self.has_quorum() {
            self.become_leader();
        }
    }

    /// Transition: Candidate -> Leader
    fn become_leader(&mut self) {
        info!("Node {}: won election for term {}", self.id, self.current_term);
        self.state = NodeState::Leader;
        self.leader_id = Some(self.id.clone());
        self.votes_received.clear();

        let next = self.log.last_index() + 1;
        let peers: Vec<NodeId> = self.peers().cloned().collect();
        self.next_index = peers.iter().map(|p| (p.clone(), next)).collect();
        self.match_index = peers.into_iter().map(|p| (p, 0)).collect();

        // announce leadership in this tick's timer phase
        self.heartbeat_timer.set(0);
        self.events.push(Event::LeaderElected {
            node: self.id.clone(),
            term: self.current_term,
        });
    }

    /// Transition: any -> Follower, adopting `term` if it is newer
    pub fn become_follower(&mut self, term: u64) {
        assert!(term >= self.current_term, "term must never decrease");
        let previous = self.state;
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
            self.leader_id = None;
        }
        self.state = NodeState::Follower;
        self.votes_received.clear();
        self.next_index.clear();
        self.match_index.clear();
        self.reset_election_timer();

        if previous != NodeState::Follower {
            info!("Node {}: stepping down from {:?} in term {}", self.id, previous, term);
            self.events.push(Event::SteppedDown {
                node: self.id.clone(),
                new_term: term,
            });
        }
    }

    // -- elections --

    fn handle_vote_request(&mut self, candidate: &NodeId, term: u64, last_log_index: u64, last_log_term: u64) {
        if term < self.current_term {
            self.send(candidate.clone(), RaftMessage::VoteDenied);
            return;
        }

        let free = self.voted_for.as_ref().map_or(true, |v| v == candidate);
        if free && self.log.is_up_to_date(last_log_index, last_log_term) {
            self.voted_for = Some(candidate.clone());
            self.reset_election_timer();
            debug!("Node {}: voting for {} in term {}", self.id, candidate, term);
            self.events.push(Event::VoteGranted {
                from: self.id.clone(),
                to: candidate.clone(),
                term,
            });
            self.send(candidate.clone(), RaftMessage::VoteGranted);
        } else {
            self.send(candidate.clone(), RaftMessage::VoteDenied);
        }
    }

    fn handle_vote_response(&mut self, voter: &NodeId, term: u64, granted: bool) {
        if self.state != NodeState::Candidate || term != self.current_term || !granted {
            return;
        }
        self.votes_received.insert(voter.clone());
        if self.has_quorum() {
            self.become_leader();
        }
    }

    // -- replication, follower side --

    fn handle_append_entries(
        &mut self,
        leader: &NodeId,
        term: u64,
        prev_log_index: u64,
        prev_log_term: u64,
        entries: Vec<LogEntry>,
        leader_commit: u64,
    ) {
        if term < self.current_term {
            let match_index = self.log.last_index();
            self.send(leader.clone(), RaftMessage::AppendNack { match_index });
            return;
        }

        if self.state != NodeState::Follower {
            self.become_follower(term);
        }
        self.voted_for = Some(leader.clone());
        self.leader_id = Some(leader.clone());
        self.reset_election_timer();

        if !self.log.matches(prev_log_index, prev_log_term) {
            if self.log.last_index() >= prev_log_index {
                // the entry at prev conflicts, so it and everything after go
                self.truncate_log_from(prev_log_index);
            }
            let match_index = self.log.last_index();
            self.send(leader.clone(), RaftMessage::AppendNack { match_index });
            return;
        }

        let verified = prev_log_index + entries.len() as u64;
        for entry in entries {
            match self.log.get(entry.index).map(|e| e.term) {
                Some(existing) if existing == entry.term => continue,
                Some(_) => {
                    self.truncate_log_from(entry.index);
                    self.log.append(entry);
                }
                None => self.log.append(entry),
            }
        }

        if leader_commit > self.commit_index {
            let commit = leader_commit.min(verified);
            if commit > self.commit_index {
                debug!("Node {}: commit index {} -> {}", self.id, self.commit_index, commit);
                self.commit_index = commit;
            }
        }

        self.send(leader.clone(), RaftMessage::AppendAck { match_index: verified });
    }

    fn truncate_log_from(&mut self, index: u64) {
        assert!(self.state != NodeState::Leader, "a leader never truncates its own log");
        assert!(
            index > self.commit_index,
            "cannot truncate committed entry {} (commit index {})",
            index,
            self.commit_index
        );
        let removed = self.log.truncate_from(index);
        if removed > 0 {
            debug!("Node {}: truncated {} conflicting entries from {}", self.id, removed, index);
        }
    }

    // -- replication, leader side --

    /// Send AppendEntries or a Heartbeat to every peer
    pub fn broadcast_append_entries(&mut self) {
        if self.state != NodeState::Leader {
            return;
        }
        let peers: Vec<NodeId> = self.peers().cloned().collect();
        for peer in peers {
            let message = self.append_entries_for(&peer);
            self.send(peer, message);
        }
    }

    /// Build the replication message for one peer from its next index
    pub fn append_entries_for(&self, peer: &NodeId) -> RaftMessage {
        let next = self
            .next_index
            .get(peer)
            .copied()
            .unwrap_or(self.log.last_index() + 1)
            .max(1);
        let prev_log_index = next - 1;
        let prev_log_term = self.log.term_at(prev_log_index);
        if next <= self.log.last_index() {
            RaftMessage::AppendEntries {
                prev_log_index,
                prev_log_term,
                entries: self.log.entries_from(next).to_vec(),
                leader_commit: self.commit_index,
            }
        } else {
            RaftMessage::Heartbeat {
                prev_log_index,
                prev_log_term,
                leader_commit: self.commit_index,
            }
        }
    }

    fn handle_append_response(&mut self, peer: &NodeId, term: u64, success: bool, reported: u64) {
        if self.state != NodeState::Leader || term != self.current_term {
            return;
        }

        if !success {
            let next = self.next_index.entry(peer.clone()).or_insert(1);
            *next = next.saturating_sub(1).max(1);
            debug!("Node {}: {} rejected, next index now {}", self.id, peer, next);
            return;
        }

        assert!(
            reported <= self.log.last_index(),
            "peer {} acknowledged index {} beyond the leader's log",
            peer,
            reported
        );
        let previous = self.match_index.get(peer).copied().unwrap_or(0);
        let matched = previous.max(reported);
        self.match_index.insert(peer.clone(), matched);
        self.next_index.insert(peer.clone(), reported + 1);

        if matched > previous {
            self.events.push(Event::EntryReplicated {
                leader: self.id.clone(),
                follower: peer.clone(),
                indices: previous + 1..=matched,
            });
        }
        // a revived peer can complete a majority without adding entries
        self.advance_commit_index();
    }

    /// Commit the highest current-term index held by a majority of live
    /// nodes. Returns true if the commit index moved.
    pub fn advance_commit_index(&mut self) -> bool {
        if self.state != NodeState::Leader {
            return false;
        }
        let quorum = self.quorum_size();
        for n in (self.commit_index + 1..=self.log.last_index()).rev() {
            // terms never decrease along the log, so nothing below is current
            if self.log.term_at(n) != self.current_term {
                break;
            }
            let replicas = 1 + self
                .match_index
                .iter()
                .filter(|(peer, m)| **m >= n && !self.down_peers.contains(*peer))
                .count();
            if replicas >= quorum {
                self.commit_to(n);
                return true;
            }
        }
        false
    }

    fn commit_to(&mut self, index: u64) {
        assert!(
            index <= self.log.last_index(),
            "cannot commit index {} beyond log end {}",
            index,
            self.log.last_index()
        );
        assert!(index > self.commit_index, "commit index must only grow");
        for committed in self.commit_index + 1..=index {
            self.events.push(Event::EntryCommitted { index: committed });
        }
        info!("Node {}: committed through index {} in term {}", self.id, index, self.current_term);
        self.commit_index = index;
    }

    fn send(&mut self, to: NodeId, message: RaftMessage) {
        self.outbox
            .push(Envelope::new(self.id.clone(), to, self.current_term, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(n: usize) -> Vec<NodeId> {
        (1..=n).map(|i| format!("S{i}")).collect()
    }

    #[test]
    fn new_node_starts_as_follower() {
        let node = RaftNode::new("S1", cluster(3));
        assert_eq!(node.state, NodeState::Follower);
        assert_eq!(node.current_term, 0);
        assert_eq!(node.voted_for, None);
        assert!(node.alive);
        let timeout = node.election_timer.remaining();
        assert!((25..50).contains(&timeout));
    }

    #[test]
    fn majority_sizes() {
        assert_eq!(majority(1), 1);
        assert_eq!(majority(2), 2);
        assert_eq!(majority(3), 2);
        assert_eq!(majority(5), 3);
        assert_eq!(majority(6), 4);
    }

    #[test]
    fn same_seed_same_timeouts() {
        let a = RaftNode::with_seed("S1", cluster(5), RaftConfig::default(), 99);
        let b = RaftNode::with_seed("S1", cluster(5), RaftConfig::default(), 99);
        assert_eq!(a.election_timer, b.election_timer);
    }

    #[test]
    fn election_timer_expiry_starts_election() {
        let mut node = RaftNode::new("S1", cluster(5));
        node.set_election_timer(1);
        node.tick();
        assert_eq!(node.state, NodeState::Candidate);
        assert_eq!(node.current_term, 1);
        assert_eq!(node.take_outbox().len(), 4);
    }

    #[test]
    fn dead_node_ignores_ticks_and_messages() {
        let mut node = RaftNode::new("S1", cluster(3));
        node.crash();
        node.set_election_timer(1);
        node.tick();
        node.handle_message(Envelope::new(
            "S2",
            "S1",
            4,
            RaftMessage::RequestVote { last_log_index: 0, last_log_term: 0 },
        ));
        assert_eq!(node.state, NodeState::Follower);
        assert_eq!(node.current_term, 0);
        assert!(node.take_outbox().is_empty());
    }

    #[test]
    fn single_node_cluster_leads_and_commits_alone() {
        let mut node = RaftNode::new("S1", cluster(1));
        node.start_election();
        assert!(node.is_leader());
        assert_eq!(node.propose("SET a=1"), Some(1));
        assert_eq!(node.commit_index, 1);
    }
}
