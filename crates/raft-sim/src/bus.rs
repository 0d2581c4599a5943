//! # bus
//!
//! why: stand in for the network, carrying messages between nodes over time
//! relations: fed by node outboxes in engine.rs, gated by partition.rs and
//!            node liveness at delivery time
//! what: InFlight messages with travel progress, MessageBus advance/deliver

use raft_core::{DropReason, Envelope};
use tracing::debug;

/// A message travelling between two nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub id: u64,
    pub envelope: Envelope,
    /// Ticks travelled so far
    pub elapsed: u64,
    /// Ticks needed to arrive
    pub travel_ticks: u64,
}

impl InFlight {
    /// Fraction of the trip completed, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        (self.elapsed as f64 / self.travel_ticks as f64).min(1.0)
    }

    pub fn has_arrived(&self) -> bool {
        self.elapsed >= self.travel_ticks
    }
}

/// What happened to a message that completed its trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered(InFlight),
    Dropped(InFlight, DropReason),
}

/// Holds every in-flight message, in send order
#[derive(Debug, Clone)]
pub struct MessageBus {
    in_flight: Vec<InFlight>,
    next_id: u64,
    travel_ticks: u64,
}

impl MessageBus {
    pub fn new(travel_ticks: u64) -> Self {
        assert!(travel_ticks > 0, "messages need at least one tick to travel");
        Self {
            in_flight: Vec::new(),
            next_id: 1,
            travel_ticks,
        }
    }

    /// Put a message on the wire. Returns its id.
    pub fn send(&mut self, envelope: Envelope) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.in_flight.push(InFlight {
            id,
            envelope,
            elapsed: 0,
            travel_ticks: self.travel_ticks,
        });
        id
    }

    /// Advance every message by one tick and hand back those that arrived,
    /// in send order.
    ///
    /// `gate` is evaluated for each arrival at this moment, so a partition
    /// or crash that happened while a message was travelling still drops it.
    pub fn advance<F>(&mut self, mut gate: F) -> Vec<Delivery>
    where
        F: FnMut(&Envelope) -> Option<DropReason>,
    {
        for message in &mut self.in_flight {
            message.elapsed += 1;
        }
        let (arrived, travelling): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(InFlight::has_arrived);
        self.in_flight = travelling;

        arrived
            .into_iter()
            .map(|message| match gate(&message.envelope) {
                Some(reason) => {
                    debug!(
                        "message {} {} {} -> {} dropped: {:?}",
                        message.id,
                        message.envelope.message.kind(),
                        message.envelope.from,
                        message.envelope.to,
                        reason
                    );
                    Delivery::Dropped(message, reason)
                }
                None => Delivery::Delivered(message),
            })
            .collect()
    }

    pub fn in_flight(&self) -> &[InFlight] {
        &self.in_flight
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}
