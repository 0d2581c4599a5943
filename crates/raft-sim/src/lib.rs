//! # raft-sim
//!
//! why: run a raft cluster in simulated time so elections, replication and
//!      failures can be watched tick by tick and replayed exactly
//! relations: drives raft-core nodes; the raft-sim binary and any renderer
//!            talk to it only through Simulation and ClusterSnapshot
//! what: engine, message bus, partitions, clock, config, snapshots, errors

pub mod bus;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod partition;
pub mod snapshot;

pub use bus::{Delivery, InFlight, MessageBus};
pub use clock::Clock;
pub use config::SimConfig;
pub use engine::{ClientReply, Simulation};
pub use error::{Result, SimError};
pub use partition::Partition;
pub use snapshot::{ClusterSnapshot, MessageSnapshot, NodeSnapshot};
