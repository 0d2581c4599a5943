//! # raft-core
//!
//! why: implement the core raft consensus algorithm in pure, portable rust
//! relations: driven tick by tick by raft-sim, which owns the message bus
//! what: state machine, election logic, log management, timers, message and
//!       event types

pub mod event;
pub mod log;
pub mod message;
pub mod node;
pub mod timer;

/// Stable node identifier, e.g. `"S1"`
pub type NodeId = String;

pub use event::{DropReason, Event};
pub use log::{Log, LogEntry};
pub use message::{Envelope, RaftMessage};
pub use node::{majority, NodeState, RaftConfig, RaftNode};
pub use timer::Countdown;
