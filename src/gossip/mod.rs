//! Gossip membership protocol
//!
//! Message types, their wire codec, the engine that reacts to inbound
//! messages, and the scheduler that drives one gossip and failure-detection
//! round per tick.
pub mod codec;
pub mod engine;
pub mod messages;
pub mod scheduler;

pub use engine::{DispatchContext, Effects, EngineStats, Outbound, ProtocolEngine};
pub use messages::{GossipEntry, Message, MessageType, SnapshotEntry};
pub use scheduler::GossipScheduler;
