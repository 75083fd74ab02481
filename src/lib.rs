//! gossamer: gossip-style cluster membership and crash-failure detection.
//!
//! Each node keeps a local view of its peers, admits new nodes through a
//! well-known introducer, exchanges heartbeats by piggybacking one random
//! member on every PING/PONG, and suspects and then removes peers that stay
//! silent for too many ticks.
pub mod audit;
pub mod cli;
pub mod error;
pub mod gossip;
pub mod membership;
pub mod node;
pub mod settings;
pub mod simulation;
pub mod transport;

pub use error::{GossamerError, Result};
pub use node::{MembershipNode, NodeId, NodePhase};
