//! Membership table: the local, eventually-consistent view of which peers are
//! alive, with monotonic heartbeat reconciliation and staleness eviction.
pub mod table;

pub use table::{MemberEntry, MemberStatus, MembershipTable, SweepOutcome, UpsertOutcome};
