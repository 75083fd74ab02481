//! Protocol engine: maps one inbound message to table mutations, replies and
//! audit events.
//!
//! Handlers never block, never retry and never fail outward. Malformed input is
//! counted and dropped; messages that arrive in the wrong lifecycle phase are
//! counted as ignored.
use std::collections::HashSet;

use rand::Rng;
use tracing::debug;

use super::codec;
use super::messages::{GossipEntry, Message, SnapshotEntry};
use crate::audit::AuditEvent;
use crate::membership::{MemberStatus, MembershipTable, UpsertOutcome};
use crate::node::{NodeId, NodePhase};

/// A message to hand to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: NodeId,
    pub message: Message,
}

/// Everything a dispatch or scheduler round produced
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Effects {
    pub outbound: Vec<Outbound>,
    pub events: Vec<AuditEvent>,
    /// A JOINREP was accepted; the node should become a member
    pub joined: bool,
}

/// Counters for inbound traffic
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub received: u64,
    pub malformed: u64,
    /// Well-formed messages dropped because the node was in the wrong phase
    pub ignored: u64,
    /// Reported heartbeats that were not newer than what we held
    pub stale_reports: u64,
    pub joins_accepted: u64,
}

/// Per-dispatch view of the node state the handlers need
pub struct DispatchContext<'a, R: Rng + ?Sized> {
    pub phase: NodePhase,
    pub now: u64,
    pub heartbeat: u64,
    pub table: &'a mut MembershipTable,
    pub rng: &'a mut R,
}

#[derive(Debug, Clone)]
pub struct ProtocolEngine {
    local: NodeId,
    stats: EngineStats,
}

impl ProtocolEngine {
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            stats: EngineStats::default(),
        }
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Decode and dispatch one inbound buffer
    pub fn handle_bytes<R: Rng + ?Sized>(
        &mut self,
        data: &[u8],
        ctx: &mut DispatchContext<'_, R>,
    ) -> Effects {
        self.stats.received += 1;
        match codec::decode(data) {
            Ok(message) => self.handle_message(message, ctx),
            Err(e) => {
                self.stats.malformed += 1;
                debug!(
                    "[{}] Dropping malformed message ({} bytes): {}",
                    self.local,
                    data.len(),
                    e
                );
                Effects::default()
            }
        }
    }

    /// Dispatch an already-decoded message
    pub fn handle_message<R: Rng + ?Sized>(
        &mut self,
        message: Message,
        ctx: &mut DispatchContext<'_, R>,
    ) -> Effects {
        let kind = message.message_type();
        let sender = message.sender();
        if sender == self.local {
            self.stats.ignored += 1;
            return Effects::default();
        }
        debug!("[{}] {} from {} at tick {}", self.local, kind, sender, ctx.now);

        match (message, ctx.phase) {
            (Message::JoinReq { sender, heartbeat }, NodePhase::Member) => {
                self.handle_join_req(sender, heartbeat, ctx)
            }
            (
                Message::JoinRep {
                    sender,
                    heartbeat,
                    members,
                },
                NodePhase::Joining,
            ) => self.handle_join_rep(sender, heartbeat, members, ctx),
            (
                Message::Ping {
                    sender,
                    heartbeat,
                    gossip,
                },
                NodePhase::Member,
            ) => self.handle_ping(sender, heartbeat, gossip, ctx),
            (
                Message::Pong {
                    sender,
                    heartbeat,
                    gossip,
                },
                NodePhase::Member,
            ) => self.handle_pong(sender, heartbeat, gossip, ctx),
            (_, phase) => {
                self.stats.ignored += 1;
                debug!(
                    "[{}] Ignoring {} from {} while {}",
                    self.local, kind, sender, phase
                );
                Effects::default()
            }
        }
    }

    fn handle_join_req<R: Rng + ?Sized>(
        &mut self,
        sender: NodeId,
        heartbeat: u64,
        ctx: &mut DispatchContext<'_, R>,
    ) -> Effects {
        let mut effects = Effects::default();
        if self.apply(sender, heartbeat, ctx, &mut effects) == UpsertOutcome::Inserted {
            self.stats.joins_accepted += 1;
        }

        let members: Vec<SnapshotEntry> =
            ctx.table.snapshot().iter().map(SnapshotEntry::from).collect();
        debug!(
            "[{}] Admitting {}, replying with {} members",
            self.local,
            sender,
            members.len()
        );
        effects.outbound.push(Outbound {
            to: sender,
            message: Message::JoinRep {
                sender: self.local,
                heartbeat: ctx.heartbeat,
                members,
            },
        });
        effects
    }

    fn handle_join_rep<R: Rng + ?Sized>(
        &mut self,
        sender: NodeId,
        heartbeat: u64,
        members: Vec<SnapshotEntry>,
        ctx: &mut DispatchContext<'_, R>,
    ) -> Effects {
        let mut effects = Effects::default();
        self.apply(sender, heartbeat, ctx, &mut effects);
        for entry in members {
            self.apply(entry.id, entry.heartbeat, ctx, &mut effects);
        }
        effects.joined = true;
        effects.events.push(AuditEvent::Note(format!(
            "joined the group via {} with {} members",
            sender,
            ctx.table.size()
        )));
        effects
    }

    fn handle_ping<R: Rng + ?Sized>(
        &mut self,
        sender: NodeId,
        heartbeat: u64,
        gossip: Option<GossipEntry>,
        ctx: &mut DispatchContext<'_, R>,
    ) -> Effects {
        let mut effects = Effects::default();
        self.apply(sender, heartbeat, ctx, &mut effects);
        if let Some(entry) = gossip {
            self.apply_gossip(entry, ctx, &mut effects);
        }

        let reply_gossip = if ctx.table.size() >= 2 {
            let excluding: HashSet<NodeId> = [sender].into_iter().collect();
            ctx.table
                .sample(1, &excluding, &mut *ctx.rng)
                .first()
                .map(GossipEntry::from)
        } else {
            None
        };

        effects.outbound.push(Outbound {
            to: sender,
            message: Message::Pong {
                sender: self.local,
                heartbeat: ctx.heartbeat,
                gossip: reply_gossip,
            },
        });
        effects
    }

    fn handle_pong<R: Rng + ?Sized>(
        &mut self,
        sender: NodeId,
        heartbeat: u64,
        gossip: Option<GossipEntry>,
        ctx: &mut DispatchContext<'_, R>,
    ) -> Effects {
        let mut effects = Effects::default();
        self.apply(sender, heartbeat, ctx, &mut effects);
        if let Some(entry) = gossip {
            self.apply_gossip(entry, ctx, &mut effects);
        }
        effects
    }

    /// Suspect gossip may refresh an entry we hold but never creates one
    fn apply_gossip<R: Rng + ?Sized>(
        &mut self,
        entry: GossipEntry,
        ctx: &mut DispatchContext<'_, R>,
        effects: &mut Effects,
    ) {
        if entry.status == MemberStatus::Suspect && !ctx.table.contains(&entry.id) {
            debug!(
                "[{}] Not adopting suspect {} from gossip",
                self.local, entry.id
            );
            return;
        }
        self.apply(entry.id, entry.heartbeat, ctx, effects);
    }

    fn apply<R: Rng + ?Sized>(
        &mut self,
        id: NodeId,
        heartbeat: u64,
        ctx: &mut DispatchContext<'_, R>,
        effects: &mut Effects,
    ) -> UpsertOutcome {
        let outcome = ctx.table.upsert(id, heartbeat, ctx.now);
        match outcome {
            UpsertOutcome::Inserted => effects.events.push(AuditEvent::NodeAdd(id)),
            UpsertOutcome::Updated => {}
            UpsertOutcome::Ignored => {
                if id != self.local {
                    self.stats.stale_reports += 1;
                }
            }
        }
        outcome
    }
}
