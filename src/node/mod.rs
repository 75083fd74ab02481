//! Cluster node lifecycle
//!
//! A [`MembershipNode`] bootstraps either as the introducer (first member of
//! the group) or as a joiner that sends JOINREQ to the introducer and waits for
//! a JOINREP. Every tick drains the inbound queue through the protocol engine
//! and, once the node is a member, runs one gossip round.
use std::sync::Arc;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

pub mod node_id;
pub mod runner;

use crate::audit::{AuditEvent, AuditSink};
use crate::error::Result;
use crate::gossip::codec;
use crate::gossip::engine::{DispatchContext, Effects, EngineStats, ProtocolEngine};
use crate::gossip::messages::Message;
use crate::gossip::scheduler::GossipScheduler;
use crate::membership::{MemberEntry, MembershipTable};
use crate::settings::ProtocolConfig;
use crate::transport::{Inbox, Transport};
use crate::{bootstrap_error, config_error};
pub use node_id::NodeId;
pub use runner::NodeRunner;

/// Where a node is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum NodePhase {
    /// Created, `start` not called yet
    Bootstrapping,
    /// JOINREQ sent, waiting for a JOINREP
    Joining,
    Member,
    /// Left the group or crashed; ticks are no-ops
    Stopped,
    /// Could not join; terminal
    Failed,
}

impl std::fmt::Display for NodePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodePhase::Bootstrapping => write!(f, "bootstrapping"),
            NodePhase::Joining => write!(f, "joining"),
            NodePhase::Member => write!(f, "member"),
            NodePhase::Stopped => write!(f, "stopped"),
            NodePhase::Failed => write!(f, "failed"),
        }
    }
}

/// Counters for one node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub received: u64,
    pub malformed: u64,
    pub ignored: u64,
    pub stale_reports: u64,
    pub joins_accepted: u64,
    pub join_attempts: u32,
    pub rounds: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
}

impl NodeStats {
    fn new(engine: EngineStats) -> Self {
        Self {
            received: engine.received,
            malformed: engine.malformed,
            ignored: engine.ignored,
            stale_reports: engine.stale_reports,
            joins_accepted: engine.joins_accepted,
            ..Self::default()
        }
    }
}

/// One participant in the membership protocol
pub struct MembershipNode<R: Rng = StdRng> {
    id: NodeId,
    introducer: Option<NodeId>,
    phase: NodePhase,
    table: MembershipTable,
    engine: ProtocolEngine,
    scheduler: GossipScheduler,
    config: ProtocolConfig,
    transport: Arc<dyn Transport>,
    inbox: Option<Inbox>,
    audit: Arc<dyn AuditSink>,
    rng: R,
    join_attempts: u32,
    last_join_tick: u64,
    messages_sent: u64,
    send_failures: u64,
}

impl<R: Rng> std::fmt::Debug for MembershipNode<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipNode")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("now", &self.scheduler.now())
            .field("heartbeat", &self.scheduler.heartbeat())
            .field("members", &self.table.size())
            .finish()
    }
}

impl MembershipNode<StdRng> {
    /// Create a node whose sampling rng is seeded from OS entropy
    pub fn new(
        id: NodeId,
        config: ProtocolConfig,
        transport: Arc<dyn Transport>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        Self::with_rng(id, config, transport, audit, StdRng::from_entropy())
    }
}

impl<R: Rng> MembershipNode<R> {
    /// Create a node with an explicit sampling source
    pub fn with_rng(
        id: NodeId,
        config: ProtocolConfig,
        transport: Arc<dyn Transport>,
        audit: Arc<dyn AuditSink>,
        rng: R,
    ) -> Result<Self> {
        config.validate()?;
        if id.is_null() {
            return Err(config_error!("node id must not be the null address"));
        }

        Ok(Self {
            id,
            introducer: None,
            phase: NodePhase::Bootstrapping,
            table: MembershipTable::new(id),
            engine: ProtocolEngine::new(id),
            scheduler: GossipScheduler::new(id, &config),
            config,
            transport,
            inbox: None,
            audit,
            rng,
            join_attempts: 0,
            last_join_tick: 0,
            messages_sent: 0,
            send_failures: 0,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn phase(&self) -> NodePhase {
        self.phase
    }

    pub fn heartbeat(&self) -> u64 {
        self.scheduler.heartbeat()
    }

    /// Current tick
    pub fn now(&self) -> u64 {
        self.scheduler.now()
    }

    pub fn introducer(&self) -> Option<NodeId> {
        self.introducer
    }

    pub fn is_member(&self) -> bool {
        self.phase == NodePhase::Member
    }

    /// Snapshot of the local membership view, ordered by id
    pub fn current_members(&self) -> Vec<MemberEntry> {
        self.table.snapshot()
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            join_attempts: self.join_attempts,
            rounds: self.scheduler.rounds(),
            messages_sent: self.messages_sent,
            send_failures: self.send_failures,
            ..NodeStats::new(self.engine.stats())
        }
    }

    /// Join the group through `introducer`, or start it if we are the
    /// introducer.
    pub fn start(&mut self, introducer: NodeId) -> Result<()> {
        if self.phase != NodePhase::Bootstrapping {
            return Err(bootstrap_error!(
                "[{}] start called while {}",
                self.id,
                self.phase
            ));
        }
        if introducer.is_null() {
            self.phase = NodePhase::Failed;
            return Err(bootstrap_error!("[{}] introducer address is null", self.id));
        }

        match self.transport.register_receiver(self.id) {
            Ok(inbox) => self.inbox = Some(inbox),
            Err(e) => {
                self.phase = NodePhase::Failed;
                return Err(bootstrap_error!(
                    "[{}] cannot receive membership traffic: {}",
                    self.id,
                    e
                ));
            }
        }
        self.introducer = Some(introducer);

        if introducer == self.id {
            info!("[{}] Starting up group as introducer", self.id);
            self.phase = NodePhase::Member;
            self.audit.on_note(self.id, "starting up group");
            return Ok(());
        }

        if let Err(e) = self.send_join_request(introducer) {
            self.phase = NodePhase::Failed;
            self.inbox = None;
            return Err(bootstrap_error!(
                "[{}] JOINREQ to introducer {} failed: {}",
                self.id,
                introducer,
                e
            ));
        }
        info!("[{}] Trying to join the group via {}", self.id, introducer);
        self.phase = NodePhase::Joining;
        Ok(())
    }

    /// Advance one tick: drain the inbox, then retry the join or run a gossip
    /// round depending on phase.
    pub fn tick(&mut self) -> Result<()> {
        match self.phase {
            NodePhase::Joining | NodePhase::Member => {}
            NodePhase::Bootstrapping | NodePhase::Stopped | NodePhase::Failed => {
                return Ok(())
            }
        }

        let now = self.scheduler.advance_clock();
        for data in self.drain_inbox() {
            let effects = self.dispatch(&data, now);
            if effects.joined && self.phase == NodePhase::Joining {
                self.phase = NodePhase::Member;
                info!(
                    "[{}] Joined the group at tick {} with {} peers",
                    self.id,
                    now,
                    self.table.size()
                );
            }
            self.apply(effects);
        }

        match self.phase {
            NodePhase::Joining => self.retry_join(now),
            NodePhase::Member => {
                let effects = self.scheduler.run_round(&mut self.table, &mut self.rng);
                self.apply(effects);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Leave the group voluntarily. The table is cleared and later ticks do
    /// nothing.
    pub fn leave(&mut self) {
        if matches!(self.phase, NodePhase::Stopped | NodePhase::Failed) {
            return;
        }
        info!(
            "[{}] Leaving the group with {} known peers",
            self.id,
            self.table.size()
        );
        self.audit.on_note(self.id, "left the group");
        self.table.clear();
        self.inbox = None;
        self.phase = NodePhase::Stopped;
    }

    /// Stop abruptly, as a crashed process would: no farewell, nothing sent,
    /// inbound traffic discarded. The frozen table is kept for inspection.
    pub fn crash(&mut self) {
        if self.phase == NodePhase::Stopped {
            return;
        }
        warn!("[{}] Node failed at tick {}", self.id, self.scheduler.now());
        self.inbox = None;
        self.phase = NodePhase::Stopped;
    }

    fn drain_inbox(&mut self) -> Vec<Bytes> {
        let mut pending = Vec::new();
        let Some(inbox) = self.inbox.as_mut() else {
            return pending;
        };
        loop {
            match inbox.try_recv() {
                Ok(data) => pending.push(data),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("[{}] Inbound queue closed by transport", self.id);
                    self.inbox = None;
                    break;
                }
            }
        }
        pending
    }

    fn dispatch(&mut self, data: &[u8], now: u64) -> Effects {
        let mut ctx = DispatchContext {
            phase: self.phase,
            now,
            heartbeat: self.scheduler.heartbeat(),
            table: &mut self.table,
            rng: &mut self.rng,
        };
        self.engine.handle_bytes(data, &mut ctx)
    }

    fn retry_join(&mut self, now: u64) -> Result<()> {
        if now.saturating_sub(self.last_join_tick) < self.config.join_retry_ticks {
            return Ok(());
        }
        let Some(introducer) = self.introducer else {
            return Ok(());
        };

        if self.join_attempts >= self.config.max_join_attempts {
            self.phase = NodePhase::Failed;
            self.inbox = None;
            self.audit.on_note(self.id, "bootstrap failed");
            return Err(bootstrap_error!(
                "[{}] no JOINREP from {} after {} attempts",
                self.id,
                introducer,
                self.join_attempts
            ));
        }

        debug!(
            "[{}] Re-sending JOINREQ to {} (attempt {})",
            self.id,
            introducer,
            self.join_attempts + 1
        );
        if let Err(e) = self.send_join_request(introducer) {
            debug!("[{}] JOINREQ retry failed: {}", self.id, e);
        }
        Ok(())
    }

    fn send_join_request(&mut self, introducer: NodeId) -> Result<()> {
        self.join_attempts += 1;
        self.last_join_tick = self.scheduler.now();
        let message = Message::JoinReq {
            sender: self.id,
            heartbeat: self.scheduler.heartbeat(),
        };
        self.messages_sent += 1;
        let result = self
            .transport
            .send(self.id, introducer, codec::encode(&message));
        if result.is_err() {
            self.send_failures += 1;
        }
        result
    }

    fn apply(&mut self, effects: Effects) {
        for outbound in effects.outbound {
            self.messages_sent += 1;
            let data = codec::encode(&outbound.message);
            if let Err(e) = self.transport.send(self.id, outbound.to, data) {
                self.send_failures += 1;
                debug!(
                    "[{}] Failed to send {} to {}: {}",
                    self.id,
                    outbound.message.message_type(),
                    outbound.to,
                    e
                );
            }
        }
        for event in effects.events {
            self.record(&event);
        }
    }

    fn record(&self, event: &AuditEvent) {
        self.audit.record(self.id, event);
    }
}
