//! Wall-clock driver for a node
//!
//! Maps protocol ticks onto a `tokio` interval and runs until the shutdown
//! future resolves or bootstrap fails.
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time;
use tracing::{debug, info};

use super::{MembershipNode, NodePhase};
use crate::error::Result;

/// Log a stats line every this many ticks
const STATS_EVERY_TICKS: u64 = 60;

pub struct NodeRunner<R: Rng> {
    node: MembershipNode<R>,
    tick_interval: Duration,
}

impl<R: Rng> NodeRunner<R> {
    pub fn new(node: MembershipNode<R>, tick_interval: Duration) -> Self {
        Self {
            node,
            tick_interval,
        }
    }

    pub fn node(&self) -> &MembershipNode<R> {
        &self.node
    }

    /// Tick until `shutdown` resolves, then leave the group and hand the node
    /// back. A bootstrap failure ends the loop with an error.
    pub async fn run<F>(mut self, shutdown: F) -> Result<MembershipNode<R>>
    where
        F: Future<Output = ()>,
    {
        let node_id = self.node.id();
        info!(
            "[{}] Starting membership loop with {}ms ticks",
            node_id,
            self.tick_interval.as_millis()
        );

        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("[{}] Shutdown requested at tick {}", node_id, self.node.now());
                    self.node.leave();
                    break;
                }
                _ = ticker.tick() => {
                    self.node.tick()?;
                    if self.node.phase() == NodePhase::Stopped {
                        info!("[{}] Node stopped, exiting membership loop", node_id);
                        break;
                    }
                    if self.node.now() % STATS_EVERY_TICKS == 0 {
                        let stats = self.node.stats();
                        debug!(
                            "[{}] {} at tick {}: {} peers, {} received, {} malformed, {} send failures",
                            node_id,
                            self.node.phase(),
                            self.node.now(),
                            self.node.table().size(),
                            stats.received,
                            stats.malformed,
                            stats.send_failures
                        );
                    }
                }
            }
        }

        Ok(self.node)
    }
}
