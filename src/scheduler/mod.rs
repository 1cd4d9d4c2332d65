//! Periodic update cycle
//!
//! [`UpdateCycle`] asks the registry to update every active region in turn,
//! then publishes every non-empty change set on a broadcast channel for the
//! notification layer. Cycles never overlap: the next tick waits for the
//! running cycle, and shutdown is honoured between cycles only.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::models::ChangeSet;
use crate::region::{RegionRegistry, UpdateSummary};

/// Capacity of the change-set channel
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Scheduler driving region updates
pub struct UpdateCycle {
    registry: RegionRegistry,
    interval: Duration,
    region_pause: Duration,
    changes_tx: broadcast::Sender<ChangeSet>,
}

impl UpdateCycle {
    pub fn new(registry: RegionRegistry, config: &SchedulerConfig) -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            registry,
            interval: config.update_interval(),
            region_pause: config.region_pause(),
            changes_tx,
        }
    }

    pub fn registry(&self) -> &RegionRegistry {
        &self.registry
    }

    /// Receive every non-empty change set from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.changes_tx.subscribe()
    }

    /// Run a single cycle over all regions
    pub async fn run_once(&self) -> UpdateSummary {
        let summary = self.registry.update_all(self.region_pause).await;

        for changes in summary.changes() {
            // No subscribers is not an error
            if self.changes_tx.send(changes.clone()).is_err() {
                debug!(region = %changes.region, "No change subscribers");
            }
        }

        summary
    }

    /// Run cycles every interval until `shutdown` resolves
    ///
    /// The first cycle starts immediately. Returns the number of cycles run.
    pub async fn run_until<F>(&self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.interval.as_secs(),
            regions = self.registry.active().count(),
            "Update cycle started"
        );

        let mut cycles = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.run_once().await;
                    cycles += 1;
                    debug!(cycle = cycles, changed_groups = summary.changed_groups(), "Cycle complete");
                }
                _ = &mut shutdown => break,
            }
        }

        info!(cycles = cycles, "Update cycle stopped");
        cycles
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> u64 {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C; stopping");
            }
        })
        .await
    }
}
