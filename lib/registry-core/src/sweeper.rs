//! Background eviction of expired instance leases

use crate::{InstanceKey, ServiceRegistry};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of a single sweep pass
#[derive(Clone, Debug, Default)]
pub struct SweepReport {
    /// Keys in the snapshot the pass worked from
    pub scanned: usize,
    /// Keys removed by this pass
    pub evicted: Vec<InstanceKey>,
}

/// Periodically removes instances whose lease has expired
pub struct EvictionSweeper {
    registry: Arc<ServiceRegistry>,
    interval: Duration,
    concurrency: usize,
}

impl EvictionSweeper {
    /// Create a sweeper using the registry's own settings
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        let interval = registry.settings().effective_sweep_interval();
        let concurrency = registry.settings().sweep_concurrency.max(1);
        Self {
            registry,
            interval,
            concurrency,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep against the current time
    pub async fn sweep_once(&self) -> SweepReport {
        self.sweep_at(self.registry.now()).await
    }

    /// Split a key snapshot across workers and evict what is stale at `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let keys = self.registry.instance_keys();
        let scanned = keys.len();
        if keys.is_empty() {
            return SweepReport::default();
        }

        let workers = self.concurrency.clamp(1, keys.len());
        let chunk_size = keys.len().div_ceil(workers);

        let mut tasks = JoinSet::new();
        for chunk in keys.chunks(chunk_size) {
            let registry = self.registry.clone();
            let chunk = chunk.to_vec();
            tasks.spawn_blocking(move || registry.evict_keys_at(&chunk, now));
        }

        let mut evicted = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(keys) => evicted.extend(keys),
                Err(e) => warn!("Sweep worker failed: {}", e),
            }
        }

        SweepReport { scanned, evicted }
    }

    /// Sweep on a fixed interval until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Eviction sweeper started (interval {:?}, concurrency {})",
            self.interval, self.concurrency
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep_once().await;
                    if report.evicted.is_empty() {
                        debug!("Sweep scanned {} instances, nothing evicted", report.scanned);
                    } else {
                        info!(
                            "Sweep scanned {} instances, evicted {}",
                            report.scanned,
                            report.evicted.len()
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Eviction sweeper stopping");
                        break;
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
