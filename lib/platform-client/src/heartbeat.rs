//! Keeps a registered instance's lease alive

use crate::{RegistryClient, Result};
use registry_core::{InstanceAddress, InstanceRecord};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Sends heartbeats on an interval and deregisters on shutdown
pub struct HeartbeatTask {
    client: RegistryClient,
    service: String,
    instance_id: String,
    address: InstanceAddress,
    interval: Duration,
}

impl HeartbeatTask {
    pub fn new(
        client: RegistryClient,
        service: impl Into<String>,
        instance_id: impl Into<String>,
        address: InstanceAddress,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            service: service.into(),
            instance_id: instance_id.into(),
            address,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub async fn register(&self) -> Result<InstanceRecord> {
        self.client
            .register(&self.service, &self.instance_id, &self.address)
            .await
    }

    /// Heartbeat once, re-registering if the registry has forgotten us
    pub async fn beat_once(&self) -> Result<InstanceRecord> {
        match self.client.heartbeat(&self.service, &self.instance_id).await {
            Err(e) if e.is_not_found() => {
                info!(
                    "{}/{} unknown to the registry, registering again",
                    self.service, self.instance_id
                );
                self.register().await
            }
            other => other,
        }
    }

    /// Heartbeat until `shutdown` flips to true, then deregister
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Heartbeat for {}/{} every {:?}",
            self.service, self.instance_id, self.interval
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.beat_once().await {
                        Ok(_) => debug!("Heartbeat sent for {}/{}", self.service, self.instance_id),
                        Err(e) => warn!("Heartbeat for {}/{} failed: {}", self.service, self.instance_id, e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        match self.client.deregister(&self.service, &self.instance_id).await {
            Ok(()) => info!("Deregistered {}/{}", self.service, self.instance_id),
            Err(e) => warn!("Deregister of {}/{} failed: {}", self.service, self.instance_id, e),
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
