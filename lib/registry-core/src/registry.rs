//! Service registry with lease-based liveness

use crate::clock::LeaseClock;
use crate::instance::normalize_service_name;
use crate::{InstanceAddress, InstanceKey, InstanceRecord, InstanceStatus, InstanceStore};
use crate::{RegistryError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Lease and sweep configuration
#[derive(Clone, Debug, PartialEq)]
pub struct RegistrySettings {
    /// Maximum time an instance stays live without a heartbeat
    pub lease_duration: Duration,
    /// Interval between eviction sweeps; `None` means a third of the lease
    pub sweep_interval: Option<Duration>,
    /// Number of workers a single sweep splits its keys across
    pub sweep_concurrency: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(90),
            sweep_interval: None,
            sweep_concurrency: 4,
        }
    }
}

impl RegistrySettings {
    pub fn effective_sweep_interval(&self) -> Duration {
        self.sweep_interval
            .unwrap_or(self.lease_duration / 3)
            .max(Duration::from_millis(1))
    }
}

/// Per-service counts for dashboards
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub name: String,
    pub total: usize,
    pub live: usize,
}

/// ServiceRegistry tracks service instances and their leases
pub struct ServiceRegistry {
    store: InstanceStore,
    settings: RegistrySettings,
    clock: LeaseClock,
    evicted_total: AtomicU64,
}

impl ServiceRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self::with_clock(settings, LeaseClock::new())
    }

    pub fn with_clock(settings: RegistrySettings, clock: LeaseClock) -> Self {
        Self {
            store: InstanceStore::new(),
            settings,
            clock,
            evicted_total: AtomicU64::new(0),
        }
    }

    /// Current time on the registry's lease clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Register or re-register an instance
    pub fn register(
        &self,
        service: &str,
        instance_id: &str,
        address: InstanceAddress,
    ) -> Result<InstanceRecord> {
        self.register_at(service, instance_id, address, self.now())
    }

    pub fn register_at(
        &self,
        service: &str,
        instance_id: &str,
        address: InstanceAddress,
        now: DateTime<Utc>,
    ) -> Result<InstanceRecord> {
        let key = InstanceKey::new(service, instance_id)?;
        let record = self.store.upsert_with(key.clone(), |existing| {
            let registered_at = existing.map_or(now, |r| r.registered_at);
            if let Some(previous) = existing {
                if previous.address != address {
                    debug!(
                        "Instance {} moved from {} to {}",
                        key, previous.address, address
                    );
                }
            }
            debug!("Instance {} {} -> {}", key, InstanceStatus::Starting, InstanceStatus::Up);
            InstanceRecord {
                service_name: key.service.clone(),
                instance_id: key.instance_id.clone(),
                address,
                status: InstanceStatus::Up,
                registered_at,
                last_heartbeat_at: now,
            }
        });

        info!("Registered instance {} at {}", key, record.address);
        Ok(record)
    }

    /// Renew the lease of a registered instance
    pub fn heartbeat(&self, service: &str, instance_id: &str) -> Result<InstanceRecord> {
        self.heartbeat_at(service, instance_id, self.now())
    }

    pub fn heartbeat_at(
        &self,
        service: &str,
        instance_id: &str,
        now: DateTime<Utc>,
    ) -> Result<InstanceRecord> {
        let key = InstanceKey::new(service, instance_id)?;
        let record = self
            .store
            .update(&key, |record| record.last_heartbeat_at = now)
            .ok_or_else(|| RegistryError::not_found(&key.service, &key.instance_id))?;

        debug!("Heartbeat from {}", key);
        Ok(record)
    }

    /// Explicitly change an instance's status; also renews its lease
    pub fn set_status(
        &self,
        service: &str,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<InstanceRecord> {
        self.set_status_at(service, instance_id, status, self.now())
    }

    pub fn set_status_at(
        &self,
        service: &str,
        instance_id: &str,
        status: InstanceStatus,
        now: DateTime<Utc>,
    ) -> Result<InstanceRecord> {
        let key = InstanceKey::new(service, instance_id)?;
        let record = self
            .store
            .update(&key, |record| {
                record.status = status;
                record.last_heartbeat_at = now;
            })
            .ok_or_else(|| RegistryError::not_found(&key.service, &key.instance_id))?;

        info!("Instance {} status set to {}", key, status);
        Ok(record)
    }

    /// Remove an instance immediately
    pub fn deregister(&self, service: &str, instance_id: &str) -> Result<InstanceRecord> {
        let key = InstanceKey::new(service, instance_id)?;
        let record = self
            .store
            .remove(&key)
            .ok_or_else(|| RegistryError::not_found(&key.service, &key.instance_id))?;

        info!("Deregistered instance {}", key);
        Ok(record)
    }

    /// Live instances of a service
    pub fn list_instances(&self, service: &str) -> Result<Vec<InstanceRecord>> {
        self.list_instances_at(service, self.now())
    }

    pub fn list_instances_at(
        &self,
        service: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<InstanceRecord>> {
        let service = normalize_service_name(service)?;
        let lease = self.settings.lease_duration;
        let mut instances = self
            .store
            .collect(|r| r.service_name == service && !r.is_expired_at(now, lease));
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        Ok(instances)
    }

    /// Every record, with expired leases reported as DOWN
    pub fn snapshot(&self) -> Vec<InstanceRecord> {
        self.snapshot_at(self.now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Vec<InstanceRecord> {
        let lease = self.settings.lease_duration;
        let mut records = self.store.collect(|_| true);
        for record in &mut records {
            record.status = record.effective_status_at(now, lease);
        }
        records.sort_by(|a, b| a.key().cmp(&b.key()));
        records
    }

    /// Per-service totals, sorted by name
    pub fn services_at(&self, now: DateTime<Utc>) -> Vec<ServiceSummary> {
        let lease = self.settings.lease_duration;
        let mut summaries: BTreeMap<String, ServiceSummary> = BTreeMap::new();
        for record in self.store.collect(|_| true) {
            let summary = summaries
                .entry(record.service_name.clone())
                .or_insert_with(|| ServiceSummary {
                    name: record.service_name.clone(),
                    total: 0,
                    live: 0,
                });
            summary.total += 1;
            if !record.is_expired_at(now, lease) {
                summary.live += 1;
            }
        }
        summaries.into_values().collect()
    }

    /// Point-in-time copy of all instance keys
    pub fn instance_keys(&self) -> Vec<InstanceKey> {
        self.store.keys()
    }

    /// Evict every expired instance; returns the evicted keys
    pub fn evict_expired_at(&self, now: DateTime<Utc>) -> Vec<InstanceKey> {
        let keys = self.store.keys();
        self.evict_keys_at(&keys, now)
    }

    /// Evict the given keys whose lease has expired at `now`.
    ///
    /// Staleness is re-checked under each key's lock, so a heartbeat that
    /// lands after the key snapshot was taken keeps the instance.
    pub fn evict_keys_at(&self, keys: &[InstanceKey], now: DateTime<Utc>) -> Vec<InstanceKey> {
        let lease = self.settings.lease_duration;
        let mut evicted = Vec::new();
        for key in keys {
            if let Some(record) = self
                .store
                .remove_if(key, |record| record.is_expired_at(now, lease))
            {
                info!(
                    "Evicted instance {} (last heartbeat {})",
                    key, record.last_heartbeat_at
                );
                evicted.push(record.key());
            }
        }
        self.evicted_total
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        evicted
    }

    pub fn instance_count(&self) -> usize {
        self.store.len()
    }

    /// Total evictions since startup
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total.load(Ordering::Relaxed)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}
