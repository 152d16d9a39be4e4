//! Configuration distributor: publish, fetch latest or pinned, health

use crate::{ConfigError, ConfigKey, ConfigSnapshot, Properties, Result, SnapshotStore, StoreError};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Health of the distributor's snapshot store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Latest version of one configuration key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySummary {
    pub application: String,
    pub profile: String,
    pub latest_version: u64,
}

/// Serves versioned configuration snapshots.
///
/// Publishes to the same key are serialized through a per-key async mutex;
/// reads go straight to the store and never wait on a publish.
pub struct ConfigDistributor {
    store: Arc<dyn SnapshotStore>,
    publish_locks: DashMap<ConfigKey, Arc<Mutex<()>>>,
}

impl ConfigDistributor {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            publish_locks: DashMap::new(),
        }
    }

    /// Publish a new version of `application`/`profile`
    pub async fn publish(
        &self,
        application: &str,
        profile: &str,
        properties: Properties,
    ) -> Result<Arc<ConfigSnapshot>> {
        let key = ConfigKey::new(application, profile)?;
        let lock = self.publish_lock(&key);
        let _guard = lock.lock().await;
        self.append_next(&key, properties).await
    }

    /// Publish only when `properties` differ from the latest version
    pub async fn publish_if_changed(
        &self,
        application: &str,
        profile: &str,
        properties: Properties,
    ) -> Result<Option<Arc<ConfigSnapshot>>> {
        let key = ConfigKey::new(application, profile)?;
        let lock = self.publish_lock(&key);
        let _guard = lock.lock().await;

        let digest = crate::properties_digest(&properties);
        if let Some(latest) = self.store.latest(&key)? {
            if latest.digest == digest {
                debug!("{} unchanged at version {}", key, latest.version);
                return Ok(None);
            }
        }
        self.append_next(&key, properties).await.map(Some)
    }

    fn publish_lock(&self, key: &ConfigKey) -> Arc<Mutex<()>> {
        self.publish_locks.entry(key.clone()).or_default().clone()
    }

    /// Must be called with the key's publish lock held.
    ///
    /// The store append runs on the blocking pool since file-backed stores
    /// write to disk. A conflict means another writer shares the store; the
    /// version is reassigned once before giving up.
    async fn append_next(&self, key: &ConfigKey, properties: Properties) -> Result<Arc<ConfigSnapshot>> {
        let mut retried = false;
        loop {
            let next = self.store.latest(key)?.map_or(1, |s| s.version + 1);
            let snapshot = ConfigSnapshot::new(key, next, properties.clone(), Utc::now());
            let store = self.store.clone();
            let appended = tokio::task::spawn_blocking(move || store.append(snapshot))
                .await
                .map_err(|e| ConfigError::StoreUnavailable(format!("append task failed: {}", e)))?;
            match appended {
                Ok(stored) => {
                    info!("Published {} version {}", key, stored.version);
                    return Ok(stored);
                }
                Err(err @ StoreError::Conflict { .. }) if !retried => {
                    warn!("{}; retrying with the next version", err);
                    retried = true;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Highest retained version of `application`/`profile`
    pub fn get_latest(&self, application: &str, profile: &str) -> Result<Arc<ConfigSnapshot>> {
        let key = ConfigKey::new(application, profile)?;
        self.store
            .latest(&key)?
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))
    }

    /// A specific version of `application`/`profile`
    pub fn get_version(
        &self,
        application: &str,
        profile: &str,
        version: u64,
    ) -> Result<Arc<ConfigSnapshot>> {
        let key = ConfigKey::new(application, profile)?;
        self.store
            .get(&key, version)?
            .ok_or_else(|| ConfigError::VersionNotFound {
                key: key.to_string(),
                version,
            })
    }

    /// Retained versions of `application`/`profile`, ascending
    pub fn versions(&self, application: &str, profile: &str) -> Result<Vec<u64>> {
        let key = ConfigKey::new(application, profile)?;
        let versions = self.store.versions(&key)?;
        if versions.is_empty() {
            return Err(ConfigError::NotFound(key.to_string()));
        }
        Ok(versions)
    }

    /// Every published key with its latest version
    pub fn keys(&self) -> Result<Vec<KeySummary>> {
        let mut summaries = Vec::new();
        for key in self.store.keys()? {
            if let Some(latest) = self.store.latest(&key)? {
                summaries.push(KeySummary {
                    application: key.application,
                    profile: key.profile,
                    latest_version: latest.version,
                });
            }
        }
        Ok(summaries)
    }

    pub fn health_check(&self) -> HealthStatus {
        match self.store.health() {
            Ok(()) => HealthStatus::Up,
            Err(e) => {
                warn!("Snapshot store health check failed: {}", e);
                HealthStatus::Down
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemorySnapshotStore, StoreResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn props(value: serde_json::Value) -> Properties {
        serde_json::from_value(value).unwrap()
    }

    fn distributor() -> ConfigDistributor {
        ConfigDistributor::new(Arc::new(MemorySnapshotStore::new()))
    }

    /// Fails the first `conflicts` appends with a version conflict
    struct ConflictingStore {
        inner: MemorySnapshotStore,
        conflicts: AtomicUsize,
    }

    impl ConflictingStore {
        fn new(conflicts: usize) -> Self {
            Self {
                inner: MemorySnapshotStore::new(),
                conflicts: AtomicUsize::new(conflicts),
            }
        }
    }

    impl SnapshotStore for ConflictingStore {
        fn append(&self, snapshot: ConfigSnapshot) -> StoreResult<Arc<ConfigSnapshot>> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Conflict {
                    key: snapshot.key().to_string(),
                    expected: snapshot.version,
                    actual: snapshot.version + 1,
                });
            }
            self.inner.append(snapshot)
        }

        fn latest(&self, key: &ConfigKey) -> StoreResult<Option<Arc<ConfigSnapshot>>> {
            self.inner.latest(key)
        }

        fn get(&self, key: &ConfigKey, version: u64) -> StoreResult<Option<Arc<ConfigSnapshot>>> {
            self.inner.get(key, version)
        }

        fn versions(&self, key: &ConfigKey) -> StoreResult<Vec<u64>> {
            self.inner.versions(key)
        }

        fn keys(&self) -> StoreResult<Vec<ConfigKey>> {
            self.inner.keys()
        }

        fn health(&self) -> StoreResult<()> {
            Err(StoreError::Unavailable("test store".to_string()))
        }
    }

    #[tokio::test]
    async fn test_publish_and_read_versions() {
        let distributor = distributor();
        let v1 = distributor
            .publish("product-service", "default", props(json!({"a": 1})))
            .await
            .unwrap();
        let v2 = distributor
            .publish("product-service", "default", props(json!({"a": 2})))
            .await
            .unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);

        let pinned = distributor.get_version("product-service", "default", 1).unwrap();
        assert_eq!(pinned.properties, props(json!({"a": 1})));
        let latest = distributor.get_latest("product-service", "default").unwrap();
        assert_eq!(latest.properties, props(json!({"a": 2})));
        assert_eq!(latest.version, 2);
    }

    #[tokio::test]
    async fn test_not_found() {
        let distributor = distributor();
        let err = distributor.get_latest("nope", "default").unwrap_err();
        assert_eq!(err, ConfigError::NotFound("nope/default".to_string()));

        distributor
            .publish("app", "default", Properties::new())
            .await
            .unwrap();
        let err = distributor.get_version("app", "default", 7).unwrap_err();
        assert!(err.is_not_found());
        assert!(distributor.versions("nope", "default").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let distributor = distributor();
        let err = distributor
            .publish("../x", "default", Properties::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let distributor = distributor();
        distributor.publish("a", "default", Properties::new()).await.unwrap();
        distributor.publish("a", "default", Properties::new()).await.unwrap();
        let other = distributor.publish("a", "prod", Properties::new()).await.unwrap();
        assert_eq!(other.version, 1);

        let keys = distributor.keys().unwrap();
        assert_eq!(
            keys,
            vec![
                KeySummary { application: "a".into(), profile: "default".into(), latest_version: 2 },
                KeySummary { application: "a".into(), profile: "prod".into(), latest_version: 1 },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishers_get_contiguous_versions() {
        const PUBLISHERS: u64 = 16;
        let distributor = Arc::new(distributor());

        let handles: Vec<_> = (0..PUBLISHERS)
            .map(|i| {
                let distributor = distributor.clone();
                tokio::spawn(async move {
                    let snapshot = distributor
                        .publish("product-service", "default", props(json!({ "writer": i })))
                        .await
                        .unwrap();
                    (snapshot.version, i)
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        let mut versions: Vec<u64> = results.iter().map(|(v, _)| *v).collect();
        versions.sort_unstable();
        assert_eq!(versions, (1..=PUBLISHERS).collect::<Vec<_>>());

        // Every version holds exactly what its publisher sent
        for (version, writer) in results {
            let snapshot = distributor
                .get_version("product-service", "default", version)
                .unwrap();
            assert_eq!(snapshot.properties, props(json!({ "writer": writer })));
        }
    }

    #[tokio::test]
    async fn test_conflict_is_retried_once() {
        let distributor = ConfigDistributor::new(Arc::new(ConflictingStore::new(1)));
        let snapshot = distributor
            .publish("app", "default", props(json!({"k": "v"})))
            .await
            .unwrap();
        assert_eq!(snapshot.version, 1);
    }

    #[tokio::test]
    async fn test_conflict_surfaces_after_retry() {
        let distributor = ConfigDistributor::new(Arc::new(ConflictingStore::new(2)));
        let err = distributor
            .publish("app", "default", Properties::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Conflict(_)));
        assert!(distributor.get_latest("app", "default").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_publish_if_changed() {
        let distributor = distributor();
        let first = distributor
            .publish_if_changed("app", "default", props(json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(first.map(|s| s.version), Some(1));

        let same = distributor
            .publish_if_changed("app", "default", props(json!({"a": 1})))
            .await
            .unwrap();
        assert!(same.is_none());

        let changed = distributor
            .publish_if_changed("app", "default", props(json!({"a": 2})))
            .await
            .unwrap();
        assert_eq!(changed.map(|s| s.version), Some(2));
    }

    #[test]
    fn test_health_check() {
        assert_eq!(distributor().health_check(), HealthStatus::Up);
        let down = ConfigDistributor::new(Arc::new(ConflictingStore::new(0)));
        assert_eq!(down.health_check(), HealthStatus::Down);
        assert_eq!(serde_json::to_string(&HealthStatus::Down).unwrap(), "\"DOWN\"");
    }
}
