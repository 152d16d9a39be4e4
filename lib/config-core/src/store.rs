//! Snapshot storage

use crate::{ConfigKey, ConfigSnapshot, StoreError, StoreResult};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Storage backend for versioned snapshots.
///
/// `append` is a compare-and-append: it succeeds only if `snapshot.version`
/// is exactly one past the newest stored version for its key.
pub trait SnapshotStore: Send + Sync {
    fn append(&self, snapshot: ConfigSnapshot) -> StoreResult<Arc<ConfigSnapshot>>;

    fn latest(&self, key: &ConfigKey) -> StoreResult<Option<Arc<ConfigSnapshot>>>;

    fn get(&self, key: &ConfigKey, version: u64) -> StoreResult<Option<Arc<ConfigSnapshot>>>;

    /// Retained versions of `key`, ascending
    fn versions(&self, key: &ConfigKey) -> StoreResult<Vec<u64>>;

    fn keys(&self) -> StoreResult<Vec<ConfigKey>>;

    fn health(&self) -> StoreResult<()>;
}

#[derive(Debug, Default)]
struct History {
    /// Highest version ever written; survives pruning
    head: u64,
    snapshots: BTreeMap<u64, Arc<ConfigSnapshot>>,
}

/// In-memory snapshot store with optional per-key retention
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    histories: DashMap<ConfigKey, History>,
    max_versions: Option<usize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_versions` snapshots per key (never fewer than one)
    pub fn with_retention(max_versions: Option<usize>) -> Self {
        Self {
            histories: DashMap::new(),
            max_versions: max_versions.map(|n| n.max(1)),
        }
    }

    /// Append a snapshot; `persist` runs before it becomes visible.
    ///
    /// No map lock is held while `persist` runs, so reads of other keys never
    /// wait on it. Callers serialize appends to the same key; the version is
    /// re-checked before insertion all the same.
    ///
    /// Returns the stored snapshot and the versions pruned by retention.
    pub(crate) fn append_with<F>(
        &self,
        snapshot: ConfigSnapshot,
        persist: F,
    ) -> StoreResult<(Arc<ConfigSnapshot>, Vec<u64>)>
    where
        F: FnOnce(&ConfigSnapshot) -> StoreResult<()>,
    {
        let key = snapshot.key();
        let head = self.histories.get(&key).map_or(0, |h| h.head);
        check_next(&snapshot, head)?;
        persist(&snapshot)?;

        let stored = Arc::new(snapshot);
        let mut history = self.histories.entry(key).or_default();
        check_next(&stored, history.head)?;
        history.head = stored.version;
        history.snapshots.insert(stored.version, stored.clone());
        let pruned = self.prune(history.value_mut());
        Ok((stored, pruned))
    }

    /// Load a previously persisted snapshot; versions may have gaps from pruning
    pub(crate) fn restore(&self, snapshot: ConfigSnapshot) -> StoreResult<()> {
        let key = snapshot.key();
        let mut history = self.histories.entry(key.clone()).or_default();
        if snapshot.version <= history.head {
            return Err(StoreError::Corrupted(format!(
                "{} version {} restored out of order",
                key, snapshot.version
            )));
        }
        history.head = snapshot.version;
        history.snapshots.insert(snapshot.version, Arc::new(snapshot));
        Ok(())
    }

    /// Apply retention after restoring; returns pruned versions per key
    pub(crate) fn prune_all(&self) -> Vec<(ConfigKey, Vec<u64>)> {
        let mut pruned = Vec::new();
        for mut entry in self.histories.iter_mut() {
            let versions = self.prune(entry.value_mut());
            if !versions.is_empty() {
                pruned.push((entry.key().clone(), versions));
            }
        }
        pruned
    }

    fn prune(&self, history: &mut History) -> Vec<u64> {
        let Some(max) = self.max_versions else {
            return Vec::new();
        };
        let mut pruned = Vec::new();
        while history.snapshots.len() > max {
            match history.snapshots.pop_first() {
                Some((version, _)) => pruned.push(version),
                None => break,
            }
        }
        pruned
    }
}

fn check_next(snapshot: &ConfigSnapshot, head: u64) -> StoreResult<()> {
    let next = head + 1;
    if snapshot.version != next {
        return Err(StoreError::Conflict {
            key: snapshot.key().to_string(),
            expected: snapshot.version,
            actual: next,
        });
    }
    Ok(())
}

impl SnapshotStore for MemorySnapshotStore {
    fn append(&self, snapshot: ConfigSnapshot) -> StoreResult<Arc<ConfigSnapshot>> {
        self.append_with(snapshot, |_| Ok(())).map(|(stored, _)| stored)
    }

    fn latest(&self, key: &ConfigKey) -> StoreResult<Option<Arc<ConfigSnapshot>>> {
        Ok(self
            .histories
            .get(key)
            .and_then(|h| h.snapshots.last_key_value().map(|(_, s)| s.clone())))
    }

    fn get(&self, key: &ConfigKey, version: u64) -> StoreResult<Option<Arc<ConfigSnapshot>>> {
        Ok(self
            .histories
            .get(key)
            .and_then(|h| h.snapshots.get(&version).cloned()))
    }

    fn versions(&self, key: &ConfigKey) -> StoreResult<Vec<u64>> {
        Ok(self
            .histories
            .get(key)
            .map(|h| h.snapshots.keys().copied().collect())
            .unwrap_or_default())
    }

    fn keys(&self) -> StoreResult<Vec<ConfigKey>> {
        let mut keys: Vec<ConfigKey> = self.histories.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    fn health(&self) -> StoreResult<()> {
        Ok(())
    }
}
