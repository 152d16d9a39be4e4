//! File-backed snapshot store
//!
//! Layout: `{root}/{application}/{profile}/{version:010}.json`, one immutable
//! file per snapshot. Files are written to a temporary name and renamed into
//! place, so a crash never leaves a partially written version behind. All
//! snapshots are indexed in memory on open; reads never touch the disk.

use crate::store::MemorySnapshotStore;
use crate::{ConfigKey, ConfigSnapshot, SnapshotStore, StoreError, StoreResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct FileSnapshotStore {
    root: PathBuf,
    index: MemorySnapshotStore,
}

impl FileSnapshotStore {
    /// Open (or create) a store rooted at `root` and load every snapshot in it
    pub fn open(root: impl Into<PathBuf>, max_versions: Option<usize>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let index = MemorySnapshotStore::with_retention(max_versions);
        let mut loaded = 0usize;
        for snapshot in load_snapshots(&root)? {
            index.restore(snapshot)?;
            loaded += 1;
        }

        let store = Self { root, index };
        for (key, versions) in store.index.prune_all() {
            store.remove_files(&key, &versions);
        }

        info!("Loaded {} config snapshots from {}", loaded, store.root.display());
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &ConfigKey) -> PathBuf {
        self.root.join(&key.application).join(&key.profile)
    }

    fn snapshot_path(&self, key: &ConfigKey, version: u64) -> PathBuf {
        self.key_dir(key).join(format!("{:010}.json", version))
    }

    fn persist(&self, snapshot: &ConfigSnapshot) -> StoreResult<()> {
        let key = snapshot.key();
        let dir = self.key_dir(&key);
        fs::create_dir_all(&dir)?;

        let path = self.snapshot_path(&key, snapshot.version);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&tmp, &path)?;

        debug!("Persisted {} version {} to {}", key, snapshot.version, path.display());
        Ok(())
    }

    fn remove_files(&self, key: &ConfigKey, versions: &[u64]) {
        for version in versions {
            let path = self.snapshot_path(key, *version);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to prune {}: {}", path.display(), e);
            }
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn append(&self, snapshot: ConfigSnapshot) -> StoreResult<Arc<ConfigSnapshot>> {
        let (stored, pruned) = self
            .index
            .append_with(snapshot, |snapshot| self.persist(snapshot))?;
        if !pruned.is_empty() {
            self.remove_files(&stored.key(), &pruned);
        }
        Ok(stored)
    }

    fn latest(&self, key: &ConfigKey) -> StoreResult<Option<Arc<ConfigSnapshot>>> {
        self.index.latest(key)
    }

    fn get(&self, key: &ConfigKey, version: u64) -> StoreResult<Option<Arc<ConfigSnapshot>>> {
        self.index.get(key, version)
    }

    fn versions(&self, key: &ConfigKey) -> StoreResult<Vec<u64>> {
        self.index.versions(key)
    }

    fn keys(&self) -> StoreResult<Vec<ConfigKey>> {
        self.index.keys()
    }

    fn health(&self) -> StoreResult<()> {
        let metadata = fs::metadata(&self.root).map_err(|e| {
            StoreError::Unavailable(format!("{}: {}", self.root.display(), e))
        })?;
        if !metadata.is_dir() {
            return Err(StoreError::Unavailable(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        if metadata.permissions().readonly() {
            return Err(StoreError::Unavailable(format!(
                "{} is read-only",
                self.root.display()
            )));
        }
        Ok(())
    }
}

/// Read every snapshot under `root`, ordered by key then version
fn load_snapshots(root: &Path) -> StoreResult<Vec<ConfigSnapshot>> {
    let mut snapshots = Vec::new();
    for app_dir in sub_dirs(root)? {
        for profile_dir in sub_dirs(&app_dir)? {
            for entry in fs::read_dir(&profile_dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let bytes = fs::read(&path)?;
                let snapshot: ConfigSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    StoreError::Corrupted(format!("{}: {}", path.display(), e))
                })?;
                check_location(&path, &app_dir, &profile_dir, &snapshot)?;
                snapshots.push(snapshot);
            }
        }
    }
    snapshots.sort_by(|a, b| a.key().cmp(&b.key()).then(a.version.cmp(&b.version)));
    Ok(snapshots)
}

fn sub_dirs(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

fn check_location(
    path: &Path,
    app_dir: &Path,
    profile_dir: &Path,
    snapshot: &ConfigSnapshot,
) -> StoreResult<()> {
    let dir_name = |p: &Path| p.file_name().and_then(|n| n.to_str()).map(str::to_string);
    let expected_file = format!("{:010}.json", snapshot.version);
    let file_name = path.file_name().and_then(|n| n.to_str());

    if dir_name(app_dir).as_deref() != Some(snapshot.application.as_str())
        || dir_name(profile_dir).as_deref() != Some(snapshot.profile.as_str())
        || file_name != Some(expected_file.as_str())
    {
        return Err(StoreError::Corrupted(format!(
            "{} does not match its contents ({} version {})",
            path.display(),
            snapshot.key(),
            snapshot.version
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Properties;
    use chrono::Utc;
    use serde_json::json;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("config-core-test-{}", uuid::Uuid::new_v4()))
    }

    fn key() -> ConfigKey {
        ConfigKey::new("inventory-service", "default").unwrap()
    }

    fn snapshot(version: u64, value: i64) -> ConfigSnapshot {
        let mut props = Properties::new();
        props.insert("server.port".to_string(), json!(value));
        ConfigSnapshot::new(&key(), version, props, Utc::now())
    }

    #[test]
    fn test_snapshots_survive_reopen() {
        let root = temp_root();
        {
            let store = FileSnapshotStore::open(&root, None).unwrap();
            store.append(snapshot(1, 8080)).unwrap();
            store.append(snapshot(2, 8081)).unwrap();
            assert!(store.health().is_ok());
        }

        let store = FileSnapshotStore::open(&root, None).unwrap();
        assert_eq!(store.versions(&key()).unwrap(), vec![1, 2]);
        assert_eq!(
            store.get(&key(), 1).unwrap().unwrap().properties["server.port"],
            json!(8080)
        );
        assert!(matches!(
            store.append(snapshot(2, 1)),
            Err(StoreError::Conflict { .. })
        ));
        store.append(snapshot(3, 8082)).unwrap();

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_retention_removes_files() {
        let root = temp_root();
        let store = FileSnapshotStore::open(&root, Some(2)).unwrap();
        for v in 1..=4 {
            store.append(snapshot(v, v as i64)).unwrap();
        }

        let dir = root.join("inventory-service").join("default");
        let mut files: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec!["0000000003.json", "0000000004.json"]);

        drop(store);
        let reopened = FileSnapshotStore::open(&root, Some(2)).unwrap();
        reopened.append(snapshot(5, 5)).unwrap();
        assert_eq!(reopened.versions(&key()).unwrap(), vec![4, 5]);

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_corrupted_file_fails_open() {
        let root = temp_root();
        let dir = root.join("inventory-service").join("default");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("0000000001.json"), b"{not json").unwrap();

        assert!(matches!(
            FileSnapshotStore::open(&root, None),
            Err(StoreError::Corrupted(_))
        ));

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_misplaced_file_fails_open() {
        let root = temp_root();
        let dir = root.join("other-app").join("default");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("0000000001.json"),
            serde_json::to_vec(&snapshot(1, 1)).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            FileSnapshotStore::open(&root, None),
            Err(StoreError::Corrupted(_))
        ));

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_health_reports_missing_root() {
        let root = temp_root();
        let store = FileSnapshotStore::open(&root, None).unwrap();
        fs::remove_dir_all(&root).unwrap();
        assert!(matches!(store.health(), Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_leftover_temp_files_are_ignored() {
        let root = temp_root();
        let store = FileSnapshotStore::open(&root, None).unwrap();
        store.append(snapshot(1, 1)).unwrap();
        let dir = root.join("inventory-service").join("default");
        fs::write(dir.join("0000000002.json.tmp"), b"partial").unwrap();
        drop(store);

        let store = FileSnapshotStore::open(&root, None).unwrap();
        assert_eq!(store.versions(&key()).unwrap(), vec![1]);

        fs::remove_dir_all(&root).unwrap();
    }
}
