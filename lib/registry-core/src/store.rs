//! Instance record storage
//!
//! A sharded concurrent map keyed by `(service, instance_id)`. Every mutation
//! goes through the shard lock of its own key, so writers on different keys
//! do not serialize on a global lock.

use crate::{InstanceKey, InstanceRecord};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct InstanceStore {
    records: DashMap<InstanceKey, InstanceRecord>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Insert or replace the record for `key`.
    ///
    /// `build` sees the existing record (if any) while the key is locked.
    pub fn upsert_with<F>(&self, key: InstanceKey, build: F) -> InstanceRecord
    where
        F: FnOnce(Option<&InstanceRecord>) -> InstanceRecord,
    {
        match self.records.entry(key) {
            Entry::Occupied(mut occupied) => {
                let record = build(Some(occupied.get()));
                occupied.insert(record.clone());
                record
            }
            Entry::Vacant(vacant) => {
                let record = build(None);
                vacant.insert(record.clone());
                record
            }
        }
    }

    /// Mutate an existing record in place, returning the updated copy
    pub fn update<F>(&self, key: &InstanceKey, mutate: F) -> Option<InstanceRecord>
    where
        F: FnOnce(&mut InstanceRecord),
    {
        let mut entry = self.records.get_mut(key)?;
        mutate(entry.value_mut());
        Some(entry.value().clone())
    }

    pub fn get(&self, key: &InstanceKey) -> Option<InstanceRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    pub fn remove(&self, key: &InstanceKey) -> Option<InstanceRecord> {
        self.records.remove(key).map(|(_, record)| record)
    }

    /// Remove `key` only if `predicate` holds under the key's lock
    pub fn remove_if<F>(&self, key: &InstanceKey, predicate: F) -> Option<InstanceRecord>
    where
        F: FnOnce(&InstanceRecord) -> bool,
    {
        self.records
            .remove_if(key, |_, record| predicate(record))
            .map(|(_, record)| record)
    }

    /// Point-in-time copy of all keys
    pub fn keys(&self) -> Vec<InstanceKey> {
        self.records.iter().map(|r| r.key().clone()).collect()
    }

    /// Copies of every record matching `filter`
    pub fn collect<F>(&self, filter: F) -> Vec<InstanceRecord>
    where
        F: Fn(&InstanceRecord) -> bool,
    {
        self.records
            .iter()
            .filter(|r| filter(r.value()))
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstanceAddress, InstanceStatus};
    use chrono::Utc;

    fn record(service: &str, id: &str, port: u16) -> InstanceRecord {
        let now = Utc::now();
        InstanceRecord {
            service_name: service.to_string(),
            instance_id: id.to_string(),
            address: InstanceAddress::new("127.0.0.1", port).unwrap(),
            status: InstanceStatus::Up,
            registered_at: now,
            last_heartbeat_at: now,
        }
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let store = InstanceStore::new();
        let key = InstanceKey::new("svc", "a").unwrap();

        store.upsert_with(key.clone(), |existing| {
            assert!(existing.is_none());
            record("svc", "a", 1)
        });
        store.upsert_with(key.clone(), |existing| {
            assert_eq!(existing.map(|r| r.address.port), Some(1));
            record("svc", "a", 2)
        });

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).unwrap().address.port, 2);
    }

    #[test]
    fn test_update_missing_key() {
        let store = InstanceStore::new();
        let key = InstanceKey::new("svc", "missing").unwrap();
        assert!(store.update(&key, |r| r.status = InstanceStatus::Down).is_none());
    }

    #[test]
    fn test_remove_if_respects_predicate() {
        let store = InstanceStore::new();
        let key = InstanceKey::new("svc", "a").unwrap();
        store.upsert_with(key.clone(), |_| record("svc", "a", 1));

        assert!(store.remove_if(&key, |r| r.address.port == 2).is_none());
        assert_eq!(store.len(), 1);
        assert!(store.remove_if(&key, |r| r.address.port == 1).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_collect_and_keys() {
        let store = InstanceStore::new();
        for (svc, id) in [("a", "1"), ("a", "2"), ("b", "1")] {
            let key = InstanceKey::new(svc, id).unwrap();
            store.upsert_with(key, |_| record(svc, id, 80));
        }

        assert_eq!(store.keys().len(), 3);
        assert_eq!(store.collect(|r| r.service_name == "a").len(), 2);
        assert_eq!(store.collect(|_| true).len(), 3);
    }
}
