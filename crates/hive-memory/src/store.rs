//! The local replica's entries.
//!
//! Tombstones and expired entries stay in the map so their clocks keep
//! ordering later writes; every read helper hides them. Locking is the
//! owner's concern: the manager keeps the store behind one `RwLock`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use hive_crdt::{MemoryEntry, MemoryValue, VectorClock};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The readable value at `key`, if any.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<&MemoryValue> {
        self.entries.get(key).and_then(|e| e.visible_value(now))
    }

    /// The raw entry, tombstones and expired entries included.
    pub fn entry(&self, key: &str) -> Option<&MemoryEntry> {
        self.entries.get(key)
    }

    /// Insert or replace, returning the previous entry.
    pub fn put(&mut self, entry: MemoryEntry) -> Option<MemoryEntry> {
        self.entries.insert(entry.key.clone(), entry)
    }

    /// Readable entries.
    pub fn len(&self, now: DateTime<Utc>) -> usize {
        self.live(now).count()
    }

    pub fn is_empty(&self, now: DateTime<Utc>) -> bool {
        self.live(now).next().is_none()
    }

    /// Every stored entry, tombstones included. Drives memory pressure.
    pub fn total_len(&self) -> usize {
        self.entries.len()
    }

    /// Readable keys in key order.
    pub fn keys(&self, now: DateTime<Utc>) -> Vec<String> {
        self.live(now).map(|e| e.key.clone()).collect()
    }

    pub fn entries_in_namespace(&self, namespace: &str, now: DateTime<Utc>) -> Vec<&MemoryEntry> {
        self.live(now)
            .filter(|e| e.metadata.namespace == namespace)
            .collect()
    }

    /// Entries a replica at `version` has not seen, tombstones included.
    pub fn changed_since(&self, version: &VectorClock) -> Vec<&MemoryEntry> {
        self.entries
            .values()
            .filter(|e| !e.clock.covered_by(version))
            .collect()
    }

    /// Keep only entries matching `keep`. Returns how many were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&MemoryEntry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| keep(e));
        before - self.entries.len()
    }

    /// Drop entries whose TTL has elapsed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        self.retain(|e| !e.is_expired(now))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.values()
    }

    fn live(&self, now: DateTime<Utc>) -> impl Iterator<Item = &MemoryEntry> {
        self.entries
            .values()
            .filter(move |e| e.visible_value(now).is_some())
    }
}
