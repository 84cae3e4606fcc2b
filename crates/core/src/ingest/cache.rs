use crate::domain::quote::{FilterCriteria, Snapshot, SnapshotKind};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: SnapshotKind,
    pub api_key: String,
    pub criteria: FilterCriteria,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: Snapshot,
    expires_at: Instant,
}

/// Short-lived cache of upstream snapshots to bound the call rate under frequent refreshes.
#[derive(Debug)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Snapshot> {
        if !self.is_enabled() {
            return None;
        }
        let entries = self.entries.read().ok()?;
        entries
            .get(key)
            .filter(|e| Instant::now() < e.expires_at)
            .map(|e| e.snapshot.clone())
    }

    pub fn insert(&self, key: CacheKey, snapshot: Snapshot) {
        if !self.is_enabled() {
            return;
        }
        if let Ok(mut entries) = self.entries.write() {
            let now = Instant::now();
            entries.retain(|_, e| now < e.expires_at);
            entries.insert(
                key,
                CacheEntry {
                    snapshot,
                    expires_at: now + self.ttl,
                },
            );
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}
