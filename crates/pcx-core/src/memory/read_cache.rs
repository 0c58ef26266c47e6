use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CachedRead {
    bytes: Vec<u8>,
    fetched_at: Instant,
}

/// Short-lived cache of remote reads keyed by start address.
///
/// A hit requires the entry to be younger than the TTL and to cover at
/// least the requested size. Expired entries are dropped on lookup and
/// swept out on every insert.
pub struct ReadCache {
    ttl: Duration,
    entries: Mutex<HashMap<u64, CachedRead>>,
}

impl ReadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, address: u64, size: usize) -> Option<Vec<u8>> {
        self.get_at(address, size, Instant::now())
    }

    pub fn get_at(&self, address: u64, size: usize, now: Instant) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get(&address)?;

        if now.saturating_duration_since(entry.fetched_at) >= self.ttl {
            entries.remove(&address);
            return None;
        }

        entry.bytes.get(..size).map(<[u8]>::to_vec)
    }

    pub fn insert(&self, address: u64, bytes: Vec<u8>) {
        self.insert_at(address, bytes, Instant::now());
    }

    pub fn insert_at(&self, address: u64, bytes: Vec<u8>, fetched_at: Instant) {
        if let Ok(mut entries) = self.entries.lock() {
            let ttl = self.ttl;
            entries.retain(|_, entry| fetched_at.saturating_duration_since(entry.fetched_at) < ttl);
            entries.insert(address, CachedRead { bytes, fetched_at });
        }
    }

    /// Drop every entry older than the TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| now.saturating_duration_since(entry.fetched_at) < ttl);
        before - entries.len()
    }

    pub fn invalidate(&self, address: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&address);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
