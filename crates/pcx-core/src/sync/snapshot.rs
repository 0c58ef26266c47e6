use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;

/// Bytes captured for one region address.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub bytes: Vec<u8>,
    pub captured_at: Instant,
}

/// Latest bytes per region address, written by the sync loop.
///
/// Readers only ever receive copies.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: Mutex<HashMap<u64, Snapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: u64) -> Option<Snapshot> {
        self.entries.lock().ok()?.get(&address).cloned()
    }

    /// Copy of the bytes at `address`, if they are exactly `size` long.
    pub fn bytes_of_size(&self, address: u64, size: usize) -> Option<Vec<u8>> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(&address)
            .filter(|snapshot| snapshot.bytes.len() == size)
            .map(|snapshot| snapshot.bytes.clone())
    }

    pub fn insert(&self, address: u64, bytes: Vec<u8>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                address,
                Snapshot {
                    bytes,
                    captured_at: Instant::now(),
                },
            );
        }
    }

    /// Drop every entry whose address is not in `live`. Returns how many went.
    pub fn retain_addresses(&self, live: &HashSet<u64>) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|address, _| live.contains(address));
        before - entries.len()
    }

    pub fn contains(&self, address: u64) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(&address))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Regions the consumer wants kept fresh, republished every frame.
#[derive(Debug, Default)]
pub struct SyncTargets {
    targets: Mutex<Vec<(u64, usize)>>,
}

impl SyncTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, targets: Vec<(u64, usize)>) {
        if let Ok(mut current) = self.targets.lock() {
            *current = targets;
        }
    }

    /// Current targets with a non-zero address and size.
    pub fn live(&self) -> Vec<(u64, usize)> {
        self.targets
            .lock()
            .map(|targets| {
                targets
                    .iter()
                    .copied()
                    .filter(|&(address, size)| address != 0 && size > 0)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_of_size_requires_exact_length() {
        let cache = SnapshotCache::new();
        cache.insert(0x1000, vec![1, 2, 3, 4]);
        assert_eq!(cache.bytes_of_size(0x1000, 4), Some(vec![1, 2, 3, 4]));
        assert_eq!(cache.bytes_of_size(0x1000, 8), None);
        assert_eq!(cache.bytes_of_size(0x2000, 4), None);
    }

    #[test]
    fn test_retain_addresses() {
        let cache = SnapshotCache::new();
        cache.insert(1, vec![0]);
        cache.insert(2, vec![0]);
        cache.insert(3, vec![0]);

        let live: HashSet<u64> = [2].into_iter().collect();
        assert_eq!(cache.retain_addresses(&live), 2);
        assert!(cache.contains(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_targets_filter_empty_entries() {
        let targets = SyncTargets::new();
        targets.publish(vec![(0x1000, 16), (0, 16), (0x2000, 0)]);
        assert_eq!(targets.live(), vec![(0x1000, 16)]);

        targets.publish(Vec::new());
        assert!(targets.live().is_empty());
    }
}
