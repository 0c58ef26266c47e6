//! In-memory memory source for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::memory::{MemoryState, MemoryType, QueryMemory, ReadMemory, RegionInfo};

struct Segment {
    base: u64,
    bytes: Vec<u8>,
    kind: MemoryType,
}

pub struct MockMemory {
    segments: Mutex<Vec<Segment>>,
    failing: AtomicBool,
    reads: AtomicUsize,
}

impl MockMemory {
    pub fn new() -> Self {
        Self {
            segments: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        }
    }

    /// Add an image-backed segment.
    pub fn with_segment(self, base: u64, bytes: Vec<u8>) -> Self {
        self.add(base, bytes, MemoryType::Image);
        self
    }

    /// Add a committed private (heap) segment.
    pub fn with_heap(self, base: u64, bytes: Vec<u8>) -> Self {
        self.add(base, bytes, MemoryType::Private);
        self
    }

    fn add(&self, base: u64, bytes: Vec<u8>, kind: MemoryType) {
        self.segments
            .lock()
            .unwrap()
            .push(Segment { base, bytes, kind });
    }

    /// Overwrite bytes inside an existing segment.
    pub fn poke(&self, address: u64, data: &[u8]) {
        let mut segments = self.segments.lock().unwrap();
        let segment = segments
            .iter_mut()
            .find(|s| address >= s.base && address + data.len() as u64 <= s.base + s.bytes.len() as u64)
            .expect("poke outside mock segments");
        let start = (address - segment.base) as usize;
        segment.bytes[start..start + data.len()].copy_from_slice(data);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ReadMemory for MockMemory {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Timeout {
                kind: "rvm",
                millis: 100,
            });
        }

        let segments = self.segments.lock().unwrap();
        segments
            .iter()
            .find(|s| {
                address >= s.base
                    && address.saturating_add(size as u64) <= s.base + s.bytes.len() as u64
            })
            .map(|s| {
                let start = (address - s.base) as usize;
                s.bytes[start..start + size].to_vec()
            })
            .ok_or_else(|| Error::MemoryReadFailed {
                address,
                message: "unmapped".to_string(),
            })
    }
}

impl QueryMemory for MockMemory {
    fn query_region(&self, address: u64) -> Result<RegionInfo> {
        let segments = self.segments.lock().unwrap();
        let kind = segments
            .iter()
            .find(|s| address >= s.base && address < s.base + s.bytes.len() as u64)
            .map(|s| s.kind);

        Ok(match kind {
            Some(kind) => RegionInfo {
                state: MemoryState::Commit,
                kind,
                protect: 0x04,
            },
            None => RegionInfo {
                state: MemoryState::Free,
                kind: MemoryType::Private,
                protect: 0x01,
            },
        })
    }
}
