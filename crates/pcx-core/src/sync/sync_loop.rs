use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, trace};

use super::shutdown::ShutdownSignal;
use super::snapshot::{SnapshotCache, SyncTargets};
use crate::memory::ReadMemory;

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub targets: usize,
    pub updated: usize,
    pub failed: usize,
    pub evicted: usize,
}

/// Background refresher that keeps one snapshot per live region.
pub struct SyncLoop {
    reader: Arc<dyn ReadMemory + Send + Sync>,
    targets: Arc<SyncTargets>,
    cache: Arc<SnapshotCache>,
}

impl SyncLoop {
    pub fn new(
        reader: Arc<dyn ReadMemory + Send + Sync>,
        targets: Arc<SyncTargets>,
        cache: Arc<SnapshotCache>,
    ) -> Self {
        Self {
            reader,
            targets,
            cache,
        }
    }

    /// Evict snapshots of regions that went away, then re-read every live
    /// target. A failed read keeps the previous snapshot.
    pub fn tick(&self) -> TickReport {
        let targets = self.targets.live();
        let live: HashSet<u64> = targets.iter().map(|&(address, _)| address).collect();

        let mut report = TickReport {
            targets: targets.len(),
            evicted: self.cache.retain_addresses(&live),
            ..TickReport::default()
        };

        for (i, &(address, size)) in targets.iter().enumerate() {
            match self.reader.read_bytes(address, size) {
                Ok(bytes) => {
                    self.cache.insert(address, bytes);
                    report.updated += 1;
                }
                // No agent or process: the remaining reads would fail the same way
                Err(e) if e.is_unavailable() => {
                    trace!("Sync tick skipped: {}", e);
                    report.failed += targets.len() - i;
                    break;
                }
                Err(e) => {
                    trace!("Sync read {:#x} ({} bytes) failed: {}", address, size, e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Run `tick` every `interval` on a dedicated thread until `shutdown` fires.
    pub fn spawn(self, interval: Duration, shutdown: Arc<ShutdownSignal>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("pcx-sync".to_string())
            .spawn(move || {
                debug!("Sync loop started ({}ms)", interval.as_millis());
                loop {
                    let report = self.tick();
                    if report.evicted > 0 || report.failed > 0 {
                        debug!(
                            "Sync tick: {} targets, {} failed, {} evicted",
                            report.targets, report.failed, report.evicted
                        );
                    }
                    if shutdown.wait(interval) {
                        break;
                    }
                }
                info!("Sync loop stopped");
            })
    }
}
