//! Background refresh of region bytes.

mod shutdown;
mod snapshot;
mod sync_loop;

pub use shutdown::ShutdownSignal;
pub use snapshot::{Snapshot, SnapshotCache, SyncTargets};
pub use sync_loop::{SyncLoop, TickReport};
