pub mod link_store;
pub mod snapshot_cache;
pub mod sync_gate;

pub use link_store::{create_shared_link_store, Link, LinkSource, LinkStore, SharedLinkStore};
pub use snapshot_cache::{create_shared_snapshot_cache, SharedSnapshotCache};
pub use sync_gate::{SharedSyncGate, SyncGate};
