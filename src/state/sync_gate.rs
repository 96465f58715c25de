use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Pause switch for the scheduler's roster reconciliation.
///
/// A verification commit holds a [`PauseGuard`] while it writes the link and
/// grants roles, so a pass running on an older snapshot cannot strip them.
/// Pauses nest; reconciliation resumes when the last guard drops.
#[derive(Debug, Default)]
pub struct SyncGate {
    holds: AtomicUsize,
}

impl SyncGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pause(self: &Arc<Self>) -> PauseGuard {
        self.holds.fetch_add(1, Ordering::SeqCst);
        PauseGuard { gate: self.clone() }
    }

    pub fn is_paused(&self) -> bool {
        self.holds.load(Ordering::SeqCst) > 0
    }
}

pub struct PauseGuard {
    gate: Arc<SyncGate>,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.gate.holds.fetch_sub(1, Ordering::SeqCst);
    }
}

pub type SharedSyncGate = Arc<SyncGate>;
