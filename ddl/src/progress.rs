//! Replication progress published by source workers.
//!
//! The elimination loop decides whether a destructive DDL may run by looking at how far every
//! other source has gotten. Each source worker owns a [`SourceProgress`] and updates it while
//! streaming. The coordinator sees it through [`SyncProgress`].

use std::fmt;
use std::sync::Mutex;

use tokio::time::Instant;

use crate::types::OplogTimestamp;

/// Progress of one source as seen by the coordinator.
pub trait SyncProgress: Send + Sync + fmt::Debug {
    /// Timestamp up to which the source stream has been applied downstream.
    fn synced_timestamp(&self) -> OplogTimestamp;

    /// Last time the source made forward progress.
    fn last_activity(&self) -> Instant;

    /// Marks everything up to and including the DDL at `timestamp` as synced and returns the new
    /// synced watermark.
    ///
    /// Called by the coordinator right before the source blocks on that DDL.
    fn align_synced_to(&self, timestamp: OplogTimestamp) -> OplogTimestamp;
}

#[derive(Debug, Clone, Copy)]
struct ProgressState {
    synced: OplogTimestamp,
    pending: OplogTimestamp,
    last_activity: Instant,
}

/// Progress of one source, shared between its worker and the coordinator.
///
/// The lock is only held for field copies, so readers never hold back the worker for long.
#[derive(Debug)]
pub struct SourceProgress {
    state: Mutex<ProgressState>,
}

impl SourceProgress {
    /// Creates progress for a source resuming from `checkpoint`.
    pub fn new(checkpoint: OplogTimestamp) -> Self {
        Self {
            state: Mutex::new(ProgressState {
                synced: checkpoint,
                pending: checkpoint,
                last_activity: Instant::now(),
            }),
        }
    }

    /// Records that a batch up to `timestamp` has been read and awaits application.
    pub fn record_pending(&self, timestamp: OplogTimestamp) {
        let mut state = self.lock();
        state.pending = state.pending.max(timestamp);
        state.last_activity = Instant::now();
    }

    /// Records that the stream has been applied downstream up to `timestamp`.
    pub fn record_synced(&self, timestamp: OplogTimestamp) {
        let mut state = self.lock();
        state.synced = state.synced.max(timestamp);
        state.pending = state.pending.max(state.synced);
        state.last_activity = Instant::now();
    }

    /// Timestamp of the last entry read but not necessarily applied yet.
    pub fn pending_timestamp(&self) -> OplogTimestamp {
        self.lock().pending
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        // The state is plain data, a poisoned lock still holds a consistent value.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SyncProgress for SourceProgress {
    fn synced_timestamp(&self) -> OplogTimestamp {
        self.lock().synced
    }

    fn last_activity(&self) -> Instant {
        self.lock().last_activity
    }

    /// A DDL is always alone in its batch, so nothing between the two watermarks still needs
    /// applying. A checkpoint taken while the source sleeps must not lag behind.
    fn align_synced_to(&self, timestamp: OplogTimestamp) -> OplogTimestamp {
        let mut state = self.lock();
        state.pending = state.pending.max(timestamp);
        state.synced = state.pending;
        state.synced
    }
}
