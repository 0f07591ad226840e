//! Lock guarding checkpoint persistence.
//!
//! Source workers hold a read guard while they stream, and the checkpoint writer takes the write
//! side to persist a consistent set of watermarks. A source blocked on a DDL gives its read guard
//! back for the duration of the wait so the writer is never starved.

use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Shared read/write lock around checkpoint persistence.
#[derive(Debug, Clone, Default)]
pub struct CheckpointLock {
    inner: Arc<RwLock<()>>,
}

impl CheckpointLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the shared side, held by a source worker while it streams.
    pub async fn read(&self) -> CheckpointReadGuard {
        let guard = self.inner.clone().read_owned().await;
        CheckpointReadGuard {
            lock: self.clone(),
            _guard: guard,
        }
    }

    /// Acquires the exclusive side, held while checkpoints are persisted.
    pub async fn write(&self) -> OwnedRwLockWriteGuard<()> {
        self.inner.clone().write_owned().await
    }
}

/// Read guard on a [`CheckpointLock`] that can be released and re-acquired.
#[derive(Debug)]
pub struct CheckpointReadGuard {
    lock: CheckpointLock,
    _guard: OwnedRwLockReadGuard<()>,
}

impl CheckpointReadGuard {
    /// Releases the guard and returns the lock it belonged to.
    pub fn unlock(self) -> CheckpointLock {
        self.lock
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_writer_waits_for_readers() {
        let lock = CheckpointLock::new();
        let guard = lock.read().await;

        let writer = tokio::time::timeout(Duration::from_millis(20), lock.write()).await;
        assert!(writer.is_err());

        let lock = guard.unlock();
        let writer = tokio::time::timeout(Duration::from_millis(20), lock.write()).await;
        assert!(writer.is_ok());
    }
}
