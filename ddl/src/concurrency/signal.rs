//! One-shot broadcast signal used to release sources blocked on a DDL.
//!
//! A [`ReleaseTx`] is owned by the pending DDL entry inside the registry. Every source that
//! reported the same DDL holds a [`ReleaseRx`] and sleeps on it without holding any lock. Firing
//! the signal wakes all of them at once, and a receiver that starts waiting after the release
//! still observes it.

use tokio::sync::watch;

/// Transmitter side of a release signal.
#[derive(Debug)]
pub struct ReleaseTx(watch::Sender<bool>);

impl ReleaseTx {
    /// Fires the signal.
    ///
    /// Returns `false` when the signal had already been fired, in which case nothing changes.
    pub fn release(&self) -> bool {
        !self.0.send_replace(true)
    }

    /// Returns `true` once the signal has been fired.
    pub fn is_released(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new receiver for this signal.
    pub fn subscribe(&self) -> ReleaseRx {
        ReleaseRx(self.0.subscribe())
    }
}

/// Receiver side of a release signal.
#[derive(Debug, Clone)]
pub struct ReleaseRx(watch::Receiver<bool>);

impl ReleaseRx {
    /// Waits until the signal fires.
    ///
    /// Returns `true` when released. Returns `false` when the transmitter was dropped without
    /// firing, which only happens when the owning registry is torn down.
    pub async fn wait(&mut self) -> bool {
        self.0.wait_for(|released| *released).await.is_ok()
    }

    /// Returns `true` if the signal has already fired.
    pub fn is_released(&self) -> bool {
        *self.0.borrow()
    }
}

/// Creates a new, unfired release signal.
pub fn create_release_signal() -> (ReleaseTx, ReleaseRx) {
    let (tx, rx) = watch::channel(false);
    (ReleaseTx(tx), ReleaseRx(rx))
}
