//! Shared table of DDL entries waiting for release.
//!
//! Every source worker that meets a DDL reports it here and then sleeps on the release signal of
//! the matching entry. Two reports designate the same DDL when they target the same namespace and
//! carry byte-identical serialized command documents. The elimination loop is the only caller that
//! removes entries.
//!
//! All methods run under one mutex that is never held across an await point, so a sleeping source
//! cannot hold back the elimination loop or other sources.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use metrics::{counter, gauge};
use tracing::{debug, info};

use crate::bail;
use crate::concurrency::signal::{ReleaseRx, ReleaseTx, create_release_signal};
use crate::ddl_error;
use crate::error::{DdlResult, ErrorKind};
use crate::metrics::{DDL_PENDING, DDL_REPORTS_TOTAL, REPLICA_SET_LABEL};
use crate::types::{Document, OplogEntry, OplogTimestamp, ReplicaSetId};

/// Identity of a DDL: its namespace and serialized command document.
///
/// Ordering compares the namespace first and then the serialized bytes, which makes it usable as a
/// deterministic tie-breaker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DdlKey {
    namespace: String,
    body: String,
}

impl DdlKey {
    /// Computes the identity of a captured entry.
    ///
    /// Fails with [`ErrorKind::SerializationError`] when the command document cannot be
    /// serialized. Such an entry is malformed and cannot be coordinated.
    pub fn for_entry(entry: &OplogEntry) -> DdlResult<DdlKey> {
        let body = serde_json::to_string(&entry.object).map_err(|err| {
            ddl_error!(
                ErrorKind::SerializationError,
                "Could not compute the identity of a DDL entry",
                format!("namespace {}", entry.namespace),
                source: err
            )
        })?;

        Ok(DdlKey {
            namespace: entry.namespace.clone(),
            body,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Serialized command document.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Decodes the serialized command document back into a [`Document`].
    pub fn decode_body(&self) -> DdlResult<Document> {
        serde_json::from_str(&self.body).map_err(|err| {
            ddl_error!(
                ErrorKind::DeserializationError,
                "Could not decode the command document of a DDL",
                self.to_string(),
                source: err
            )
        })
    }
}

impl fmt::Display for DdlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.namespace, self.body)
    }
}

/// Identifier of one pending entry instance.
///
/// The same DDL identity may be reported again after a release, which creates a new instance with
/// a new id.
pub type PendingDdlId = u64;

/// Handle returned to a source after it reported a DDL.
#[derive(Debug, Clone)]
pub struct PendingDdlHandle {
    key: DdlKey,
    id: PendingDdlId,
    release_rx: ReleaseRx,
}

impl PendingDdlHandle {
    pub fn key(&self) -> &DdlKey {
        &self.key
    }

    pub fn id(&self) -> PendingDdlId {
        self.id
    }

    /// Returns `true` once the entry has been released.
    pub fn is_released(&self) -> bool {
        self.release_rx.is_released()
    }

    /// Sleeps until the entry is released.
    ///
    /// Returns `true` on release. Returns `false` only when the registry was dropped while the
    /// entry was still pending.
    pub async fn wait_for_release(&mut self) -> bool {
        self.release_rx.wait().await
    }
}

/// Copy of a pending entry taken under the registry lock.
#[derive(Debug, Clone)]
pub struct PendingDdlSnapshot {
    pub id: PendingDdlId,
    pub key: DdlKey,
    /// Entry as captured by the first source that reported it.
    pub entry: OplogEntry,
    /// Timestamp at which each source reported this DDL.
    pub reported: HashMap<ReplicaSetId, OplogTimestamp>,
}

impl PendingDdlSnapshot {
    /// Earliest timestamp at which any source reported this DDL.
    pub fn min_timestamp(&self) -> Option<OplogTimestamp> {
        self.reported.values().copied().min()
    }
}

#[derive(Debug)]
struct PendingDdl {
    id: PendingDdlId,
    entry: OplogEntry,
    release_tx: ReleaseTx,
    reported: HashMap<ReplicaSetId, OplogTimestamp>,
}

impl PendingDdl {
    fn min_timestamp(&self) -> Option<OplogTimestamp> {
        self.reported.values().copied().min()
    }

    fn snapshot(&self, key: &DdlKey) -> PendingDdlSnapshot {
        PendingDdlSnapshot {
            id: self.id,
            key: key.clone(),
            entry: self.entry.clone(),
            reported: self.reported.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<DdlKey, PendingDdl>,
    next_id: PendingDdlId,
}

/// Registry of pending DDL entries, shared by all source workers.
#[derive(Debug, Default)]
pub struct DdlRegistry {
    inner: Mutex<RegistryInner>,
}

impl DdlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `replica_set` reached `entry` and returns the handle to wait on.
    ///
    /// The first report of an identity creates the pending entry. Later reports, from other
    /// sources or from the same one, only record their timestamp, the last one winning.
    pub fn report(
        &self,
        replica_set: &ReplicaSetId,
        entry: &OplogEntry,
    ) -> DdlResult<PendingDdlHandle> {
        let key = DdlKey::for_entry(entry)?;

        let mut inner = self.lock();
        let next_id = inner.next_id;
        let pending = inner.entries.entry(key.clone()).or_insert_with(|| {
            let (release_tx, _) = create_release_signal();
            PendingDdl {
                id: next_id,
                entry: entry.clone(),
                release_tx,
                reported: HashMap::new(),
            }
        });
        pending.reported.insert(replica_set.clone(), entry.timestamp);

        let handle = PendingDdlHandle {
            key,
            id: pending.id,
            release_rx: pending.release_tx.subscribe(),
        };
        if handle.id == next_id {
            inner.next_id += 1;
        }

        counter!(DDL_REPORTS_TOTAL, REPLICA_SET_LABEL => replica_set.to_string()).increment(1);
        gauge!(DDL_PENDING).set(inner.entries.len() as f64);

        Ok(handle)
    }

    /// Fires the release signal of the entry `id` registered under `key` and removes it.
    ///
    /// Fails with [`ErrorKind::RegistryInvariantViolated`] when no such entry is pending, which
    /// means two release paths raced.
    pub fn release(&self, key: &DdlKey, id: PendingDdlId) -> DdlResult<()> {
        let mut inner = self.lock();

        match inner.entries.get(key) {
            Some(pending) if pending.id == id => {}
            Some(pending) => bail!(
                ErrorKind::RegistryInvariantViolated,
                "Released DDL entry was replaced before its release",
                format!("ddl {key}, expected entry {id}, found entry {}", pending.id)
            ),
            None => bail!(
                ErrorKind::RegistryInvariantViolated,
                "Released DDL entry is not pending",
                format!("ddl {key}, entry {id}")
            ),
        }

        if let Some(pending) = inner.entries.remove(key) {
            pending.release_tx.release();
        }
        gauge!(DDL_PENDING).set(inner.entries.len() as f64);

        Ok(())
    }

    /// Returns a copy of the pending entry with the earliest reported timestamp.
    ///
    /// Entries whose minimum timestamps are equal are ordered by their [`DdlKey`].
    pub fn select_earliest(&self) -> Option<PendingDdlSnapshot> {
        let inner = self.lock();
        if inner.entries.is_empty() {
            return None;
        }

        info!(pending = inner.entries.len(), "ddl entries waiting for release");
        for (key, pending) in &inner.entries {
            debug!(
                ddl = %key,
                reported_by = pending.reported.len(),
                "ddl entry waiting for release"
            );
        }

        inner
            .entries
            .iter()
            .filter_map(|(key, pending)| pending.min_timestamp().map(|ts| (ts, key, pending)))
            .min_by(|(ts_a, key_a, _), (ts_b, key_b, _)| ts_a.cmp(ts_b).then_with(|| key_a.cmp(key_b)))
            .map(|(_, key, pending)| pending.snapshot(key))
    }

    /// Returns copies of every pending entry.
    pub fn snapshot(&self) -> Vec<PendingDdlSnapshot> {
        self.lock()
            .entries
            .iter()
            .map(|(key, pending)| pending.snapshot(key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // No code path panics while holding the lock, but a poisoned registry must still be
        // reachable so blocked sources can be released.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
