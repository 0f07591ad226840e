//! Release policy of the elimination loop.
//!
//! Each run picks the pending DDL reported earliest and decides whether it may run now. Additive
//! changes are released right away. Destructive changes wait until no known source could still
//! send data that the change would discard.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::command::DdlCommand;
use crate::registry::DdlKey;
use crate::types::{OplogTimestamp, ReplicaSetId};

/// Why a DDL was released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseReason {
    /// The source cluster does not shard the DDL's collection, or any collection of a dropped
    /// database.
    NonShardedNamespace,
    /// Index definition inserted into `system.indexes`.
    IndexBookkeeping,
    /// Non-destructive command.
    Additive(DdlCommand),
    /// Destructive command whose safety conditions hold for every known source.
    ///
    /// `forced` lists the sources that only qualified because they were idle past the
    /// unresponsiveness threshold.
    Destructive {
        command: DdlCommand,
        forced: Vec<ReplicaSetId>,
    },
    /// Command the policy does not reason about, let through.
    Unknown(String),
}

impl ReleaseReason {
    /// Short label used for metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReleaseReason::NonShardedNamespace => "non_sharded_namespace",
            ReleaseReason::IndexBookkeeping => "index_bookkeeping",
            ReleaseReason::Additive(_) => "additive",
            ReleaseReason::Destructive { forced, .. } if forced.is_empty() => "destructive",
            ReleaseReason::Destructive { .. } => "destructive_forced",
            ReleaseReason::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseReason::Additive(command) => write!(f, "additive {command}"),
            ReleaseReason::Destructive { command, forced } if !forced.is_empty() => {
                let forced = forced
                    .iter()
                    .map(ReplicaSetId::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "destructive {command}, forced through idle sources [{forced}]")
            }
            ReleaseReason::Destructive { command, .. } => write!(f, "destructive {command}"),
            ReleaseReason::Unknown(name) => write!(f, "unknown command `{name}`"),
            other => f.write_str(other.as_label()),
        }
    }
}

/// Source holding back a destructive DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingSource {
    pub replica_set: ReplicaSetId,
    pub synced_timestamp: OplogTimestamp,
    /// Time elapsed since the source last made progress.
    pub idle_for: Duration,
}

/// Result of one elimination run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EliminationOutcome {
    /// Nothing was pending.
    Idle,
    /// The earliest entry was released by a previous run and is not reaped yet.
    AlreadyReleased { key: DdlKey },
    /// The earliest entry was released.
    Released { key: DdlKey, reason: ReleaseReason },
    /// The earliest entry is destructive and at least one source may still be behind it.
    Deferred { key: DdlKey, blocking: BlockingSource },
}

/// Progress of one known source at the time of the check.
#[derive(Debug, Clone)]
pub struct SourceView {
    pub replica_set: ReplicaSetId,
    pub synced_timestamp: OplogTimestamp,
    pub last_activity: Instant,
}

/// Outcome of the destructive DDL safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestructiveCheck {
    /// Every source is past the DDL. `forced` lists the ones that only qualified through idleness.
    Ready { forced: Vec<ReplicaSetId> },
    /// The first source found that may still send data the DDL would discard.
    Blocked(BlockingSource),
}

/// Checks whether a destructive DDL reported first at `min_timestamp` may run.
///
/// A source qualifies when it reported the same DDL, when its synced watermark reached
/// `min_timestamp`, or when it made no progress for longer than `unresponsive_threshold`.
/// Sources are visited in the given order.
pub fn check_destructive<'a>(
    min_timestamp: OplogTimestamp,
    reported_by: impl Fn(&ReplicaSetId) -> bool,
    sources: impl IntoIterator<Item = &'a SourceView>,
    now: Instant,
    unresponsive_threshold: Duration,
) -> DestructiveCheck {
    let mut forced = Vec::new();

    for source in sources {
        if reported_by(&source.replica_set) {
            continue;
        }

        if source.synced_timestamp >= min_timestamp {
            continue;
        }

        let idle_for = now.saturating_duration_since(source.last_activity);
        if idle_for > unresponsive_threshold {
            forced.push(source.replica_set.clone());
            continue;
        }

        return DestructiveCheck::Blocked(BlockingSource {
            replica_set: source.replica_set.clone(),
            synced_timestamp: source.synced_timestamp,
            idle_for,
        });
    }

    DestructiveCheck::Ready { forced }
}
