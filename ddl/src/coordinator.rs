//! Coordination of DDL entries across sources.
//!
//! A [`DdlCoordinator`] is built once per pipeline and shared with every source worker and with
//! the elimination worker. Source workers call [`DdlCoordinator::block_on_ddl`] when they meet a
//! DDL and [`DdlCoordinator::transform`] once they are released. The elimination worker calls
//! [`DdlCoordinator::eliminate_once`] on every tick.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use ddl_config::shared::DdlConfig;
use metrics::{counter, gauge};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bail;
use crate::checkpoint::CheckpointReadGuard;
use crate::command::{DdlCommand, DdlKind};
use crate::eliminate::{
    BlockingSource, DestructiveCheck, EliminationOutcome, ReleaseReason, SourceView,
    check_destructive,
};
use crate::error::{DdlResult, ErrorKind};
use crate::metadata::ShardMetadata;
use crate::metrics::{
    DDL_DEFERRALS_TOTAL, DDL_PENDING, DDL_RELEASES_TOTAL, RELEASE_REASON_LABEL,
};
use crate::progress::SyncProgress;
use crate::registry::{DdlKey, DdlRegistry, PendingDdlId, PendingDdlSnapshot};
use crate::transform::transform_ddl;
use crate::types::{OplogEntry, OplogTimestamp, ReplicaSetId, ShardCollectionSpec};

/// Decision taken for the earliest pending DDL.
enum Decision {
    Release(ReleaseReason),
    Defer(BlockingSource),
}

/// Shared coordinator of DDL entries across all sources of a pipeline.
#[derive(Debug)]
pub struct DdlCoordinator {
    config: DdlConfig,
    registry: DdlRegistry,
    sources: RwLock<BTreeMap<ReplicaSetId, Arc<dyn SyncProgress>>>,
    shard_metadata: Option<Arc<dyn ShardMetadata>>,
    target_is_sharded: bool,
    /// Entry released by the latest elimination run. Holding the lock makes runs single-flight.
    last_released: Mutex<Option<(DdlKey, PendingDdlId)>>,
}

impl DdlCoordinator {
    /// Creates a coordinator.
    ///
    /// `shard_metadata` is `None` when the pipeline does not replicate from a sharded cluster. Every
    /// DDL then counts as sharded and goes through the command policy.
    /// `target_is_sharded` tells the transformer whether created collections must be sharded at
    /// the target.
    pub fn new(
        config: DdlConfig,
        shard_metadata: Option<Arc<dyn ShardMetadata>>,
        target_is_sharded: bool,
    ) -> DdlResult<Arc<Self>> {
        config.validate()?;

        info!(
            check_interval_ms = config.check_interval_ms,
            unresponsive_threshold_ms = config.unresponsive_threshold_ms,
            sharded_source = shard_metadata.is_some(),
            target_is_sharded,
            "creating ddl coordinator"
        );

        Ok(Arc::new(Self {
            config,
            registry: DdlRegistry::new(),
            sources: RwLock::new(BTreeMap::new()),
            shard_metadata,
            target_is_sharded,
            last_released: Mutex::new(None),
        }))
    }

    pub fn config(&self) -> &DdlConfig {
        &self.config
    }

    pub fn target_is_sharded(&self) -> bool {
        self.target_is_sharded
    }

    /// Registers a source whose progress is considered by destructive DDL checks.
    ///
    /// Registering the same replica set twice replaces its progress handle.
    pub fn add_source(&self, replica_set: ReplicaSetId, progress: Arc<dyn SyncProgress>) {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        if sources.insert(replica_set.clone(), progress).is_some() {
            warn!(replica_set = %replica_set, "source registered twice, replacing its progress");
        } else {
            info!(replica_set = %replica_set, "source registered with ddl coordinator");
        }
    }

    /// Number of DDL entries waiting for release.
    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    /// Reports `entry` on behalf of `replica_set` and sleeps until it is released.
    ///
    /// The checkpoint read guard held by the source is given back for the duration of the wait and
    /// re-acquired before returning. The wait has no timeout.
    pub async fn block_on_ddl(
        &self,
        replica_set: &ReplicaSetId,
        entry: &OplogEntry,
        checkpoint_guard: CheckpointReadGuard,
    ) -> DdlResult<CheckpointReadGuard> {
        let Some(progress) = self.source(replica_set) else {
            bail!(
                ErrorKind::InvalidState,
                "DDL reported by an unregistered source",
                format!("replica set {replica_set}, namespace {}", entry.namespace)
            );
        };

        let mut handle = self.registry.report(replica_set, entry)?;
        let synced_timestamp = progress.align_synced_to(entry.timestamp);

        info!(
            replica_set = %replica_set,
            ddl = %handle.key(),
            timestamp = %entry.timestamp,
            synced_timestamp = %synced_timestamp,
            "source blocked at ddl"
        );

        let checkpoint_lock = checkpoint_guard.unlock();
        let released = handle.wait_for_release().await;
        let checkpoint_guard = checkpoint_lock.read().await;

        if !released {
            bail!(
                ErrorKind::InvalidState,
                "DDL entry was dropped without being released",
                format!("replica set {replica_set}, ddl {}", handle.key())
            );
        }

        info!(replica_set = %replica_set, ddl = %handle.key(), "source released from ddl");

        Ok(checkpoint_guard)
    }

    /// Looks up the sharding description of the collection targeted by `entry`.
    ///
    /// Returns `None` without querying when the pipeline has no sharded source.
    pub async fn shard_spec_for(&self, entry: &OplogEntry) -> DdlResult<Option<ShardCollectionSpec>> {
        match &self.shard_metadata {
            Some(shard_metadata) => {
                shard_metadata
                    .shard_collection_spec(&entry.target_namespace())
                    .await
            }
            None => Ok(None),
        }
    }

    /// Converts a released DDL entry into the operations to apply at the target.
    pub fn transform(
        &self,
        replica_set: &ReplicaSetId,
        entry: &OplogEntry,
        shard_spec: Option<&ShardCollectionSpec>,
    ) -> DdlResult<Vec<OplogEntry>> {
        transform_ddl(replica_set, entry, shard_spec, self.target_is_sharded)
    }

    /// Runs one elimination pass over the pending DDL entries.
    ///
    /// Concurrent calls are serialized. At most one entry is released per call.
    pub async fn eliminate_once(&self) -> DdlResult<EliminationOutcome> {
        let mut last_released = self.last_released.lock().await;

        let Some(pending) = self.registry.select_earliest() else {
            gauge!(DDL_PENDING).set(0.0);
            return Ok(EliminationOutcome::Idle);
        };

        // Release removes the entry in the same locked step, so this only matches if the registry
        // hands back an instance that was already released.
        if let Some((key, id)) = last_released.as_ref()
            && *key == pending.key
            && *id == pending.id
        {
            info!(ddl = %pending.key, "ddl already released, waiting for its reporters");
            return Ok(EliminationOutcome::AlreadyReleased { key: pending.key });
        }

        let Some(min_timestamp) = pending.min_timestamp() else {
            bail!(
                ErrorKind::RegistryInvariantViolated,
                "Pending DDL entry has no reporting source",
                format!("ddl {}", pending.key)
            );
        };

        match self.decide(&pending, min_timestamp).await? {
            Decision::Release(reason) => {
                self.registry.release(&pending.key, pending.id)?;
                *last_released = Some((pending.key.clone(), pending.id));

                counter!(DDL_RELEASES_TOTAL, RELEASE_REASON_LABEL => reason.as_label())
                    .increment(1);
                info!(
                    ddl = %pending.key,
                    min_timestamp = %min_timestamp,
                    reason = %reason,
                    "released ddl"
                );

                Ok(EliminationOutcome::Released {
                    key: pending.key,
                    reason,
                })
            }
            Decision::Defer(blocking) => {
                counter!(DDL_DEFERRALS_TOTAL).increment(1);
                info!(
                    ddl = %pending.key,
                    min_timestamp = %min_timestamp,
                    replica_set = %blocking.replica_set,
                    synced_timestamp = %blocking.synced_timestamp,
                    idle_ms = blocking.idle_for.as_millis() as u64,
                    "destructive ddl deferred, source has not reached it"
                );

                Ok(EliminationOutcome::Deferred {
                    key: pending.key,
                    blocking,
                })
            }
        }
    }

    async fn decide(
        &self,
        pending: &PendingDdlSnapshot,
        min_timestamp: OplogTimestamp,
    ) -> DdlResult<Decision> {
        let kind = DdlKind::of(&pending.entry);

        if let Some(shard_metadata) = &self.shard_metadata {
            let sharded = match &kind {
                DdlKind::Destructive(DdlCommand::DropDatabase) => {
                    let database = pending.entry.database();
                    shard_metadata.has_sharded_collections(database).await?
                }
                _ => {
                    let namespace = pending.entry.target_namespace();
                    shard_metadata
                        .shard_collection_spec(&namespace)
                        .await?
                        .is_some()
                }
            };

            if !sharded {
                debug!(ddl = %pending.key, "ddl targets data that is not sharded");
                return Ok(Decision::Release(ReleaseReason::NonShardedNamespace));
            }
        }

        let reason = match kind {
            DdlKind::IndexBookkeeping => ReleaseReason::IndexBookkeeping,
            DdlKind::Additive(command) => ReleaseReason::Additive(command),
            DdlKind::Destructive(command) => {
                let sources = self.source_views();
                let check = check_destructive(
                    min_timestamp,
                    |replica_set| pending.reported.contains_key(replica_set),
                    &sources,
                    Instant::now(),
                    self.config.unresponsive_threshold(),
                );

                match check {
                    DestructiveCheck::Ready { forced } => {
                        if !forced.is_empty() {
                            warn!(
                                ddl = %pending.key,
                                forced = ?forced,
                                "forcing destructive ddl through idle sources"
                            );
                        }
                        ReleaseReason::Destructive { command, forced }
                    }
                    DestructiveCheck::Blocked(blocking) => return Ok(Decision::Defer(blocking)),
                }
            }
            DdlKind::Unsupported(command) => {
                let mut reported_by = pending
                    .reported
                    .keys()
                    .map(ReplicaSetId::as_str)
                    .collect::<Vec<_>>();
                reported_by.sort_unstable();

                bail!(
                    ErrorKind::IllegalDdl,
                    "DDL cannot be replicated across shards",
                    format!(
                        "command {command}, ddl {}, reported by [{}]",
                        pending.key,
                        reported_by.join(", ")
                    )
                );
            }
            DdlKind::Unknown(name) => {
                warn!(ddl = %pending.key, command = %name, "releasing ddl with an unknown command");
                ReleaseReason::Unknown(name)
            }
        };

        Ok(Decision::Release(reason))
    }

    fn source(&self, replica_set: &ReplicaSetId) -> Option<Arc<dyn SyncProgress>> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(replica_set)
            .cloned()
    }

    fn source_views(&self) -> Vec<SourceView> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(replica_set, progress)| SourceView {
                replica_set: replica_set.clone(),
                synced_timestamp: progress.synced_timestamp(),
                last_activity: progress.last_activity(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::progress::SourceProgress;

    fn drop_entry(seconds: u32) -> OplogEntry {
        let serde_json::Value::Object(object) = json!({ "drop": "coll" }) else {
            unreachable!()
        };
        OplogEntry::command(OplogTimestamp::new(seconds, 0), "db.$cmd", object)
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = DdlConfig {
            check_interval_ms: 0,
            ..DdlConfig::default()
        };

        let err = DdlCoordinator::new(config, None, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[tokio::test]
    async fn test_idle_when_nothing_is_pending() {
        let coordinator = DdlCoordinator::new(DdlConfig::default(), None, false).unwrap();
        assert_eq!(
            coordinator.eliminate_once().await.unwrap(),
            EliminationOutcome::Idle
        );
    }

    #[tokio::test]
    async fn test_unregistered_source_cannot_block() {
        let coordinator = DdlCoordinator::new(DdlConfig::default(), None, false).unwrap();
        let lock = crate::checkpoint::CheckpointLock::new();

        let err = coordinator
            .block_on_ddl(&ReplicaSetId::new("rs1"), &drop_entry(10), lock.read().await)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_sharded_source_still_defers_destructive_ddl() {
        let coordinator = DdlCoordinator::new(DdlConfig::default(), None, false).unwrap();
        let rs1 = ReplicaSetId::new("rs1");
        let rs2 = ReplicaSetId::new("rs2");
        coordinator.add_source(rs1.clone(), Arc::new(SourceProgress::new(OplogTimestamp::MIN)));
        coordinator.add_source(rs2.clone(), Arc::new(SourceProgress::new(OplogTimestamp::MIN)));

        let lock = crate::checkpoint::CheckpointLock::new();
        let guard = lock.read().await;
        let blocked = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.block_on_ddl(&rs1, &drop_entry(10), guard).await })
        };

        while coordinator.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        match coordinator.eliminate_once().await.unwrap() {
            EliminationOutcome::Deferred { blocking, .. } => assert_eq!(blocking.replica_set, rs2),
            outcome => panic!("expected the drop to be deferred, got {outcome:?}"),
        }
        assert!(!blocked.is_finished());
        assert_eq!(coordinator.pending_count(), 1);

        blocked.abort();
    }

    #[tokio::test]
    async fn test_released_instance_is_not_released_twice() {
        let coordinator = DdlCoordinator::new(DdlConfig::default(), None, false).unwrap();
        let rs1 = ReplicaSetId::new("rs1");
        let _handle = coordinator.registry.report(&rs1, &drop_entry(10)).unwrap();

        let snapshot = coordinator.registry.select_earliest().unwrap();
        *coordinator.last_released.lock().await = Some((snapshot.key.clone(), snapshot.id));

        assert_eq!(
            coordinator.eliminate_once().await.unwrap(),
            EliminationOutcome::AlreadyReleased { key: snapshot.key }
        );
        assert_eq!(coordinator.pending_count(), 1);
    }
}
