#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ddl::checkpoint::CheckpointLock;
use ddl::coordinator::DdlCoordinator;
use ddl::ddl_error;
use ddl::error::{DdlResult, ErrorKind};
use ddl::metadata::ShardMetadata;
use ddl::progress::SourceProgress;
use ddl::types::{Document, OplogEntry, OplogTimestamp, ReplicaSetId, ShardCollectionSpec};
use ddl_config::shared::DdlConfig;
use serde_json::Value;
use tokio::task::JoinHandle;

/// Converts a `json!` object literal into a command document.
pub fn document(value: Value) -> Document {
    let Value::Object(object) = value else {
        panic!("expected a json object, got {value}");
    };
    object
}

pub fn ts(seconds: u32) -> OplogTimestamp {
    OplogTimestamp::new(seconds, 0)
}

pub fn command(seconds: u32, namespace: &str, body: Value) -> OplogEntry {
    OplogEntry::command(ts(seconds), namespace, document(body))
}

pub fn index_insert(seconds: u32, namespace: &str, body: Value) -> OplogEntry {
    OplogEntry::insert(ts(seconds), namespace, document(body))
}

/// In-memory sharding metadata of a source cluster.
#[derive(Debug, Default)]
pub struct StaticShardMetadata {
    specs: Mutex<HashMap<String, ShardCollectionSpec>>,
    unavailable: AtomicBool,
    queries: AtomicUsize,
}

impl StaticShardMetadata {
    /// Metadata where every listed namespace is sharded on a hashed `_id`.
    pub fn with_sharded(namespaces: &[&str]) -> Arc<Self> {
        let metadata = Self::default();
        for namespace in namespaces {
            metadata.shard(ShardCollectionSpec::new(
                *namespace,
                document(serde_json::json!({"_id": "hashed"})),
                false,
            ));
        }

        Arc::new(metadata)
    }

    pub fn shard(&self, spec: ShardCollectionSpec) {
        self.specs.lock().unwrap().insert(spec.ns.clone(), spec);
    }

    /// Makes every following query fail until called again with `false`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShardMetadata for StaticShardMetadata {
    async fn shard_collection_spec(
        &self,
        namespace: &str,
    ) -> DdlResult<Option<ShardCollectionSpec>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ddl_error!(
                ErrorKind::ShardMetadataQueryFailed,
                "Config servers are unreachable",
                format!("namespace {namespace}")
            ));
        }

        Ok(self.specs.lock().unwrap().get(namespace).cloned())
    }

    async fn has_sharded_collections(&self, database: &str) -> DdlResult<bool> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ddl_error!(
                ErrorKind::ShardMetadataQueryFailed,
                "Config servers are unreachable",
                format!("database {database}")
            ));
        }

        let prefix = format!("{database}.");
        Ok(self
            .specs
            .lock()
            .unwrap()
            .keys()
            .any(|namespace| namespace.starts_with(&prefix)))
    }
}

/// A registered source together with its progress handle.
pub struct TestSource {
    pub replica_set: ReplicaSetId,
    pub progress: Arc<SourceProgress>,
}

impl TestSource {
    /// Marks the source as having applied everything up to `seconds`.
    pub fn sync_to(&self, seconds: u32) {
        self.progress.record_pending(ts(seconds));
        self.progress.record_synced(ts(seconds));
    }
}

pub fn config() -> DdlConfig {
    DdlConfig {
        check_interval_ms: 1_000,
        unresponsive_threshold_ms: 60_000,
    }
}

pub fn add_source(coordinator: &DdlCoordinator, name: &str) -> TestSource {
    let replica_set = ReplicaSetId::new(name);
    let progress = Arc::new(SourceProgress::new(OplogTimestamp::MIN));
    coordinator.add_source(replica_set.clone(), progress.clone());

    TestSource {
        replica_set,
        progress,
    }
}

/// Spawns a task that blocks `source` on `entry` the way a source worker does.
pub fn spawn_blocked(
    coordinator: &Arc<DdlCoordinator>,
    lock: &CheckpointLock,
    source: &TestSource,
    entry: OplogEntry,
) -> JoinHandle<DdlResult<()>> {
    let coordinator = coordinator.clone();
    let lock = lock.clone();
    let replica_set = source.replica_set.clone();

    tokio::spawn(async move {
        let guard = lock.read().await;
        let _guard = coordinator.block_on_ddl(&replica_set, &entry, guard).await?;
        Ok(())
    })
}

/// Yields until `count` DDL entries are pending.
pub async fn wait_for_pending(coordinator: &DdlCoordinator, count: usize) {
    while coordinator.pending_count() != count {
        tokio::task::yield_now().await;
    }
}

/// Yields long enough for spawned tasks to reach their next suspension point.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub const THRESHOLD: Duration = Duration::from_millis(60_000);
