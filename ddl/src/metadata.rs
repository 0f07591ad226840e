//! Access to the sharding metadata of the source cluster.

use std::fmt;

use async_trait::async_trait;

use crate::error::DdlResult;
use crate::types::ShardCollectionSpec;

/// Looks up whether a collection of a sharded source is itself sharded.
///
/// Only deployments that replicate from a sharded source provide an implementation, usually backed
/// by the config servers of that cluster. Lookups run from the elimination loop, off the streaming
/// path, so implementations may perform network round trips.
#[async_trait]
pub trait ShardMetadata: Send + Sync + fmt::Debug {
    /// Returns the sharding description of `namespace`, or `None` when it is not sharded.
    async fn shard_collection_spec(
        &self,
        namespace: &str,
    ) -> DdlResult<Option<ShardCollectionSpec>>;

    /// Returns whether any collection of `database` is sharded.
    ///
    /// Database-wide commands such as `dropDatabase` have no collection to look up.
    async fn has_sharded_collections(&self, database: &str) -> DdlResult<bool>;
}
