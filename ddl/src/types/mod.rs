//! Common types used throughout the DDL coordinator.
//!
//! Re-exports the oplog entry model, namespace helpers, source identifiers and the sharding
//! description fetched from source cluster metadata.

mod namespace;
mod oplog;
mod replica_set;
mod shard;

pub use namespace::*;
pub use oplog::*;
pub use replica_set::*;
pub use shard::*;
