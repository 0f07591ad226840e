use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Document;

/// Sharding description of a collection, as stored in the source cluster metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardCollectionSpec {
    /// Fully qualified namespace (`db.collection`) of the sharded collection.
    pub ns: String,
    /// Shard key document, for example `{"user_id": "hashed"}`.
    pub key: Document,
    /// Whether the shard key is enforced as unique.
    pub unique: bool,
}

impl ShardCollectionSpec {
    pub fn new(ns: impl Into<String>, key: Document, unique: bool) -> Self {
        Self {
            ns: ns.into(),
            key,
            unique,
        }
    }

    /// Returns the shard key as a JSON value suitable for a `shardCollection` command.
    pub fn key_value(&self) -> Value {
        Value::Object(self.key.clone())
    }
}
