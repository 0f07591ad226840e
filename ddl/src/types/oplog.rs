use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{
    ADMIN_DATABASE, database_name, is_command_namespace, is_index_bookkeeping_namespace,
};

/// Ordered document carried by oplog entries.
///
/// Field order is significant: the first field of a command document names the command, and two
/// reports of the same DDL are only recognized as such when their serialized bodies are identical.
pub type Document = Map<String, Value>;

/// Operation type of command entries (DDL).
pub const COMMAND_OPERATION: &str = "c";

/// Operation type of insert entries.
pub const INSERT_OPERATION: &str = "i";

/// Position of an entry in a replica set oplog.
///
/// Encodes seconds since the epoch in the high 32 bits and an ordinal within that second in the
/// low 32 bits, so the natural integer order is the oplog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OplogTimestamp(u64);

impl OplogTimestamp {
    pub const MIN: OplogTimestamp = OplogTimestamp(0);

    pub fn new(seconds: u32, increment: u32) -> Self {
        Self(((seconds as u64) << 32) | increment as u64)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn into_raw(self) -> u64 {
        self.0
    }

    pub fn seconds(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn increment(&self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for OplogTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}, {})", self.seconds(), self.increment())
    }
}

/// Captured oplog entry.
///
/// Only the fields the DDL path needs are modeled. Field names follow the oplog wire names when
/// (de)serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OplogEntry {
    #[serde(rename = "ts")]
    pub timestamp: OplogTimestamp,
    #[serde(rename = "op")]
    pub operation: String,
    #[serde(rename = "g", default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<String>,
    #[serde(rename = "ns")]
    pub namespace: String,
    #[serde(rename = "o")]
    pub object: Document,
}

impl OplogEntry {
    /// Creates a command entry on `namespace`.
    pub fn command(timestamp: OplogTimestamp, namespace: impl Into<String>, object: Document) -> Self {
        Self {
            timestamp,
            operation: COMMAND_OPERATION.to_string(),
            gid: None,
            namespace: namespace.into(),
            object,
        }
    }

    /// Creates an insert entry on `namespace`.
    pub fn insert(timestamp: OplogTimestamp, namespace: impl Into<String>, object: Document) -> Self {
        Self {
            timestamp,
            operation: INSERT_OPERATION.to_string(),
            gid: None,
            namespace: namespace.into(),
            object,
        }
    }

    /// Returns a copy of this entry carrying `object` instead of the original document.
    pub fn with_object(&self, object: Document) -> Self {
        Self {
            timestamp: self.timestamp,
            operation: self.operation.clone(),
            gid: self.gid.clone(),
            namespace: self.namespace.clone(),
            object,
        }
    }

    /// Returns the command name of this entry, which is the first field of its document.
    pub fn command_name(&self) -> Option<&str> {
        command_name(&self.object)
    }

    /// Returns `true` if this entry is an index definition inserted into `system.indexes`.
    pub fn is_index_bookkeeping(&self) -> bool {
        is_index_bookkeeping_namespace(&self.namespace)
    }

    /// Returns the database this entry belongs to.
    pub fn database(&self) -> &str {
        database_name(&self.namespace)
    }

    /// Resolves the collection namespace this entry acts on.
    ///
    /// Index definitions carry their collection in the `ns` field. Commands on `db.$cmd` name
    /// their collection in the command value, except commands on `admin.$cmd` such as
    /// `renameCollection`, whose value is already a full namespace. Anything else acts on its own
    /// namespace.
    pub fn target_namespace(&self) -> String {
        if self.is_index_bookkeeping() {
            if let Some(Value::String(ns)) = self.object.get("ns") {
                return ns.clone();
            }
        } else if is_command_namespace(&self.namespace) {
            if let Some((_, Value::String(collection))) = self.object.iter().next() {
                if self.database() == ADMIN_DATABASE && collection.contains('.') {
                    return collection.clone();
                }
                return format!("{}.{collection}", self.database());
            }
        }

        self.namespace.clone()
    }
}

/// Returns the command name of a command document.
pub fn command_name(object: &Document) -> Option<&str> {
    object.keys().next().map(String::as_str)
}
