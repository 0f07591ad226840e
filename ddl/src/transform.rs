//! Rewriting of captured DDL entries into the operations the target receives.
//!
//! A source worker runs the transformer once its DDL has been released. Most commands are
//! forwarded unchanged. Two cases need rewriting: index definitions inserted into
//! `system.indexes`, which have no meaning once namespaces are unified at the target, and
//! collection creation against a sharded target, which must also shard the new collection.

use serde_json::Value;
use tracing::info;

use crate::bail;
use crate::command::{DdlCommand, DdlKind};
use crate::error::{DdlResult, ErrorKind};
use crate::types::{
    COMMAND_OPERATION, Document, OplogEntry, ReplicaSetId, ShardCollectionSpec, collection_name,
};

/// Converts one released DDL entry into the ordered operations to apply at the target.
///
/// `shard_spec` is the sharding description of the entry's collection at the source, if any.
/// Operations must be applied in the returned order.
///
/// A `create` against a sharded target yields `enableSharding` followed by `shardCollection` only
/// when `shard_spec` is known. Without one there is no shard key to use, and the `create` is
/// returned unchanged as a single operation.
pub fn transform_ddl(
    replica_set: &ReplicaSetId,
    entry: &OplogEntry,
    shard_spec: Option<&ShardCollectionSpec>,
    target_is_sharded: bool,
) -> DdlResult<Vec<OplogEntry>> {
    match DdlKind::of(entry) {
        DdlKind::IndexBookkeeping => {
            let create_indexes = index_definition_to_create_indexes(replica_set, entry, shard_spec)?;
            Ok(vec![create_indexes])
        }
        DdlKind::Additive(DdlCommand::Create) if target_is_sharded => match shard_spec {
            Some(shard_spec) => {
                let operations = create_sharded_collection(entry, shard_spec);
                info!(
                    replica_set = %replica_set,
                    namespace = %entry.namespace,
                    shard_collection = %shard_spec.ns,
                    "transformed collection creation into enableSharding and shardCollection"
                );
                Ok(operations)
            }
            None => Ok(vec![entry.clone()]),
        },
        DdlKind::Additive(_) | DdlKind::Destructive(_) => Ok(vec![entry.clone()]),
        DdlKind::Unsupported(command) => bail!(
            ErrorKind::IllegalDdl,
            "DDL cannot be replicated across shards",
            format!(
                "replica set {replica_set}, command {command}, namespace {}, entry {:?}",
                entry.namespace, entry.object
            )
        ),
        DdlKind::Unknown(name) => bail!(
            ErrorKind::UnsupportedDdl,
            "DDL has no known transformation",
            format!(
                "replica set {replica_set}, command `{name}`, namespace {}, entry {:?}",
                entry.namespace, entry.object
            )
        ),
    }
}

/// Rewrites an index definition inserted into `system.indexes` as a `createIndexes` command.
///
/// The command is addressed at the sharded collection when a shard spec is known, otherwise at the
/// collection named by the definition's `ns` field. Every field of the definition is kept.
fn index_definition_to_create_indexes(
    replica_set: &ReplicaSetId,
    entry: &OplogEntry,
    shard_spec: Option<&ShardCollectionSpec>,
) -> DdlResult<OplogEntry> {
    let namespace = match (shard_spec, entry.object.get("ns")) {
        (Some(shard_spec), _) => shard_spec.ns.clone(),
        (None, Some(Value::String(ns))) => ns.clone(),
        _ => bail!(
            ErrorKind::InvalidData,
            "Index definition does not name its collection",
            format!(
                "replica set {replica_set}, namespace {}, entry {:?}",
                entry.namespace, entry.object
            )
        ),
    };

    let mut object = Document::new();
    object.insert(
        DdlCommand::CreateIndexes.as_str().to_string(),
        Value::String(collection_name(&namespace).to_string()),
    );
    for (field, value) in &entry.object {
        object.insert(field.clone(), value.clone());
    }

    info!(
        replica_set = %replica_set,
        namespace = %namespace,
        "transformed index definition into createIndexes"
    );

    Ok(OplogEntry {
        timestamp: entry.timestamp,
        operation: COMMAND_OPERATION.to_string(),
        gid: entry.gid.clone(),
        namespace,
        object,
    })
}

/// Builds `enableSharding` on the owning database followed by `shardCollection`.
fn create_sharded_collection(
    entry: &OplogEntry,
    shard_spec: &ShardCollectionSpec,
) -> Vec<OplogEntry> {
    let mut enable_sharding = Document::new();
    enable_sharding.insert(
        "enableSharding".to_string(),
        Value::String(entry.database().to_string()),
    );

    let mut shard_collection = Document::new();
    shard_collection.insert(
        "shardCollection".to_string(),
        Value::String(shard_spec.ns.clone()),
    );
    shard_collection.insert("key".to_string(), shard_spec.key_value());
    shard_collection.insert("unique".to_string(), Value::Bool(shard_spec.unique));

    vec![
        entry.with_object(enable_sharding),
        entry.with_object(shard_collection),
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::OplogTimestamp;

    fn document(value: Value) -> Document {
        let Value::Object(object) = value else {
            panic!("expected an object");
        };
        object
    }

    fn shard_spec() -> ShardCollectionSpec {
        ShardCollectionSpec::new("db.coll", document(json!({"user_id": "hashed"})), false)
    }

    fn rs() -> ReplicaSetId {
        ReplicaSetId::new("rs1")
    }

    #[test]
    fn test_create_against_sharded_target() {
        let entry = OplogEntry::command(
            OplogTimestamp::new(10, 1),
            "db.$cmd",
            document(json!({"create": "coll"})),
        );

        let operations = transform_ddl(&rs(), &entry, Some(&shard_spec()), true).unwrap();

        assert_eq!(operations.len(), 2);
        assert_eq!(operations[0].command_name(), Some("enableSharding"));
        assert_eq!(operations[0].object["enableSharding"], json!("db"));
        assert_eq!(operations[1].command_name(), Some("shardCollection"));
        assert_eq!(operations[1].object["shardCollection"], json!("db.coll"));
        assert_eq!(operations[1].object["key"], json!({"user_id": "hashed"}));
        assert_eq!(operations[1].object["unique"], json!(false));
        for operation in &operations {
            assert_eq!(operation.timestamp, entry.timestamp);
            assert_eq!(operation.namespace, entry.namespace);
            assert_eq!(operation.operation, COMMAND_OPERATION);
        }
    }

    #[test]
    fn test_create_against_unsharded_target_passes_through() {
        let entry = OplogEntry::command(
            OplogTimestamp::new(10, 1),
            "db.$cmd",
            document(json!({"create": "coll", "capped": false})),
        );

        let operations = transform_ddl(&rs(), &entry, Some(&shard_spec()), false).unwrap();
        assert_eq!(operations, vec![entry]);
    }

    #[test]
    fn test_create_of_unsharded_collection_passes_through() {
        let entry = OplogEntry::command(
            OplogTimestamp::new(10, 1),
            "db.$cmd",
            document(json!({"create": "coll"})),
        );

        let operations = transform_ddl(&rs(), &entry, None, true).unwrap();
        assert_eq!(operations, vec![entry]);
    }

    #[test]
    fn test_pass_through_commands() {
        for body in [
            json!({"createIndexes": "coll", "indexes": [{"key": {"a": 1}, "name": "a_1"}]}),
            json!({"dropDatabase": 1}),
            json!({"collMod": "coll", "validator": {}}),
            json!({"drop": "coll"}),
            json!({"deleteIndex": "coll", "index": "a_1"}),
            json!({"deleteIndexes": "coll", "index": "*"}),
            json!({"dropIndex": "coll", "index": "a_1"}),
            json!({"dropIndexes": "coll", "index": "a_1"}),
        ] {
            let entry = OplogEntry::command(OplogTimestamp::new(3, 0), "db.$cmd", document(body));
            let operations = transform_ddl(&rs(), &entry, Some(&shard_spec()), true).unwrap();
            assert_eq!(operations, vec![entry]);
        }
    }

    #[test]
    fn test_index_definition_becomes_create_indexes() {
        let entry = OplogEntry::insert(
            OplogTimestamp::new(7, 2),
            "db.system.indexes",
            document(json!({"ns": "db.coll", "key": {"a": 1}, "name": "a_1"})),
        );

        for spec in [None, Some(shard_spec())] {
            let operations = transform_ddl(&rs(), &entry, spec.as_ref(), true).unwrap();

            assert_eq!(operations.len(), 1);
            let operation = &operations[0];
            assert_eq!(operation.namespace, "db.coll");
            assert_eq!(operation.operation, COMMAND_OPERATION);
            assert_eq!(operation.timestamp, entry.timestamp);
            assert_eq!(
                operation.object.keys().collect::<Vec<_>>(),
                vec!["createIndexes", "ns", "key", "name"]
            );
            assert_eq!(operation.object["createIndexes"], json!("coll"));
            assert_eq!(operation.object["key"], json!({"a": 1}));
        }
    }

    #[test]
    fn test_index_definition_without_collection_is_invalid() {
        let entry = OplogEntry::insert(
            OplogTimestamp::new(7, 2),
            "db.system.indexes",
            document(json!({"key": {"a": 1}})),
        );

        let err = transform_ddl(&rs(), &entry, None, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_unsupported_commands_are_illegal() {
        for body in [
            json!({"renameCollection": "db.a", "to": "db.b"}),
            json!({"convertToCapped": "coll", "size": 1024}),
            json!({"emptycapped": "coll"}),
            json!({"applyOps": []}),
        ] {
            let entry = OplogEntry::command(OplogTimestamp::new(3, 0), "db.$cmd", document(body));
            let err = transform_ddl(&rs(), &entry, None, false).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::IllegalDdl);
            assert!(err.detail().unwrap().contains("replica set rs1"));
        }
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let entry = OplogEntry::command(
            OplogTimestamp::new(3, 0),
            "db.$cmd",
            document(json!({"dbCheck": "coll"})),
        );

        let err = transform_ddl(&rs(), &entry, None, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedDdl);
    }
}
