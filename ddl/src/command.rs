//! Classification of captured DDL entries.
//!
//! Both the elimination loop and the transformer branch on the same grouping of command names.
//! The grouping is computed once here as a [`DdlKind`] and matched by both.

use std::fmt;

use crate::types::{Document, OplogEntry, command_name, is_index_bookkeeping_namespace};

/// DDL command recognized by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DdlCommand {
    Create,
    CreateIndexes,
    CollMod,
    DeleteIndex,
    DeleteIndexes,
    DropIndex,
    DropIndexes,
    DropDatabase,
    Drop,
    RenameCollection,
    ConvertToCapped,
    EmptyCapped,
    ApplyOps,
}

impl DdlCommand {
    /// Parses a command name as it appears as the first field of the command document.
    pub fn from_name(name: &str) -> Option<DdlCommand> {
        let command = match name {
            "create" => DdlCommand::Create,
            "createIndexes" => DdlCommand::CreateIndexes,
            "collMod" => DdlCommand::CollMod,
            "deleteIndex" => DdlCommand::DeleteIndex,
            "deleteIndexes" => DdlCommand::DeleteIndexes,
            "dropIndex" => DdlCommand::DropIndex,
            "dropIndexes" => DdlCommand::DropIndexes,
            "dropDatabase" => DdlCommand::DropDatabase,
            "drop" => DdlCommand::Drop,
            "renameCollection" => DdlCommand::RenameCollection,
            "convertToCapped" => DdlCommand::ConvertToCapped,
            "emptycapped" => DdlCommand::EmptyCapped,
            "applyOps" => DdlCommand::ApplyOps,
            _ => return None,
        };

        Some(command)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DdlCommand::Create => "create",
            DdlCommand::CreateIndexes => "createIndexes",
            DdlCommand::CollMod => "collMod",
            DdlCommand::DeleteIndex => "deleteIndex",
            DdlCommand::DeleteIndexes => "deleteIndexes",
            DdlCommand::DropIndex => "dropIndex",
            DdlCommand::DropIndexes => "dropIndexes",
            DdlCommand::DropDatabase => "dropDatabase",
            DdlCommand::Drop => "drop",
            DdlCommand::RenameCollection => "renameCollection",
            DdlCommand::ConvertToCapped => "convertToCapped",
            DdlCommand::EmptyCapped => "emptycapped",
            DdlCommand::ApplyOps => "applyOps",
        }
    }
}

impl fmt::Display for DdlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a captured DDL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlKind {
    /// Index definition inserted into `system.indexes`.
    IndexBookkeeping,
    /// Non-destructive change that can be applied as soon as any source reports it.
    Additive(DdlCommand),
    /// Change that discards data and must wait for every source.
    Destructive(DdlCommand),
    /// Change whose multi-shard semantics cannot be replicated safely.
    Unsupported(DdlCommand),
    /// Command name the coordinator does not reason about. Empty when the document has no field.
    Unknown(String),
}

impl DdlKind {
    /// Classifies a captured entry.
    pub fn of(entry: &OplogEntry) -> DdlKind {
        DdlKind::classify(&entry.namespace, &entry.object)
    }

    /// Classifies a DDL given its namespace and command document.
    pub fn classify(namespace: &str, object: &Document) -> DdlKind {
        if is_index_bookkeeping_namespace(namespace) {
            return DdlKind::IndexBookkeeping;
        }

        let name = command_name(object).unwrap_or_default();
        let Some(command) = DdlCommand::from_name(name) else {
            return DdlKind::Unknown(name.to_string());
        };

        match command {
            DdlCommand::Create | DdlCommand::CreateIndexes | DdlCommand::CollMod => {
                DdlKind::Additive(command)
            }
            DdlCommand::DeleteIndex
            | DdlCommand::DeleteIndexes
            | DdlCommand::DropIndex
            | DdlCommand::DropIndexes
            | DdlCommand::DropDatabase
            | DdlCommand::Drop => DdlKind::Destructive(command),
            DdlCommand::RenameCollection
            | DdlCommand::ConvertToCapped
            | DdlCommand::EmptyCapped
            | DdlCommand::ApplyOps => DdlKind::Unsupported(command),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn classify(namespace: &str, value: serde_json::Value) -> DdlKind {
        let serde_json::Value::Object(object) = value else {
            panic!("expected an object");
        };
        DdlKind::classify(namespace, &object)
    }

    #[test]
    fn test_command_names_round_trip() {
        for name in [
            "create",
            "createIndexes",
            "collMod",
            "deleteIndex",
            "deleteIndexes",
            "dropIndex",
            "dropIndexes",
            "dropDatabase",
            "drop",
            "renameCollection",
            "convertToCapped",
            "emptycapped",
            "applyOps",
        ] {
            assert_eq!(DdlCommand::from_name(name).unwrap().as_str(), name);
        }
        assert_eq!(DdlCommand::from_name("emptyCapped"), None);
    }

    #[test]
    fn test_classification_groups() {
        assert_eq!(
            classify("db.$cmd", json!({"create": "coll"})),
            DdlKind::Additive(DdlCommand::Create)
        );
        assert_eq!(
            classify("db.$cmd", json!({"collMod": "coll", "validator": {}})),
            DdlKind::Additive(DdlCommand::CollMod)
        );
        assert_eq!(
            classify("db.$cmd", json!({"dropIndexes": "coll", "index": "a_1"})),
            DdlKind::Destructive(DdlCommand::DropIndexes)
        );
        assert_eq!(
            classify("db.$cmd", json!({"dropDatabase": 1})),
            DdlKind::Destructive(DdlCommand::DropDatabase)
        );
        assert_eq!(
            classify("admin.$cmd", json!({"renameCollection": "db.a", "to": "db.b"})),
            DdlKind::Unsupported(DdlCommand::RenameCollection)
        );
        assert_eq!(
            classify("db.$cmd", json!({"applyOps": []})),
            DdlKind::Unsupported(DdlCommand::ApplyOps)
        );
    }

    #[test]
    fn test_index_bookkeeping_wins_over_command_name() {
        assert_eq!(
            classify("db.system.indexes", json!({"drop": "coll"})),
            DdlKind::IndexBookkeeping
        );
    }

    #[test]
    fn test_unknown_commands() {
        assert_eq!(
            classify("db.$cmd", json!({"dbCheck": "coll"})),
            DdlKind::Unknown("dbCheck".to_string())
        );
        assert_eq!(classify("db.$cmd", json!({})), DdlKind::Unknown(String::new()));
    }
}
