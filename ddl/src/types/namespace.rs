/// Collection name that receives index definitions inserted by legacy drivers.
pub const SYSTEM_INDEXES_COLLECTION: &str = "system.indexes";

/// Pseudo collection addressed by database commands in the oplog.
pub const COMMAND_COLLECTION: &str = "$cmd";

/// Database hosting cluster-wide commands.
pub const ADMIN_DATABASE: &str = "admin";

/// Splits a namespace into its database and collection parts.
///
/// Only the first dot separates the two, since collection names may contain dots
/// (`db.system.indexes` is collection `system.indexes` in database `db`). A namespace without a
/// dot yields an empty collection.
pub fn split_namespace(namespace: &str) -> (&str, &str) {
    namespace.split_once('.').unwrap_or((namespace, ""))
}

/// Returns the database part of a namespace.
pub fn database_name(namespace: &str) -> &str {
    split_namespace(namespace).0
}

/// Returns the collection part of a namespace.
pub fn collection_name(namespace: &str) -> &str {
    split_namespace(namespace).1
}

/// Returns `true` if the namespace is the index bookkeeping collection of a database.
pub fn is_index_bookkeeping_namespace(namespace: &str) -> bool {
    namespace.ends_with(SYSTEM_INDEXES_COLLECTION)
}

/// Returns `true` if the namespace addresses the command pseudo collection of a database.
pub fn is_command_namespace(namespace: &str) -> bool {
    collection_name(namespace) == COMMAND_COLLECTION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_namespace() {
        assert_eq!(split_namespace("db.coll"), ("db", "coll"));
        assert_eq!(split_namespace("db.system.indexes"), ("db", "system.indexes"));
        assert_eq!(split_namespace("db"), ("db", ""));
    }

    #[test]
    fn test_namespace_kinds() {
        assert!(is_index_bookkeeping_namespace("db.system.indexes"));
        assert!(!is_index_bookkeeping_namespace("db.coll"));
        assert!(is_command_namespace("db.$cmd"));
        assert!(!is_command_namespace("db.coll"));
        assert_eq!(database_name("shop.orders"), "shop");
        assert_eq!(collection_name("shop.orders"), "orders");
    }
}
