use std::fmt;
use std::sync::Arc;

/// Identifier of a source replica set.
///
/// Cloning is cheap since every source worker and every pending DDL entry holds a copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplicaSetId(Arc<str>);

impl ReplicaSetId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicaSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReplicaSetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ReplicaSetId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}
