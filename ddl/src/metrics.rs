//! Metrics definitions for DDL coordination monitoring.

/// Label for the replica set reporting a DDL.
pub const REPLICA_SET_LABEL: &str = "replica_set";

/// Label for the reason a DDL was released.
pub const RELEASE_REASON_LABEL: &str = "reason";

/// Counter for DDL entries reported by source workers.
pub const DDL_REPORTS_TOTAL: &str = "ddl_reports_total";

/// Counter for DDL entries released by the elimination loop.
pub const DDL_RELEASES_TOTAL: &str = "ddl_releases_total";

/// Counter for elimination runs that deferred a destructive DDL.
pub const DDL_DEFERRALS_TOTAL: &str = "ddl_deferrals_total";

/// Gauge for the number of DDL entries waiting for release.
pub const DDL_PENDING: &str = "ddl_pending";
