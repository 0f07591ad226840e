//! Shared configuration types for the DDL coordinator.

mod base;
mod ddl;

pub use base::ValidationError;
pub use ddl::DdlConfig;
