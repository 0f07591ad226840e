//! Configuration for the oplog DDL coordinator.
//!
//! Holds the shared configuration structures and the hierarchical loader used by binaries that
//! embed the coordinator.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
