//! DDL coordination for multi-source oplog replication.
//!
//! Source workers block on every DDL they read and report it to a shared [`coordinator::DdlCoordinator`].
//! A periodic [`workers::EliminationWorker`] releases pending DDL entries one at a time, holding
//! destructive ones back until no other source could still send data they would discard. Released
//! entries are rewritten for the target topology by [`transform::transform_ddl`].

mod macros;

pub mod checkpoint;
pub mod command;
pub mod concurrency;
pub mod coordinator;
pub mod eliminate;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod progress;
pub mod registry;
pub mod transform;
pub mod types;
pub mod workers;
