//! Background workers of the DDL coordinator.

pub mod elimination;

pub use elimination::{EliminationWorker, EliminationWorkerHandle};
