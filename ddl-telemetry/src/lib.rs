//! Telemetry setup shared by binaries and tests that embed the DDL coordinator.

pub mod tracing;
