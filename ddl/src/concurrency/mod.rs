//! Concurrency utilities for coordinating source workers with the elimination loop.
//!
//! Source workers block on a DDL until a release signal fires, and the elimination worker runs
//! until a shutdown signal fires. Both are thin wrappers over tokio watch channels so that every
//! receiver observes the same event, including receivers that subscribe after it happened.

pub mod shutdown;
pub mod signal;
