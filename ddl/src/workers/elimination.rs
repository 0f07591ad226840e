//! Periodic worker driving the elimination loop.
//!
//! The worker ticks every `check_interval_ms` and runs one elimination pass per tick. Runs never
//! overlap: a pass that outlasts the interval delays the next tick instead of piling up.

use std::sync::Arc;

use metrics::gauge;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::coordinator::DdlCoordinator;
use crate::ddl_error;
use crate::eliminate::EliminationOutcome;
use crate::error::{DdlResult, ErrorKind};
use crate::metrics::DDL_PENDING;

/// Handle to a running elimination worker.
#[derive(Debug)]
pub struct EliminationWorkerHandle {
    outcome_rx: watch::Receiver<Option<EliminationOutcome>>,
    join_handle: JoinHandle<DdlResult<()>>,
}

impl EliminationWorkerHandle {
    /// Outcome of the latest elimination run, `None` before the first run.
    pub fn last_outcome(&self) -> Option<EliminationOutcome> {
        self.outcome_rx.borrow().clone()
    }

    /// Subscribes to the outcome of every subsequent run.
    pub fn subscribe(&self) -> watch::Receiver<Option<EliminationOutcome>> {
        self.outcome_rx.clone()
    }

    /// Waits for the worker to complete.
    ///
    /// Returns `Ok(())` after a shutdown, or the fatal error that stopped the worker.
    pub async fn wait(self) -> DdlResult<()> {
        match self.join_handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "elimination worker task panicked");
                Err(ddl_error!(
                    ErrorKind::EliminationWorkerPanic,
                    "Elimination worker panicked",
                    err.to_string()
                ))
            }
        }
    }
}

/// Worker releasing pending DDL entries on a fixed interval.
#[derive(Debug)]
pub struct EliminationWorker {
    coordinator: Arc<DdlCoordinator>,
    shutdown_rx: ShutdownRx,
    outcome_tx: watch::Sender<Option<EliminationOutcome>>,
}

impl EliminationWorker {
    pub fn new(coordinator: Arc<DdlCoordinator>, shutdown_rx: ShutdownRx) -> Self {
        let (outcome_tx, _) = watch::channel(None);

        Self {
            coordinator,
            shutdown_rx,
            outcome_tx,
        }
    }

    /// Starts the worker in a background task.
    pub fn start(self) -> EliminationWorkerHandle {
        let outcome_rx = self.outcome_tx.subscribe();
        let join_handle = tokio::spawn(self.run());

        EliminationWorkerHandle {
            outcome_rx,
            join_handle,
        }
    }

    async fn run(mut self) -> DdlResult<()> {
        let check_interval = self.coordinator.config().check_interval();
        info!(
            check_interval_ms = check_interval.as_millis() as u64,
            "starting elimination worker"
        );

        let mut ticker = interval(check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    info!("elimination worker stopped due to shutdown");

                    return Ok(());
                }

                _ = ticker.tick() => {
                    self.run_once().await?;
                }
            }
        }
    }

    async fn run_once(&self) -> DdlResult<()> {
        match self.coordinator.eliminate_once().await {
            Ok(outcome) => {
                debug!(outcome = ?outcome, "elimination run completed");
                gauge!(DDL_PENDING).set(self.coordinator.pending_count() as f64);
                self.outcome_tx.send_replace(Some(outcome));

                Ok(())
            }
            // The metadata service may be briefly unreachable, the entry stays pending until the
            // next tick.
            Err(err) if err.kind() == ErrorKind::ShardMetadataQueryFailed => {
                warn!(error = %err, "could not classify pending ddl, retrying on next tick");

                Ok(())
            }
            Err(err) => {
                error!(error = %err, "elimination worker stopped on fatal error");

                Err(err)
            }
        }
    }
}
