//! Background service that periodically sweeps expired videos.
//!
//! Each run executes in its own task, so a panic inside one run is logged
//! and the next tick proceeds normally.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use vgen_media::{ExpirySweeper, SweepReport};

/// Expiry sweeper ticker.
pub struct ExpirySweeperService {
    sweeper: Arc<ExpirySweeper>,
    interval: Duration,
}

impl ExpirySweeperService {
    pub fn new(sweeper: ExpirySweeper) -> Self {
        let interval = sweeper.config().interval;
        Self {
            sweeper: Arc::new(sweeper),
            interval,
        }
    }

    /// Spawn the loop. Abort the handle to stop it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Start the background sweep loop.
    ///
    /// This function runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        info!("Starting expiry sweeper (interval: {:?})", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            match self.run_cycle().await {
                Ok(Some(report)) => debug!(deleted = report.deleted(), "Sweep cycle finished"),
                Ok(None) => {}
                Err(e) => error!("Expiry sweep error: {:#}", e),
            }
        }
    }

    /// Run a single sweep in an isolated task.
    pub async fn run_cycle(&self) -> anyhow::Result<Option<SweepReport>> {
        let sweeper = Arc::clone(&self.sweeper);
        tokio::spawn(async move { sweeper.run_once().await })
            .await
            .context("sweep task did not complete")
    }
}
