//! Retention sweeper

use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

use crate::repository::{ExecutionRepository, LogStore};
use crate::service::BuildQueue;

/// Periodically drops finished jobs past the retention window and trims
/// execution history, with its stage logs, to its configured size
pub struct Sweeper {
    queue: Arc<BuildQueue>,
    executions: Arc<dyn ExecutionRepository>,
    logs: Arc<LogStore>,
    history_limit: usize,
    interval: Duration,
}

impl Sweeper {
    pub fn new(
        queue: Arc<BuildQueue>,
        executions: Arc<dyn ExecutionRepository>,
        logs: Arc<LogStore>,
        history_limit: usize,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            executions,
            logs,
            history_limit,
            interval,
        }
    }

    pub async fn run(self) {
        info!("Starting retention sweeper (interval: {:?})", self.interval);

        let mut interval = time::interval(self.interval);
        loop {
            interval.tick().await;
            self.sweep_once().await;
        }
    }

    /// One sweep; returns (jobs removed, executions removed)
    pub async fn sweep_once(&self) -> (usize, usize) {
        let jobs = match self.queue.sweep().await {
            Ok(n) => n,
            Err(e) => {
                warn!("Job sweep failed: {}", e);
                0
            }
        };
        let executions = match self.executions.enforce_retention(self.history_limit).await {
            Ok(dropped) => {
                self.logs.remove_stage_logs(&dropped).await;
                dropped.len()
            }
            Err(e) => {
                warn!("Execution retention failed: {}", e);
                0
            }
        };
        debug!("Sweep removed {} jobs and {} executions", jobs, executions);
        (jobs, executions)
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
