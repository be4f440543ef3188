//! Polling pool: repeatedly invokes [`Worker::run_once`] until shutdown.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::Worker;

/// Configuration for the polling pool.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Number of concurrent workers sharing the storage backend.
    pub concurrency: usize,
    /// Sleep between polls when there is nothing to do, and after a
    /// storage error.
    pub poll_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Drives `concurrency` workers in a loop until [`Runner::shutdown`].
#[derive(Debug, Clone)]
pub struct Runner {
    worker: Worker,
    config: RunnerConfig,
    shutdown: watch::Sender<bool>,
}

impl Runner {
    pub fn new(worker: Worker, config: RunnerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            worker,
            config,
            shutdown,
        }
    }

    /// Signal every worker loop to stop after its current job.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Run until shutdown. Returns once every worker loop has exited.
    pub async fn run(&self) {
        let concurrency = self.config.concurrency.max(1);
        info!(
            queue = %self.worker.context().queue,
            concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "workers started"
        );

        let mut tasks = JoinSet::new();
        for slot in 0..concurrency {
            let worker = self.worker.clone();
            let poll_interval = self.config.poll_interval;
            let shutdown = self.shutdown.subscribe();
            tasks.spawn(worker_loop(slot, worker, poll_interval, shutdown));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("worker task ended abnormally: {e}");
            }
        }
        info!(queue = %self.worker.context().queue, "workers stopped");
    }
}

async fn worker_loop(
    slot: usize,
    worker: Worker,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        let busy = match worker.run_once().await {
            Ok(outcome) => outcome.made_progress(),
            Err(e) => {
                error!(slot, "worker invocation failed: {e}");
                false
            }
        };
        if busy {
            continue;
        }

        tokio::select! {
            _ = shutdown.changed() => {}
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}
