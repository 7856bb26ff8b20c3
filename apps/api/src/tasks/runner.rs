//! Task Runner — the worker pool and the stale-lease sweeper.
//!
//! This is the only place that decides retry versus terminal failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::PipelineError;
use crate::models::work_item::WorkItem;
use crate::tasks::executor::{Outcome, WorkExecutor};
use crate::tasks::queue::{backoff_delay, RecoveryReport, WorkQueue};
use crate::tasks::signal::QueueSignal;

const BACKOFF_BASE: Duration = Duration::from_secs(2);
const BACKOFF_CAP: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub worker_count: usize,
    pub max_attempts: i32,
    pub lease: Duration,
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_attempts: 5,
            lease: Duration::from_secs(120),
            poll_interval: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// What happened to one claimed item.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Succeeded,
    Discarded,
    Retrying { delay: Duration },
    Failed,
}

pub struct TaskRunner {
    queue: Arc<dyn WorkQueue>,
    executor: Arc<dyn WorkExecutor>,
    signal: Arc<dyn QueueSignal>,
    config: RunnerConfig,
}

impl TaskRunner {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        executor: Arc<dyn WorkExecutor>,
        signal: Arc<dyn QueueSignal>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            queue,
            executor,
            signal,
            config,
        }
    }

    /// Spawns `worker_count` workers plus the sweeper. All stop once `shutdown` flips to true.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            "Starting {} workers (lease {:?}, max attempts {})",
            self.config.worker_count, self.config.lease, self.config.max_attempts
        );

        let mut handles: Vec<JoinHandle<()>> = (0..self.config.worker_count)
            .map(|n| {
                let runner = self.clone();
                let shutdown = shutdown.clone();
                let worker_id = format!("worker-{}-{n}", std::process::id());
                tokio::spawn(async move { runner.worker_loop(worker_id, shutdown).await })
            })
            .collect();

        let runner = self.clone();
        handles.push(tokio::spawn(async move { runner.sweep_loop(shutdown).await }));
        handles
    }

    async fn worker_loop(&self, worker_id: String, mut shutdown: watch::Receiver<bool>) {
        debug!("{worker_id} started");
        while !*shutdown.borrow() {
            match self.run_once(&worker_id).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!("{worker_id} could not claim work: {e}"),
            }

            tokio::select! {
                _ = self.signal.wait(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        debug!("{worker_id} stopped");
    }

    async fn sweep_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!("Stale work sweep failed: {e}");
                    }
                }
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }
    }

    pub async fn sweep(&self) -> Result<RecoveryReport, PipelineError> {
        let report = self.queue.recover_stale(self.config.max_attempts).await?;
        if report.requeued > 0 {
            self.signal.notify().await;
        }
        Ok(report)
    }

    /// Claims and processes at most one item.
    pub async fn run_once(&self, worker_id: &str) -> Result<Option<Disposition>, PipelineError> {
        let Some(item) = self.queue.claim(worker_id, self.config.lease).await? else {
            return Ok(None);
        };
        Ok(Some(self.process(worker_id, item).await))
    }

    #[instrument(skip(self, item), fields(item_id = %item.id, kind = %item.kind, target = %item.target_id, attempt = item.attempts))]
    async fn process(&self, worker_id: &str, item: WorkItem) -> Disposition {
        let outcome = self.execute_with_heartbeat(worker_id, &item).await;

        let (disposition, recorded) = match outcome {
            Ok(Outcome::Completed) => {
                info!("Work item succeeded");
                (Disposition::Succeeded, self.queue.complete(item.id, worker_id).await)
            }
            Ok(Outcome::Discarded(reason)) => {
                info!("Work item discarded: {reason}");
                (Disposition::Discarded, self.queue.complete(item.id, worker_id).await)
            }
            Err(e) if e.is_retryable() && item.attempts < self.config.max_attempts => {
                let delay = backoff_delay(item.attempts, BACKOFF_BASE, BACKOFF_CAP);
                warn!("Work item failed, retrying in {delay:?}: {e}");
                let run_after = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                (
                    Disposition::Retrying { delay },
                    self.queue
                        .retry(item.id, worker_id, &e.to_string(), run_after)
                        .await,
                )
            }
            Err(e) => {
                error!("Work item failed permanently: {e}");
                (
                    Disposition::Failed,
                    self.queue.fail(item.id, worker_id, &e.to_string()).await,
                )
            }
        };

        match recorded {
            Ok(true) => {}
            Ok(false) => warn!("Lease on work item was lost before its result was recorded"),
            Err(e) => error!("Could not record work item result: {e}"),
        }
        disposition
    }

    /// Runs the executor while extending the lease every third of its length.
    async fn execute_with_heartbeat(
        &self,
        worker_id: &str,
        item: &WorkItem,
    ) -> Result<Outcome, PipelineError> {
        let execution = self.executor.execute(item);
        tokio::pin!(execution);

        let mut heartbeat = tokio::time::interval(self.config.lease / 3);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                outcome = &mut execution => return outcome,
                _ = heartbeat.tick() => {
                    match self.queue.heartbeat(item.id, worker_id, self.config.lease).await {
                        Ok(true) => debug!("Lease extended"),
                        Ok(false) => warn!("Lease lost while executing; result may be discarded"),
                        Err(e) => warn!("Heartbeat failed: {e}"),
                    }
                }
            }
        }
    }
}
