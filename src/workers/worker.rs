//! Polling loop for a single job type.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{CompleteJobHandler, JobHandler, WorkerError};
use crate::clients::WorkflowEngine;
use crate::config::WorkflowConfig;
use crate::types::ActivatedJob;

/// Counters reported when a worker stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub polls: u64,
    pub completed: u64,
    pub failed: u64,
    pub errors: u64,
}

/// Polls the engine for one job type and resolves each activated job.
pub struct JobWorker {
    engine: Arc<dyn WorkflowEngine>,
    handler: Arc<dyn JobHandler>,
    job_type: String,
    worker_name: String,
    poll_interval: Duration,
    job_timeout: Duration,
    max_jobs: u32,
}

impl JobWorker {
    pub fn new(
        engine: Arc<dyn WorkflowEngine>,
        handler: Arc<dyn JobHandler>,
        job_type: impl Into<String>,
        config: &WorkflowConfig,
    ) -> Self {
        Self {
            engine,
            handler,
            job_type: job_type.into(),
            worker_name: config.worker_name.clone(),
            poll_interval: config.poll_interval(),
            job_timeout: config.job_timeout(),
            max_jobs: config.max_jobs.max(1),
        }
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    /// Poll until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// A full batch is followed immediately by another poll; otherwise the
    /// worker waits `poll_interval` between polls.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        info!(job_type = %self.job_type, worker = %self.worker_name, "Job worker started");

        while !*shutdown.borrow() {
            stats.polls += 1;
            let full_batch = match self.poll_once(&mut stats).await {
                Ok(activated) => activated >= self.max_jobs as usize,
                Err(e) => {
                    stats.errors += 1;
                    warn!(job_type = %self.job_type, error = %e, "Failed to activate jobs");
                    false
                }
            };
            if full_batch {
                continue;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(job_type = %self.job_type, ?stats, "Job worker stopped");
        stats
    }

    /// Activate one batch and resolve every job in it.
    ///
    /// Returns the number of jobs activated. Failures to report a single
    /// job's result are logged and counted; they do not abort the batch.
    pub async fn poll_once(&self, stats: &mut WorkerStats) -> Result<usize, WorkerError> {
        let jobs = self
            .engine
            .activate_jobs(
                &self.job_type,
                &self.worker_name,
                self.job_timeout,
                self.max_jobs,
            )
            .await?;

        let activated = jobs.len();
        if activated > 0 {
            debug!(job_type = %self.job_type, count = activated, "Activated jobs");
        }

        for job in jobs {
            match self.resolve(&job).await {
                Ok(true) => stats.completed += 1,
                Ok(false) => stats.failed += 1,
                Err(e) => {
                    stats.errors += 1;
                    warn!(job_key = %job.job_key, error = %e, "Failed to report job result");
                }
            }
        }
        Ok(activated)
    }

    /// Run the handler and report the outcome. `Ok(true)` means completed.
    async fn resolve(&self, job: &ActivatedJob) -> Result<bool, WorkerError> {
        match self.handler.handle(job).await {
            Ok(variables) => {
                self.engine.complete_job(&job.job_key, variables).await?;
                Ok(true)
            }
            Err(e) => {
                let retries = (job.retries - 1).max(0);
                warn!(
                    job_type = %job.job_type,
                    job_key = %job.job_key,
                    retries,
                    error = %e,
                    "Job handler failed"
                );
                self.engine
                    .fail_job(&job.job_key, retries, &e.to_string())
                    .await?;
                Ok(false)
            }
        }
    }
}

/// Spawn a `CompleteJobHandler` worker for every configured job type.
pub fn spawn_workers(
    engine: Arc<dyn WorkflowEngine>,
    config: &WorkflowConfig,
    shutdown: watch::Receiver<bool>,
) -> JoinSet<WorkerStats> {
    let handler: Arc<dyn JobHandler> = Arc::new(CompleteJobHandler);
    let mut workers = JoinSet::new();
    for job_type in &config.job_types {
        let worker = JobWorker::new(engine.clone(), handler.clone(), job_type.as_str(), config);
        workers.spawn(worker.run(shutdown.clone()));
    }
    workers
}
