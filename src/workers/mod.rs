//! Task-queue workers for the local workflow engine.
//!
//! Each configured job type gets one `JobWorker` that polls the engine,
//! runs a `JobHandler` on every activated job and reports the result back
//! as a completion or a failure.

mod worker;

pub use worker::{spawn_workers, JobWorker, WorkerStats};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use crate::clients::ClientError;
use crate::types::ActivatedJob;

/// Worker errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Workflow engine call failed: {0}")]
    Engine(#[from] ClientError),

    #[error("Job handler failed: {0}")]
    Handler(String),
}

/// Business logic for one job type.
///
/// Returns the variables to merge into the process instance on completion.
/// An error fails the job with one retry fewer.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &ActivatedJob) -> Result<Map<String, Value>, WorkerError>;
}

/// Completes every job without adding variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompleteJobHandler;

#[async_trait]
impl JobHandler for CompleteJobHandler {
    async fn handle(&self, job: &ActivatedJob) -> Result<Map<String, Value>, WorkerError> {
        info!(
            job_type = %job.job_type,
            job_key = %job.job_key,
            process_instance_key = %job.process_instance_key,
            "Completing job"
        );
        Ok(Map::new())
    }
}
