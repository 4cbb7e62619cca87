//! Job worker step definitions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cucumber::{given, then, when, World};
use serde_json::{Map, Value};

use interchange_bridge::clients::mock::{JobResolution, MockWorkflowEngine};
use interchange_bridge::config::WorkflowConfig;
use interchange_bridge::types::ActivatedJob;
use interchange_bridge::workers::{
    CompleteJobHandler, JobHandler, JobWorker, WorkerError, WorkerStats,
};

struct FailingHandler;

#[async_trait]
impl JobHandler for FailingHandler {
    async fn handle(&self, _job: &ActivatedJob) -> Result<Map<String, Value>, WorkerError> {
        Err(WorkerError::Handler("order book unavailable".to_string()))
    }
}

/// Test context for job worker scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct JobWorkerWorld {
    engine: Arc<MockWorkflowEngine>,
    worker: Option<JobWorker>,
    stats: WorkerStats,
}

impl fmt::Debug for JobWorkerWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobWorkerWorld")
            .field("job_type", &self.worker.as_ref().map(|w| w.job_type().to_string()))
            .field("stats", &self.stats)
            .finish()
    }
}

impl JobWorkerWorld {
    fn new() -> Self {
        Self {
            engine: Arc::new(MockWorkflowEngine::new()),
            worker: None,
            stats: WorkerStats::default(),
        }
    }

    async fn resolution(&self, key: &str) -> JobResolution {
        self.engine
            .resolutions()
            .await
            .into_iter()
            .find(|r| match r {
                JobResolution::Completed { job_key, .. } => job_key == key,
                JobResolution::Failed { job_key, .. } => job_key == key,
            })
            .unwrap_or_else(|| panic!("Job {} was not resolved", key))
    }
}

// --- Given steps ---

#[given(expr = "a worker for job type {string}")]
async fn given_worker(world: &mut JobWorkerWorld, job_type: String) {
    world.worker = Some(JobWorker::new(
        world.engine.clone(),
        Arc::new(CompleteJobHandler),
        job_type,
        &WorkflowConfig::default(),
    ));
}

#[given(expr = "a failing worker for job type {string}")]
async fn given_failing_worker(world: &mut JobWorkerWorld, job_type: String) {
    world.worker = Some(JobWorker::new(
        world.engine.clone(),
        Arc::new(FailingHandler),
        job_type,
        &WorkflowConfig::default(),
    ));
}

#[given(expr = "the engine has job {string} of type {string} with {int} retries")]
async fn given_job(world: &mut JobWorkerWorld, key: String, job_type: String, retries: i32) {
    world
        .engine
        .push_job(ActivatedJob {
            job_key: key,
            job_type,
            retries,
            ..Default::default()
        })
        .await;
}

// --- When steps ---

#[when("the worker polls once")]
async fn when_poll(world: &mut JobWorkerWorld) {
    let worker = world.worker.as_ref().expect("Worker not configured");
    worker
        .poll_once(&mut world.stats)
        .await
        .expect("Poll should succeed");
}

// --- Then steps ---

#[then(expr = "job {string} is completed")]
async fn then_completed(world: &mut JobWorkerWorld, key: String) {
    let resolution = world.resolution(&key).await;
    assert!(
        matches!(resolution, JobResolution::Completed { .. }),
        "Expected completion, got {:?}",
        resolution
    );
}

#[then(expr = "job {string} is failed with {int} retries left")]
async fn then_failed(world: &mut JobWorkerWorld, key: String, left: i32) {
    match world.resolution(&key).await {
        JobResolution::Failed { retries, .. } => assert_eq!(retries, left),
        other => panic!("Expected failure, got {:?}", other),
    }
}

#[then("no job is resolved")]
async fn then_none_resolved(world: &mut JobWorkerWorld) {
    assert!(world.engine.resolutions().await.is_empty());
}
