//! In-memory client doubles for testing.
//!
//! Each mock records the calls it receives and can be told to fail, so
//! tests can assert on side effects without any network.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{ClientError, LedgerTransactions, MessageRegistry, Result, WorkflowEngine};
use crate::types::{ActivatedJob, CreateInstance, InterchangeMessage, PublishPiis};

/// How a mock call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Retryable transport failure.
    Unavailable,
    /// Non-retryable rejection (HTTP 400).
    Rejected,
}

impl MockFailure {
    fn to_error(self, what: &str) -> ClientError {
        match self {
            MockFailure::Unavailable => ClientError::Unavailable(format!("mock {} failure", what)),
            MockFailure::Rejected => ClientError::Status {
                status: reqwest::StatusCode::BAD_REQUEST,
                body: format!("mock {} rejection", what),
            },
        }
    }
}

/// Mock message registry serving IMs from memory.
#[derive(Default)]
pub struct MockMessageRegistry {
    messages: RwLock<HashMap<String, InterchangeMessage>>,
    failure: RwLock<Option<MockFailure>>,
    lookups: RwLock<Vec<String>>,
}

impl MockMessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, im: InterchangeMessage) {
        self.messages.write().await.insert(im.id.clone(), im);
    }

    pub async fn set_failure(&self, failure: Option<MockFailure>) {
        *self.failure.write().await = failure;
    }

    /// Stored IM, bypassing failure injection and lookup recording.
    pub async fn get_stored(&self, id: &str) -> Option<InterchangeMessage> {
        self.messages.read().await.get(id).cloned()
    }

    pub async fn lookups(&self) -> Vec<String> {
        self.lookups.read().await.clone()
    }
}

#[async_trait]
impl MessageRegistry for MockMessageRegistry {
    async fn get_im(&self, id: &str) -> Result<InterchangeMessage> {
        self.lookups.write().await.push(id.to_string());
        if let Some(failure) = *self.failure.read().await {
            return Err(failure.to_error("registry"));
        }
        self.messages
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(id.to_string()))
    }
}

/// Mock ledger recording submitted transactions.
///
/// Queued failures are consumed one per call before the persistent
/// failure setting is consulted.
#[derive(Default)]
pub struct MockLedger {
    published: RwLock<Vec<PublishPiis>>,
    attempts: RwLock<Vec<PublishPiis>>,
    queued_failures: RwLock<VecDeque<MockFailure>>,
    failure: RwLock<Option<MockFailure>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failure(&self, failure: Option<MockFailure>) {
        *self.failure.write().await = failure;
    }

    /// Fail the next `times` calls with `failure`, then fall back to normal behavior.
    pub async fn fail_next(&self, failure: MockFailure, times: usize) {
        let mut queued = self.queued_failures.write().await;
        for _ in 0..times {
            queued.push_back(failure);
        }
    }

    pub async fn published(&self) -> Vec<PublishPiis> {
        self.published.read().await.clone()
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Every submission attempt, successful or not.
    pub async fn attempts(&self) -> Vec<PublishPiis> {
        self.attempts.read().await.clone()
    }
}

#[async_trait]
impl LedgerTransactions for MockLedger {
    async fn publish_piis(&self, tx: &PublishPiis) -> Result<()> {
        self.attempts.write().await.push(tx.clone());
        if let Some(failure) = self.queued_failures.write().await.pop_front() {
            return Err(failure.to_error("ledger"));
        }
        if let Some(failure) = *self.failure.read().await {
            return Err(failure.to_error("ledger"));
        }
        self.published.write().await.push(tx.clone());
        Ok(())
    }
}

/// A job completion or failure observed by the mock engine.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResolution {
    Completed {
        job_key: String,
        variables: Map<String, Value>,
    },
    Failed {
        job_key: String,
        retries: i32,
        message: String,
    },
}

/// Mock workflow engine with a scriptable job queue.
#[derive(Default)]
pub struct MockWorkflowEngine {
    created: RwLock<Vec<CreateInstance>>,
    jobs: RwLock<HashMap<String, VecDeque<ActivatedJob>>>,
    resolutions: RwLock<Vec<JobResolution>>,
    create_failure: RwLock<Option<MockFailure>>,
    activate_failure: RwLock<Option<MockFailure>>,
}

impl MockWorkflowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_create_failure(&self, failure: Option<MockFailure>) {
        *self.create_failure.write().await = failure;
    }

    pub async fn set_activate_failure(&self, failure: Option<MockFailure>) {
        *self.activate_failure.write().await = failure;
    }

    pub async fn created(&self) -> Vec<CreateInstance> {
        self.created.read().await.clone()
    }

    pub async fn created_count(&self) -> usize {
        self.created.read().await.len()
    }

    /// Queue a job to be handed out by `activate_jobs`.
    pub async fn push_job(&self, job: ActivatedJob) {
        self.jobs
            .write()
            .await
            .entry(job.job_type.clone())
            .or_default()
            .push_back(job);
    }

    pub async fn resolutions(&self) -> Vec<JobResolution> {
        self.resolutions.read().await.clone()
    }
}

#[async_trait]
impl WorkflowEngine for MockWorkflowEngine {
    async fn create_instance(&self, request: &CreateInstance) -> Result<String> {
        if let Some(failure) = *self.create_failure.read().await {
            return Err(failure.to_error("create instance"));
        }
        let mut created = self.created.write().await;
        created.push(request.clone());
        Ok(format!("{}", 2251799813685248u64 + created.len() as u64))
    }

    async fn activate_jobs(
        &self,
        job_type: &str,
        _worker: &str,
        _timeout: Duration,
        max_jobs: u32,
    ) -> Result<Vec<ActivatedJob>> {
        if let Some(failure) = *self.activate_failure.read().await {
            return Err(failure.to_error("activate jobs"));
        }
        let mut jobs = self.jobs.write().await;
        let Some(queue) = jobs.get_mut(job_type) else {
            return Ok(Vec::new());
        };
        let take = queue.len().min(max_jobs as usize);
        Ok(queue.drain(..take).collect())
    }

    async fn complete_job(&self, job_key: &str, variables: Map<String, Value>) -> Result<()> {
        self.resolutions.write().await.push(JobResolution::Completed {
            job_key: job_key.to_string(),
            variables,
        });
        Ok(())
    }

    async fn fail_job(&self, job_key: &str, retries: i32, message: &str) -> Result<()> {
        self.resolutions.write().await.push(JobResolution::Failed {
            job_key: job_key.to_string(),
            retries,
            message: message.to_string(),
        });
        Ok(())
    }
}
