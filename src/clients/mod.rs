//! Clients for the three external services the bridge talks to.
//!
//! - `MessageRegistry`: read-only lookup of interchange messages
//! - `LedgerTransactions`: submits `PublishPIIS` transactions
//! - `WorkflowEngine`: starts process instances and serves the task queue
//!
//! HTTP implementations live in the submodules; `mock` provides in-memory
//! doubles for tests. None of the clients retry internally, callers own
//! retry policy.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::types::{ActivatedJob, CreateInstance, InterchangeMessage, PublishPiis};

pub mod ledger;
pub mod mock;
pub mod registry;
pub mod workflow;

pub use ledger::HttpLedgerClient;
pub use registry::HttpMessageRegistry;
pub use workflow::HttpWorkflowEngine;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors from external service calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failure from a non-HTTP client (mocks, alternative transports).
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl ClientError {
    /// Whether a repeated attempt can reasonably succeed.
    ///
    /// Timeouts, connection failures, 429 and 5xx are transient; everything
    /// else (bad request, not found, serialization) will fail again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(err) => err.is_timeout() || err.is_connect(),
            ClientError::Status { status, .. } => {
                *status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            ClientError::Unavailable(_) => true,
            ClientError::NotFound(_) | ClientError::Serialization(_) | ClientError::Config(_) => {
                false
            }
        }
    }
}

/// Read access to the interchange-message registry.
#[async_trait]
pub trait MessageRegistry: Send + Sync {
    /// Fetch an IM by identifier. A missing document is `ClientError::NotFound`.
    async fn get_im(&self, id: &str) -> Result<InterchangeMessage>;
}

/// Ledger transaction submission.
#[async_trait]
pub trait LedgerTransactions: Send + Sync {
    /// Submit a `PublishPIIS` transaction. Any 2xx is an acknowledgment.
    async fn publish_piis(&self, tx: &PublishPiis) -> Result<()>;
}

/// Workflow engine command surface.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Start a process instance, returning the engine's instance key.
    async fn create_instance(&self, request: &CreateInstance) -> Result<String>;

    /// Lock up to `max_jobs` jobs of `job_type` for this worker.
    async fn activate_jobs(
        &self,
        job_type: &str,
        worker: &str,
        timeout: Duration,
        max_jobs: u32,
    ) -> Result<Vec<ActivatedJob>>;

    async fn complete_job(&self, job_key: &str, variables: Map<String, Value>) -> Result<()>;

    async fn fail_job(&self, job_key: &str, retries: i32, message: &str) -> Result<()>;
}

/// Build the shared HTTP client with a request deadline.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Join a base URL and a path without doubling or dropping slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Map a non-success response to `ClientError::Status`, keeping a short body excerpt.
pub(crate) async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status,
        body: body.chars().take(200).collect(),
    })
}
