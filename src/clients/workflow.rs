//! HTTP client for the workflow engine's REST gateway.
//!
//! Covers the four calls the bridge needs: create a process instance,
//! activate jobs, complete a job, fail a job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{error_for_status, join_url, ClientError, Result, WorkflowEngine};
use crate::types::{key_as_string, ActivatedJob, CreateInstance};

/// Workflow engine client.
#[derive(Debug, Clone)]
pub struct HttpWorkflowEngine {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateInstanceResponse {
    #[serde(deserialize_with = "key_as_string")]
    process_instance_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivateJobsRequest<'a> {
    #[serde(rename = "type")]
    job_type: &'a str,
    worker: &'a str,
    timeout: u64,
    max_jobs_to_activate: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ActivateJobsResponse {
    #[serde(default)]
    jobs: Vec<ActivatedJob>,
}

#[derive(Debug, Serialize)]
struct CompleteJobRequest {
    variables: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailJobRequest<'a> {
    retries: i32,
    error_message: &'a str,
}

impl HttpWorkflowEngine {
    pub fn new(client: Client, base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(ClientError::Config(
                "workflow engine address not configured".to_string(),
            ));
        }
        Ok(Self { client, base_url })
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let body = serde_json::to_vec(body)?;
        let response = self
            .client
            .post(join_url(&self.base_url, path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        error_for_status(response).await
    }
}

#[async_trait]
impl WorkflowEngine for HttpWorkflowEngine {
    async fn create_instance(&self, request: &CreateInstance) -> Result<String> {
        let response = self.post_json("v2/process-instances", request).await?;
        let created: CreateInstanceResponse = serde_json::from_slice(&response.bytes().await?)?;
        debug!(
            bpmn_process_id = %request.bpmn_process_id,
            instance_key = %created.process_instance_key,
            "Process instance created"
        );
        Ok(created.process_instance_key)
    }

    async fn activate_jobs(
        &self,
        job_type: &str,
        worker: &str,
        timeout: Duration,
        max_jobs: u32,
    ) -> Result<Vec<ActivatedJob>> {
        let request = ActivateJobsRequest {
            job_type,
            worker,
            timeout: timeout.as_millis() as u64,
            max_jobs_to_activate: max_jobs,
        };
        let response = self.post_json("v2/jobs/activation", &request).await?;
        let activated: ActivateJobsResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(activated.jobs)
    }

    async fn complete_job(&self, job_key: &str, variables: Map<String, Value>) -> Result<()> {
        self.post_json(
            &format!("v2/jobs/{}/completion", job_key),
            &CompleteJobRequest { variables },
        )
        .await?;
        Ok(())
    }

    async fn fail_job(&self, job_key: &str, retries: i32, message: &str) -> Result<()> {
        self.post_json(
            &format!("v2/jobs/{}/failure", job_key),
            &FailJobRequest {
                retries,
                error_message: message,
            },
        )
        .await?;
        Ok(())
    }
}
