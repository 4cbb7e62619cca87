//! HTTP client for the interchange-message registry.
//!
//! `GET <base>/IM/<id>` returns the IM document as JSON.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::{error_for_status, join_url, ClientError, MessageRegistry, Result};
use crate::types::InterchangeMessage;

/// Registry client backed by the ledger's REST API.
#[derive(Debug, Clone)]
pub struct HttpMessageRegistry {
    client: Client,
    base_url: String,
}

impl HttpMessageRegistry {
    pub fn new(client: Client, base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(ClientError::Config(
                "registry base URL not configured".to_string(),
            ));
        }
        Ok(Self { client, base_url })
    }

    fn im_url(&self, id: &str) -> String {
        join_url(&self.base_url, &format!("IM/{}", id))
    }
}

#[async_trait]
impl MessageRegistry for HttpMessageRegistry {
    async fn get_im(&self, id: &str) -> Result<InterchangeMessage> {
        let url = self.im_url(id);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(id.to_string()));
        }
        let response = error_for_status(response).await?;

        let bytes = response.bytes().await?;
        let im: InterchangeMessage = serde_json::from_slice(&bytes)?;
        debug!(im_id = %id, url = %url, "Fetched interchange message");
        Ok(im)
    }
}
