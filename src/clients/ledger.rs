//! HTTP client for ledger transactions.
//!
//! POSTs `{"piis": ...}` to `<base>/PublishPIIS`. Any 2xx response is
//! taken as the ledger's acknowledgment.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{error_for_status, join_url, ClientError, LedgerTransactions, Result};
use crate::types::PublishPiis;

const PUBLISH_PIIS_PATH: &str = "PublishPIIS";

/// Ledger transaction client backed by the ledger's REST API.
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    client: Client,
    base_url: String,
}

impl HttpLedgerClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(ClientError::Config(
                "ledger base URL not configured".to_string(),
            ));
        }
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl LedgerTransactions for HttpLedgerClient {
    async fn publish_piis(&self, tx: &PublishPiis) -> Result<()> {
        // serialize up front so encoding failures are not mistaken for transport ones
        let body = serde_json::to_vec(tx)?;
        let url = join_url(&self.base_url, PUBLISH_PIIS_PATH);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        error_for_status(response).await?;

        debug!(piis_id = %tx.piis.id, url = %url, "PublishPIIS transaction accepted");
        Ok(())
    }
}
