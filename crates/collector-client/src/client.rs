//! Collector API client
//!
//! Implements delivery of resource events to the Skyflo collector.
//! Based on the collector API structure: POST /api/v1/resources

use crate::error::CollectorError;
use crate::models::ResourceEvent;
use crate::sender_trait::EventSender;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, USER_AGENT as USER_AGENT_HEADER};
use std::time::Duration;
use tracing::debug;

/// Path events are posted to, relative to the collector base URL
pub const RESOURCES_PATH: &str = "/api/v1/resources";

/// User agent sent with every request
pub const USER_AGENT: &str = "skyflo-kubernetes-agent";

/// Header carrying the collector API key
const API_KEY_HEADER: &str = "X-API-Key";

/// Collector API client
#[derive(Debug, Clone)]
pub struct CollectorClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CollectorClient {
    /// Create a new collector client
    ///
    /// # Arguments
    /// * `base_url` - Collector base URL (e.g., "https://collector.skyflo.ai")
    /// * `api_key` - API key sent as `X-API-Key`
    /// * `timeout` - Timeout applied to each delivery
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CollectorError> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(CollectorError::InvalidConfig(
                "collector base URL is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CollectorError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL events are posted to
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, RESOURCES_PATH)
    }

    /// Deliver one event to the collector.
    ///
    /// Performs exactly one request. Any transport error or a status of 400
    /// or above is returned as an error; the response body is only read to
    /// enrich the error message.
    pub async fn send(&self, event: &ResourceEvent) -> Result<(), CollectorError> {
        let body = serde_json::to_vec(event)?;
        debug!(
            kind = %event.kind,
            change = %event.change,
            bytes = body.len(),
            "Posting resource event to collector"
        );

        let response = self.client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .header(USER_AGENT_HEADER, USER_AGENT)
            .body(body)
            .send()
            .await
            .map_err(CollectorError::Http)?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl EventSender for CollectorClient {
    async fn send(&self, event: &ResourceEvent) -> Result<(), CollectorError> {
        CollectorClient::send(self, event).await
    }
}
