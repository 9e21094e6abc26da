use std::sync::Arc;
use std::time::Duration;

use delivery_tunnel_instruments::MetricsAggregator;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::{decode, endpoint, send_instrumented, ApiError, ApiResult};

#[derive(Debug, Clone, Serialize)]
pub struct PublishRequest {
    pub tenant_id: String,
    pub topic: String,
    pub eligible_for_retry: bool,
    /// Caller chosen id, used as the correlation key for the event.
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub struct PublishResponse {
    pub status: StatusCode,
    pub body: String,
}

impl PublishResponse {
    /// The service ingested the event. This says nothing about delivery.
    pub fn accepted(&self) -> bool {
        self.status == StatusCode::OK
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DestinationConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateDestination {
    #[serde(rename = "type")]
    pub kind: String,
    pub topics: Vec<String>,
    pub config: DestinationConfig,
}

impl CreateDestination {
    pub fn webhook(url: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            kind: "webhook".to_string(),
            topics,
            config: DestinationConfig { url: url.into() },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Destination {
    pub id: String,
}

/// The delivery service's own record of an event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventRecord {
    pub id: Option<String>,
    pub topic: Option<String>,
    /// When the service ingested the event.
    pub time: Option<String>,
    pub data: Value,
}

/// Client for the event-delivery HTTP API. Every request is recorded in the metrics aggregator.
#[derive(Debug, Clone)]
pub struct DeliveryApiClient {
    base_url: Url,
    api_key: String,
    http: reqwest::Client,
    metrics: Arc<MetricsAggregator>,
}

impl DeliveryApiClient {
    pub fn new(
        base_url: Url,
        api_key: impl Into<String>,
        timeout: Duration,
        metrics: Arc<MetricsAggregator>,
    ) -> ApiResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            http,
            metrics,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `PUT /api/v1/{tenant_id}`. Creating a tenant that already exists is not an error.
    pub async fn upsert_tenant(&self, tenant_id: &str) -> ApiResult<()> {
        const OPERATION: &str = "upsert_tenant";
        let url = endpoint(&self.base_url, &["api", "v1", tenant_id])?;

        // 200 when the tenant is left over from an earlier run with the same id.
        let expected = |status: StatusCode| matches!(status, StatusCode::CREATED | StatusCode::OK);
        let response = send_instrumented(
            &self.metrics,
            OPERATION,
            self.http.put(url).bearer_auth(&self.api_key),
            expected,
        )
        .await?;

        if !expected(response.status()) {
            return Err(ApiError::unexpected(OPERATION, response).await);
        }
        Ok(())
    }

    /// `POST /api/v1/{tenant_id}/destinations`, returning the id of the new destination.
    pub async fn create_destination(
        &self,
        tenant_id: &str,
        destination: &CreateDestination,
    ) -> ApiResult<Destination> {
        const OPERATION: &str = "create_destination";
        let url = endpoint(&self.base_url, &["api", "v1", tenant_id, "destinations"])?;

        let response = send_instrumented(
            &self.metrics,
            OPERATION,
            self.http
                .post(url)
                .bearer_auth(&self.api_key)
                .json(destination),
            |status| status == StatusCode::CREATED,
        )
        .await?;

        if response.status() != StatusCode::CREATED {
            return Err(ApiError::unexpected(OPERATION, response).await);
        }
        decode(OPERATION, response).await
    }

    /// `POST /api/v1/publish`. Any status is returned to the caller, only transport errors fail.
    pub async fn publish(&self, request: &PublishRequest) -> ApiResult<PublishResponse> {
        let url = endpoint(&self.base_url, &["api", "v1", "publish"])?;

        let response = send_instrumented(
            &self.metrics,
            "publish",
            self.http.post(url).bearer_auth(&self.api_key).json(request),
            |status| status == StatusCode::OK,
        )
        .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok(PublishResponse { status, body })
    }

    /// `GET /api/v1/{tenant_id}/events/{event_id}`, `None` if the service does not know the event.
    pub async fn get_event(&self, tenant_id: &str, event_id: &str) -> ApiResult<Option<EventRecord>> {
        const OPERATION: &str = "get_event";
        let url = endpoint(&self.base_url, &["api", "v1", tenant_id, "events", event_id])?;

        let response = send_instrumented(
            &self.metrics,
            OPERATION,
            self.http.get(url).bearer_auth(&self.api_key),
            |status| status == StatusCode::OK || status == StatusCode::NOT_FOUND,
        )
        .await?;

        match response.status() {
            StatusCode::OK => decode(OPERATION, response).await.map(Some),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(ApiError::unexpected(OPERATION, response).await),
        }
    }

    /// `GET /api/v1/healthz`, returning the status without judging it.
    pub async fn healthz(&self) -> ApiResult<StatusCode> {
        let url = endpoint(&self.base_url, &["api", "v1", "healthz"])?;

        let response = send_instrumented(
            &self.metrics,
            "healthz",
            self.http.get(url),
            |status| status == StatusCode::OK,
        )
        .await?;

        Ok(response.status())
    }
}
