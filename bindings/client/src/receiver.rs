use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use delivery_tunnel_instruments::MetricsAggregator;
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

use crate::{endpoint, send_instrumented, ApiError, ApiResult};

const PREFERRED_TIMESTAMP_HEADERS: [&str; 2] = ["x-outpost-timestamp", "x-acme-timestamp"];

/// An event as captured by the mock webhook receiver.
///
/// Built leniently from the receiver's body. Fields that are missing or of an unexpected type are
/// left empty, since a 200 from the receiver is enough to know the event was delivered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceivedEvent {
    pub id: String,
    /// ISO-8601 time at which the receiver got the delivery.
    pub received_at: Option<String>,
    pub payload: Value,
    pub headers: HashMap<String, Value>,
}

/// Text of a string or number, the two shapes receivers use for timestamps.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

impl ReceivedEvent {
    pub fn from_json(body: &Value) -> Self {
        Self {
            id: as_text(&body["id"]).unwrap_or_default(),
            received_at: as_text(&body["received_at"]),
            payload: body["payload"].clone(),
            headers: body["headers"]
                .as_object()
                .map(|headers| {
                    headers
                        .iter()
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| as_text(value))
    }

    /// The timestamp the delivery service stamped on the delivery attempt, taken from
    /// `X-Outpost-Timestamp`, `X-Acme-Timestamp` or any other `X-*-Timestamp` header.
    pub fn delivery_timestamp_header(&self) -> Option<String> {
        PREFERRED_TIMESTAMP_HEADERS
            .iter()
            .find_map(|name| self.header(name))
            .or_else(|| {
                let mut candidates = self
                    .headers
                    .iter()
                    .filter(|(key, _)| {
                        let key = key.to_ascii_lowercase();
                        key.starts_with("x-") && key.ends_with("-timestamp")
                    })
                    .collect::<Vec<_>>();
                // Deterministic choice when several vendors' headers are present.
                candidates.sort_by(|a, b| a.0.cmp(b.0));
                candidates.first().and_then(|(_, value)| as_text(value))
            })
    }
}

/// Client for the mock webhook receiver's query API.
#[derive(Debug, Clone)]
pub struct ReceiverClient {
    base_url: Url,
    http: reqwest::Client,
    metrics: Arc<MetricsAggregator>,
}

impl ReceiverClient {
    pub fn new(
        base_url: Url,
        timeout: Duration,
        metrics: Arc<MetricsAggregator>,
    ) -> ApiResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            http,
            metrics,
        })
    }

    /// `GET /events/{event_id}`. A 404 means not received yet and is not a failed request.
    pub async fn get_event(&self, event_id: &str) -> ApiResult<Option<ReceivedEvent>> {
        const OPERATION: &str = "receiver_get_event";
        let url = endpoint(&self.base_url, &["events", event_id])?;

        let response = send_instrumented(
            &self.metrics,
            OPERATION,
            self.http.get(url),
            |status| status == StatusCode::OK || status == StatusCode::NOT_FOUND,
        )
        .await?;

        match response.status() {
            StatusCode::OK => Ok(Some(received_event(event_id, response).await)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(ApiError::unexpected(OPERATION, response).await),
        }
    }
}

/// A 200 always means the event was received, so an unreadable body only loses its timestamps.
async fn received_event(event_id: &str, response: reqwest::Response) -> ReceivedEvent {
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            log::warn!("Could not read the receiver's body for event {event_id}: {e}");
            return ReceivedEvent::unreadable(event_id);
        }
    };

    match serde_json::from_str::<Value>(&body) {
        Ok(body) => ReceivedEvent::from_json(&body),
        Err(e) => {
            log::warn!("Receiver returned an unreadable body for event {event_id}: {e}");
            ReceivedEvent::unreadable(event_id)
        }
    }
}

impl ReceivedEvent {
    fn unreadable(event_id: &str) -> Self {
        Self {
            id: event_id.to_string(),
            ..Default::default()
        }
    }
}
