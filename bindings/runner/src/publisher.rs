use std::sync::Arc;

use anyhow::Context;
use chrono::{SecondsFormat, TimeZone, Utc};
use delivery_api_client::{DeliveryApiClient, PublishRequest};
use delivery_tunnel_runner::prelude::{Clock, MetricsAggregator};
use serde_json::{json, Map, Value};

use crate::store::{CorrelationKeys, CorrelationStore};

/// Counter of events accepted by the delivery service.
pub const EVENTS_PUBLISHED: &str = "events_published";
/// Rate of publish requests that were accepted.
pub const EVENT_PUBLISH_SUCCESS_RATE: &str = "event_publish_success_rate";

const PUBLISHED_CHECK: &str = "event published";

/// A published event as the harness saw it at send time.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub tenant_id: String,
    pub topic: String,
    /// Unix milliseconds, taken immediately before the publish request.
    pub send_timestamp: i64,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// Ingested by the service and recorded for verification.
    Accepted(Event),
    /// Not ingested. The event is abandoned and will never be verified.
    Rejected { event_id: String, reason: String },
}

/// Build the id of the event published by a VU iteration.
pub fn event_id(run_id: &str, vu: usize, iteration: u64) -> String {
    format!("event-{run_id}-{vu}-{iteration}")
}

/// Payload identifying the VU iteration that published an event.
pub fn iteration_payload(vu: usize, iteration: u64) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("iteration".to_string(), json!(iteration));
    payload.insert("vu".to_string(), json!(vu));
    payload
}

/// Publishes events and writes the correlation record of every accepted one.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    api: DeliveryApiClient,
    store: Arc<dyn CorrelationStore>,
    keys: CorrelationKeys,
    tenant_id: String,
    topic: String,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsAggregator>,
}

impl EventPublisher {
    pub fn new(
        api: DeliveryApiClient,
        store: Arc<dyn CorrelationStore>,
        keys: CorrelationKeys,
        tenant_id: impl Into<String>,
        topic: impl Into<String>,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        Self {
            api,
            store,
            keys,
            tenant_id: tenant_id.into(),
            topic: topic.into(),
            clock,
            metrics,
        }
    }

    /// Publish one event. The payload is extended with `timestamp` and `sent_at`.
    ///
    /// A rejected publish is reported through the outcome. Only a failure to write the correlation
    /// record of an accepted event is an error.
    pub async fn publish(
        &self,
        event_id: &str,
        mut payload: Map<String, Value>,
    ) -> anyhow::Result<PublishOutcome> {
        let send_timestamp = self.clock.now_millis();
        let iso = Utc
            .timestamp_millis_opt(send_timestamp)
            .single()
            .map(|time| time.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default();
        payload.insert("timestamp".to_string(), json!(iso));
        payload.insert("sent_at".to_string(), json!(send_timestamp));

        let event = Event {
            id: event_id.to_string(),
            tenant_id: self.tenant_id.clone(),
            topic: self.topic.clone(),
            send_timestamp,
            payload: Value::Object(payload),
        };

        let request = PublishRequest {
            tenant_id: event.tenant_id.clone(),
            topic: event.topic.clone(),
            eligible_for_retry: false,
            id: event.id.clone(),
            data: event.payload.clone(),
        };

        let rejection = match self.api.publish(&request).await {
            Ok(response) if response.accepted() => None,
            Ok(response) => Some(format!("{} {}", response.status, response.body)),
            Err(e) => Some(e.to_string()),
        };

        self.metrics
            .add_rate(EVENT_PUBLISH_SUCCESS_RATE, rejection.is_none());
        self.metrics.check(PUBLISHED_CHECK, rejection.is_none());

        if let Some(reason) = rejection {
            log::error!("Failed to publish event {}: {reason}", event.id);
            return Ok(PublishOutcome::Rejected {
                event_id: event.id,
                reason,
            });
        }

        self.metrics.add_counter(EVENTS_PUBLISHED, 1);
        self.record(&event)
            .await
            .with_context(|| format!("Failed to record event {} for verification", event.id))?;

        Ok(PublishOutcome::Accepted(event))
    }

    async fn record(&self, event: &Event) -> anyhow::Result<()> {
        self.store
            .set_string(
                &self.keys.sent_at(&event.id),
                &event.send_timestamp.to_string(),
            )
            .await?;
        self.store.push_latest(&self.keys.list(), &event.id).await?;
        self.store.increment(&self.keys.count()).await?;
        log::trace!("Recorded event {} for verification", event.id);
        Ok(())
    }
}
