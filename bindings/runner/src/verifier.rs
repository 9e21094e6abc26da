use std::sync::Arc;
use std::time::Duration;

use delivery_api_client::{DeliveryApiClient, ReceivedEvent, ReceiverClient};
use delivery_tunnel_runner::prelude::{Clock, MetricsAggregator};

use crate::latency::{LatencyBreakdown, PipelineTimestamps};
use crate::store::{CorrelationKeys, CorrelationStore};
use crate::timestamp::parse_flexible_timestamp;

/// Rate of popped events that reached the receiver before the poll timeout.
pub const EVENT_VERIFICATION_RATE: &str = "event_verification_rate";
/// Trend of the time from the first poll to the receiver confirming the event, in milliseconds.
pub const EVENT_VERIFICATION_TIME: &str = "event_verification_time";

const VERIFIED_CHECK: &str = "event verified";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

/// What was observed about one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationResult {
    pub event_id: String,
    pub verified: bool,
    pub send_timestamp: i64,
    pub receiver_observed_at: Option<i64>,
    pub internal_received_at: Option<i64>,
    pub delivery_attempt_started_at: Option<i64>,
}

impl VerificationResult {
    fn timestamps(&self) -> PipelineTimestamps {
        PipelineTimestamps {
            send: self.send_timestamp,
            internal_received: self.internal_received_at,
            delivery_attempt_started: self.delivery_attempt_started_at,
            receiver_observed: self.receiver_observed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// No event id left in the store.
    Empty,
    /// The event has no send timestamp, most likely because another VU already verified it.
    NothingToVerify { event_id: String },
    Verified {
        result: VerificationResult,
        latency: LatencyBreakdown,
    },
    /// The receiver did not see the event before the poll timeout.
    Unverified(VerificationResult),
}

/// Pops published events from the correlation store and confirms their delivery.
#[derive(Debug, Clone)]
pub struct DeliveryVerifier {
    api: DeliveryApiClient,
    receiver: ReceiverClient,
    store: Arc<dyn CorrelationStore>,
    keys: CorrelationKeys,
    tenant_id: String,
    poll: PollSettings,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsAggregator>,
}

impl DeliveryVerifier {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: DeliveryApiClient,
        receiver: ReceiverClient,
        store: Arc<dyn CorrelationStore>,
        keys: CorrelationKeys,
        tenant_id: impl Into<String>,
        poll: PollSettings,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        Self {
            api,
            receiver,
            store,
            keys,
            tenant_id: tenant_id.into(),
            poll,
            clock,
            metrics,
        }
    }

    /// Verify the oldest unverified event, if there is one.
    pub async fn verify_next(&self) -> anyhow::Result<VerifyOutcome> {
        match self
            .store
            .pop_oldest_or_arbitrary(&self.keys.list(), &self.keys.set())
            .await?
        {
            Some(event_id) => self.verify(&event_id).await,
            None => {
                log::trace!("No events left to verify");
                Ok(VerifyOutcome::Empty)
            }
        }
    }

    pub async fn verify(&self, event_id: &str) -> anyhow::Result<VerifyOutcome> {
        let sent_at_key = self.keys.sent_at(event_id);

        // Claiming the send timestamp removes it, so an id popped by two VUs is verified once.
        let send_timestamp = match self.store.take_string(&sent_at_key).await? {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(send_timestamp) if send_timestamp > 0 => send_timestamp,
                _ => {
                    log::warn!("Event {event_id} has an invalid send timestamp `{raw}`, skipping");
                    return Ok(VerifyOutcome::NothingToVerify {
                        event_id: event_id.to_string(),
                    });
                }
            },
            None => {
                log::warn!(
                    "No send timestamp for event {event_id}, it was never recorded or another VU claimed it"
                );
                return Ok(VerifyOutcome::NothingToVerify {
                    event_id: event_id.to_string(),
                });
            }
        };

        let mut result = VerificationResult {
            event_id: event_id.to_string(),
            send_timestamp,
            ..Default::default()
        };

        let received = self.poll_receiver(event_id).await;
        result.verified = received.is_some();

        if let Some(event) = &received {
            self.collect_timestamps(event, &mut result).await;
        }

        self.metrics
            .add_rate(EVENT_VERIFICATION_RATE, result.verified);
        self.metrics.check(VERIFIED_CHECK, result.verified);

        if !result.verified {
            log::error!(
                "Event {event_id} was not received within {:?}",
                self.poll.timeout
            );
            return Ok(VerifyOutcome::Unverified(result));
        }

        let latency = result.timestamps().calculate();
        for sample in &latency.samples {
            self.metrics
                .add_trend(sample.segment.metric_name(), sample.value_ms as f64);
        }
        for diagnostic in &latency.diagnostics {
            log::warn!("Event {event_id}: {diagnostic}");
        }

        Ok(VerifyOutcome::Verified { result, latency })
    }

    /// Poll the receiver at a fixed interval until it has the event or the timeout elapses.
    async fn poll_receiver(&self, event_id: &str) -> Option<ReceivedEvent> {
        let started = self.clock.now_millis();
        let timeout = self.poll.timeout.as_millis() as i64;
        let interval = self.poll.interval.as_millis() as i64;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.receiver.get_event(event_id).await {
                Ok(Some(event)) => {
                    let elapsed = self.clock.now_millis() - started;
                    log::debug!("Event {event_id} received after {attempt} attempts");
                    self.metrics
                        .add_trend(EVENT_VERIFICATION_TIME, elapsed.max(0) as f64);
                    return Some(event);
                }
                Ok(None) => log::trace!("Event {event_id} not received yet, attempt {attempt}"),
                Err(e) => log::debug!("Polling the receiver for event {event_id} failed: {e}"),
            }

            let elapsed = self.clock.now_millis() - started;
            if elapsed + interval >= timeout {
                return None;
            }
            self.clock.sleep(self.poll.interval).await;
        }
    }

    async fn collect_timestamps(&self, event: &ReceivedEvent, result: &mut VerificationResult) {
        let event_id = &result.event_id;

        result.receiver_observed_at =
            parse_reported(event_id, "received_at", event.received_at.as_deref());
        result.delivery_attempt_started_at = parse_reported(
            event_id,
            "timestamp header",
            event.delivery_timestamp_header().as_deref(),
        );

        result.internal_received_at = match self.api.get_event(&self.tenant_id, event_id).await {
            Ok(Some(record)) => parse_reported(event_id, "ingestion time", record.time.as_deref()),
            Ok(None) => {
                log::warn!("Delivery service has no record of event {event_id}");
                None
            }
            Err(e) => {
                log::warn!("Failed to fetch event {event_id} from the delivery service: {e}");
                None
            }
        };
    }
}

fn parse_reported(event_id: &str, what: &str, raw: Option<&str>) -> Option<i64> {
    let raw = raw?;
    let parsed = parse_flexible_timestamp(raw).map(|t| t.unix_millis());
    if parsed.is_none() {
        log::warn!("Event {event_id} has an unreadable {what} `{raw}`");
    }
    parsed
}
