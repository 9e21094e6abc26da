use std::fmt::{Display, Formatter};

/// Metric recording the time from send to receipt by the destination.
pub const END_TO_END_EVENT_LATENCY: &str = "end_to_end_event_latency";
/// Metric recording the time from send to ingestion by the delivery service.
pub const RECEIVE_LATENCY: &str = "receive_latency";
/// Metric recording the time from ingestion to the start of the delivery attempt.
pub const INTERNAL_OUTPOST_EVENT_LATENCY: &str = "internal_outpost_event_latency";
/// Metric recording the time from the start of the delivery attempt to receipt.
pub const DELIVERY_LATENCY: &str = "delivery_latency";

/// One portion of the path an event takes through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    EndToEnd,
    Receive,
    Internal,
    Delivery,
}

impl Segment {
    pub fn metric_name(&self) -> &'static str {
        match self {
            Segment::EndToEnd => END_TO_END_EVENT_LATENCY,
            Segment::Receive => RECEIVE_LATENCY,
            Segment::Internal => INTERNAL_OUTPOST_EVENT_LATENCY,
            Segment::Delivery => DELIVERY_LATENCY,
        }
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Segment::EndToEnd => "end_to_end",
            Segment::Receive => "receive",
            Segment::Internal => "internal",
            Segment::Delivery => "delivery",
        };
        write!(f, "{name}")
    }
}

/// The pipeline checkpoints gathered for one event, all in Unix milliseconds.
///
/// The values come from three different clocks: the harness, the delivery service and the
/// receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineTimestamps {
    pub send: i64,
    pub internal_received: Option<i64>,
    pub delivery_attempt_started: Option<i64>,
    pub receiver_observed: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    pub segment: Segment,
    pub value_ms: u64,
}

/// Why a segment was not recorded, or was adjusted.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum LatencyDiagnostic {
    #[display("{segment} latency not recorded, missing {input}")]
    Missing {
        segment: Segment,
        input: &'static str,
    },
    #[display("{segment} latency of {value_ms}ms is negative, not recorded")]
    Negative { segment: Segment, value_ms: i64 },
    #[display("{segment} latency of {value_ms}ms is negative, recorded as 0")]
    Clamped { segment: Segment, value_ms: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyBreakdown {
    pub samples: Vec<LatencySample>,
    pub diagnostics: Vec<LatencyDiagnostic>,
}

impl LatencyBreakdown {
    pub fn get(&self, segment: Segment) -> Option<u64> {
        self.samples
            .iter()
            .find(|sample| sample.segment == segment)
            .map(|sample| sample.value_ms)
    }
}

impl PipelineTimestamps {
    /// Derive every segment whose inputs are present.
    ///
    /// Negative end-to-end, receive and delivery segments are dropped. A negative internal segment
    /// is clamped to zero since it is the most exposed to skew between the service's clocks.
    pub fn calculate(&self) -> LatencyBreakdown {
        let mut breakdown = LatencyBreakdown::default();

        breakdown.discard_negative(
            Segment::EndToEnd,
            between(Some(self.send), "send", self.receiver_observed, "receiver_observed"),
        );
        breakdown.discard_negative(
            Segment::Receive,
            between(Some(self.send), "send", self.internal_received, "internal_received"),
        );

        match between(
            self.internal_received,
            "internal_received",
            self.delivery_attempt_started,
            "delivery_attempt_started",
        ) {
            Ok(value_ms) if value_ms < 0 => {
                breakdown.diagnostics.push(LatencyDiagnostic::Clamped {
                    segment: Segment::Internal,
                    value_ms,
                });
                breakdown.push(Segment::Internal, 0);
            }
            Ok(value_ms) => breakdown.push(Segment::Internal, value_ms as u64),
            Err(input) => breakdown.diagnostics.push(LatencyDiagnostic::Missing {
                segment: Segment::Internal,
                input,
            }),
        }

        breakdown.discard_negative(
            Segment::Delivery,
            between(
                self.delivery_attempt_started,
                "delivery_attempt_started",
                self.receiver_observed,
                "receiver_observed",
            ),
        );

        breakdown
    }
}

impl LatencyBreakdown {
    fn push(&mut self, segment: Segment, value_ms: u64) {
        self.samples.push(LatencySample { segment, value_ms });
    }

    fn discard_negative(&mut self, segment: Segment, difference: Result<i64, &'static str>) {
        match difference {
            Ok(value_ms) if value_ms < 0 => self
                .diagnostics
                .push(LatencyDiagnostic::Negative { segment, value_ms }),
            Ok(value_ms) => self.push(segment, value_ms as u64),
            Err(input) => self
                .diagnostics
                .push(LatencyDiagnostic::Missing { segment, input }),
        }
    }
}

fn between(
    start: Option<i64>,
    start_name: &'static str,
    end: Option<i64>,
    end_name: &'static str,
) -> Result<i64, &'static str> {
    let start = start.ok_or(start_name)?;
    let end = end.ok_or(end_name)?;
    Ok(end - start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SEND: i64 = 1_714_300_000_000;

    #[test]
    fn all_segments_from_ordered_timestamps() {
        let breakdown = PipelineTimestamps {
            send: SEND,
            internal_received: Some(SEND + 20),
            delivery_attempt_started: Some(SEND + 50),
            receiver_observed: Some(SEND + 120),
        }
        .calculate();

        assert_eq!(Some(120), breakdown.get(Segment::EndToEnd));
        assert_eq!(Some(20), breakdown.get(Segment::Receive));
        assert_eq!(Some(30), breakdown.get(Segment::Internal));
        assert_eq!(Some(70), breakdown.get(Segment::Delivery));
        assert!(breakdown.diagnostics.is_empty());
    }

    #[test]
    fn negative_end_to_end_is_discarded() {
        let breakdown = PipelineTimestamps {
            send: SEND,
            receiver_observed: Some(SEND - 5),
            ..Default::default()
        }
        .calculate();

        assert_eq!(None, breakdown.get(Segment::EndToEnd));
        assert!(breakdown.diagnostics.contains(&LatencyDiagnostic::Negative {
            segment: Segment::EndToEnd,
            value_ms: -5
        }));
    }

    #[test]
    fn negative_internal_is_clamped() {
        let breakdown = PipelineTimestamps {
            send: SEND,
            internal_received: Some(SEND + 40),
            delivery_attempt_started: Some(SEND + 10),
            receiver_observed: Some(SEND + 100),
        }
        .calculate();

        assert_eq!(Some(0), breakdown.get(Segment::Internal));
        assert_eq!(Some(90), breakdown.get(Segment::Delivery));
    }

    #[test]
    fn missing_inputs_are_never_synthesised() {
        let breakdown = PipelineTimestamps {
            send: SEND,
            receiver_observed: Some(SEND + 100),
            ..Default::default()
        }
        .calculate();

        assert_eq!(
            vec![LatencySample {
                segment: Segment::EndToEnd,
                value_ms: 100
            }],
            breakdown.samples
        );
        assert_eq!(3, breakdown.diagnostics.len());
        assert_eq!(
            "receive latency not recorded, missing internal_received",
            breakdown.diagnostics[0].to_string()
        );
    }
}
