mod aggregator;
mod report;
mod threshold;
mod trend;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub use aggregator::{CheckTally, MetricKind, MetricSummary, MetricsAggregator, RunReport};
pub use report::print_summary;
pub use threshold::{
    Aggregation, Comparison, Threshold, ThresholdOutcome, ThresholdParseError, Verdict,
};
pub use trend::{percentile, TrendStats};

/// Name of the built-in trend recording the duration of every HTTP request, in milliseconds.
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
/// Name of the built-in rate recording whether each HTTP request failed.
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
/// Name of the built-in rate aggregating every named check.
pub const CHECKS: &str = "checks";

/// Timing for a single operation against the system under test, usually one HTTP request.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub operation_id: String,
    started: Instant,
    pub elapsed: Option<Duration>,
    pub is_error: bool,
    pub attr: BTreeMap<String, String>,
}

impl OperationRecord {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            started: Instant::now(),
            elapsed: None,
            is_error: false,
            attr: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attr.insert(key.into(), value.to_string());
        self
    }

    /// Stop the timer. Calling this more than once keeps the first elapsed time.
    pub fn finish(mut self, is_error: bool) -> Self {
        if self.elapsed.is_none() {
            self.elapsed = Some(self.started.elapsed());
        }
        self.is_error = is_error;
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Attributes as `key=value` pairs in key order, e.g. `status=201`.
    pub fn attr_text(&self) -> String {
        self.attr
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Stop the record's timer and hand it to the aggregator.
pub fn report_operation(metrics: &MetricsAggregator, record: OperationRecord, is_error: bool) {
    let record = record.finish(is_error);
    log::trace!(
        "Operation {} took {}ms, and failed? {:?} [{}]",
        record.operation_id,
        record.duration().unwrap_or_default().as_millis(),
        record.is_error,
        record.attr_text(),
    );
    metrics.add_operation(&record);
}
