use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::threshold::{Aggregation, Threshold, ThresholdOutcome, ThresholdParseError};
use crate::trend::{percentile, sorted_samples, TrendStats};
use crate::{OperationRecord, CHECKS, HTTP_REQ_DURATION, HTTP_REQ_FAILED};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum MetricKind {
    #[display("counter")]
    Counter,
    #[display("rate")]
    Rate,
    #[display("trend")]
    Trend,
}

#[derive(Debug)]
enum MetricState {
    Counter(u64),
    Rate { passes: u64, total: u64 },
    Trend(Vec<f64>),
}

impl MetricState {
    fn kind(&self) -> MetricKind {
        match self {
            MetricState::Counter(_) => MetricKind::Counter,
            MetricState::Rate { .. } => MetricKind::Rate,
            MetricState::Trend(_) => MetricKind::Trend,
        }
    }

    fn aggregate(&self, aggregation: &Aggregation, elapsed: Duration) -> Option<f64> {
        match (self, aggregation) {
            (MetricState::Counter(count), Aggregation::Count) => Some(*count as f64),
            (MetricState::Counter(count), Aggregation::Rate) => {
                let secs = elapsed.as_secs_f64();
                (secs > 0.0).then(|| *count as f64 / secs)
            }
            (MetricState::Rate { passes, total }, Aggregation::Rate) => {
                (*total > 0).then(|| *passes as f64 / *total as f64)
            }
            (MetricState::Rate { total, .. }, Aggregation::Count) => Some(*total as f64),
            (MetricState::Trend(samples), Aggregation::Count) => Some(samples.len() as f64),
            (MetricState::Trend(samples), aggregation) => {
                let sorted = sorted_samples(samples);
                match aggregation {
                    Aggregation::Avg if !sorted.is_empty() => {
                        Some(sorted.iter().sum::<f64>() / sorted.len() as f64)
                    }
                    Aggregation::Min => sorted.first().copied(),
                    Aggregation::Max => sorted.last().copied(),
                    Aggregation::Med => percentile(&sorted, 50.0),
                    Aggregation::Percentile(p) => percentile(&sorted, *p),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn supports(&self, aggregation: &Aggregation) -> bool {
        matches!(
            (self, aggregation),
            (MetricState::Counter(_), Aggregation::Count | Aggregation::Rate)
                | (MetricState::Rate { .. }, Aggregation::Count | Aggregation::Rate)
                | (
                    MetricState::Trend(_),
                    Aggregation::Count
                        | Aggregation::Avg
                        | Aggregation::Min
                        | Aggregation::Max
                        | Aggregation::Med
                        | Aggregation::Percentile(_)
                )
        )
    }

    fn summarise(&self, elapsed: Duration) -> MetricSummary {
        match self {
            MetricState::Counter(count) => MetricSummary::Counter {
                count: *count,
                per_second: self.aggregate(&Aggregation::Rate, elapsed).unwrap_or_default(),
            },
            MetricState::Rate { passes, total } => MetricSummary::Rate {
                passes: *passes,
                total: *total,
            },
            MetricState::Trend(samples) => MetricSummary::Trend(TrendStats::from_samples(samples)),
        }
    }
}

/// Point in time view of one metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricSummary {
    Counter { count: u64, per_second: f64 },
    Rate { passes: u64, total: u64 },
    Trend(Option<TrendStats>),
}

impl MetricSummary {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSummary::Counter { .. } => MetricKind::Counter,
            MetricSummary::Rate { .. } => MetricKind::Rate,
            MetricSummary::Trend(_) => MetricKind::Trend,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckTally {
    pub passes: u64,
    pub fails: u64,
}

/// The result of a run: every metric, every named check and the verdict of every threshold.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub elapsed: Duration,
    pub metrics: BTreeMap<String, MetricSummary>,
    pub checks: BTreeMap<String, CheckTally>,
    pub thresholds: Vec<ThresholdOutcome>,
}

impl RunReport {
    /// The run passes when no threshold failed.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(ThresholdOutcome::passed)
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds.iter().filter(|outcome| !outcome.passed())
    }

    /// Final value of a counter, `None` if it was never incremented or is not a counter.
    pub fn counter(&self, name: &str) -> Option<u64> {
        match self.metrics.get(name) {
            Some(MetricSummary::Counter { count, .. }) => Some(*count),
            _ => None,
        }
    }
}

/// Accumulates counters, rates and trends by metric name for the lifetime of one run.
///
/// One instance is created per run and shared by reference with every component that records
/// metrics. All recording methods take `&self` and may be called from any worker.
#[derive(Debug)]
pub struct MetricsAggregator {
    started: Instant,
    metrics: Mutex<BTreeMap<String, MetricState>>,
    checks: Mutex<BTreeMap<String, CheckTally>>,
    thresholds: Vec<Threshold>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            metrics: Mutex::new(BTreeMap::new()),
            checks: Mutex::new(BTreeMap::new()),
            thresholds: Vec::new(),
        }
    }

    /// Create an aggregator that will evaluate the given thresholds, keyed by metric name.
    pub fn with_thresholds<'a>(
        thresholds: impl IntoIterator<Item = (&'a String, &'a Vec<String>)>,
    ) -> Result<Self, ThresholdParseError> {
        let mut aggregator = Self::new();
        for (metric, expressions) in thresholds {
            for expression in expressions {
                aggregator
                    .thresholds
                    .push(Threshold::parse(metric, expression)?);
            }
        }
        Ok(aggregator)
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    pub fn add_counter(&self, name: &str, value: u64) {
        self.record(name, MetricKind::Counter, |state| {
            if let MetricState::Counter(count) = state {
                *count += value;
            }
        });
    }

    pub fn add_rate(&self, name: &str, sample: bool) {
        self.record(name, MetricKind::Rate, |state| {
            if let MetricState::Rate { passes, total } = state {
                *total += 1;
                if sample {
                    *passes += 1;
                }
            }
        });
    }

    pub fn add_trend(&self, name: &str, value: f64) {
        self.record(name, MetricKind::Trend, |state| {
            if let MetricState::Trend(samples) = state {
                samples.push(value);
            }
        });
    }

    /// Record the outcome of a named check, feeding the built-in `checks` rate. Returns `passed`
    /// so the call can be used inline.
    pub fn check(&self, name: &str, passed: bool) -> bool {
        {
            let mut checks = self.checks.lock();
            let tally = checks.entry(name.to_string()).or_default();
            if passed {
                tally.passes += 1;
            } else {
                tally.fails += 1;
            }
        }
        self.add_rate(CHECKS, passed);
        passed
    }

    /// Record a finished operation as a request duration sample and a request failure sample.
    pub fn add_operation(&self, record: &OperationRecord) {
        if let Some(elapsed) = record.duration() {
            self.add_trend(HTTP_REQ_DURATION, elapsed.as_micros() as f64 / 1000.0);
        }
        self.add_rate(HTTP_REQ_FAILED, record.is_error);
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        match self.metrics.lock().get(name) {
            Some(MetricState::Counter(count)) => Some(*count),
            _ => None,
        }
    }

    pub fn rate(&self, name: &str) -> Option<f64> {
        self.metrics
            .lock()
            .get(name)
            .filter(|state| state.kind() == MetricKind::Rate)
            .and_then(|state| state.aggregate(&Aggregation::Rate, self.started.elapsed()))
    }

    pub fn trend(&self, name: &str) -> Option<TrendStats> {
        match self.metrics.lock().get(name) {
            Some(MetricState::Trend(samples)) => TrendStats::from_samples(samples),
            _ => None,
        }
    }

    pub fn check_tally(&self, name: &str) -> CheckTally {
        self.checks.lock().get(name).cloned().unwrap_or_default()
    }

    /// Evaluate every threshold against the metrics recorded so far.
    pub fn evaluate(&self) -> RunReport {
        let elapsed = self.started.elapsed();
        let metrics = self.metrics.lock();

        let thresholds = self
            .thresholds
            .iter()
            .map(|threshold| match metrics.get(&threshold.metric) {
                Some(state) if !state.supports(&threshold.aggregation) => {
                    log::error!(
                        "Threshold `{}` on {} metric `{}` uses an unsupported aggregation",
                        threshold.expression,
                        state.kind(),
                        threshold.metric,
                    );
                    let mut outcome = threshold.judge(None);
                    outcome.verdict = crate::Verdict::Fail;
                    outcome
                }
                Some(state) => threshold.judge(state.aggregate(&threshold.aggregation, elapsed)),
                None => threshold.judge(None),
            })
            .collect();

        RunReport {
            elapsed,
            metrics: metrics
                .iter()
                .map(|(name, state)| (name.clone(), state.summarise(elapsed)))
                .collect(),
            checks: self.checks.lock().clone(),
            thresholds,
        }
    }

    fn record(&self, name: &str, kind: MetricKind, update: impl FnOnce(&mut MetricState)) {
        let mut metrics = self.metrics.lock();
        let state = metrics.entry(name.to_string()).or_insert_with(|| match kind {
            MetricKind::Counter => MetricState::Counter(0),
            MetricKind::Rate => MetricState::Rate {
                passes: 0,
                total: 0,
            },
            MetricKind::Trend => MetricState::Trend(Vec::new()),
        });

        if state.kind() != kind {
            log::warn!(
                "Ignoring {} sample for metric `{}` which is already a {}",
                kind,
                name,
                state.kind()
            );
            return;
        }

        update(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Verdict;
    use pretty_assertions::assert_eq;

    fn thresholds(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(metric, exprs)| {
                (
                    metric.to_string(),
                    exprs.iter().map(|e| e.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn counters_rates_and_trends_accumulate() {
        let metrics = MetricsAggregator::new();
        metrics.add_counter("events_published", 1);
        metrics.add_counter("events_published", 2);
        metrics.add_rate("event_publish_success_rate", true);
        metrics.add_rate("event_publish_success_rate", false);
        metrics.add_trend("receive_latency", 10.0);
        metrics.add_trend("receive_latency", 30.0);

        assert_eq!(Some(3), metrics.counter("events_published"));
        assert_eq!(Some(0.5), metrics.rate("event_publish_success_rate"));
        assert_eq!(Some(20.0), metrics.trend("receive_latency").map(|t| t.avg));
    }

    #[test]
    fn mismatched_kind_is_ignored() {
        let metrics = MetricsAggregator::new();
        metrics.add_counter("iterations", 1);
        metrics.add_trend("iterations", 100.0);

        assert_eq!(Some(1), metrics.counter("iterations"));
        assert_eq!(None, metrics.trend("iterations"));
    }

    #[test]
    fn run_passes_when_every_threshold_holds() {
        let metrics = MetricsAggregator::with_thresholds(&thresholds(&[
            ("event_publish_success_rate", &["rate>=1.0"]),
            ("end_to_end_event_latency", &["p(95)<1000", "max<2000"]),
        ]))
        .unwrap();

        for _ in 0..10 {
            metrics.add_rate("event_publish_success_rate", true);
        }
        for latency in [120.0, 250.0, 480.0] {
            metrics.add_trend("end_to_end_event_latency", latency);
        }

        let report = metrics.evaluate();
        assert!(report.passed());
        assert_eq!(3, report.thresholds.len());
    }

    #[test]
    fn run_fails_when_any_threshold_fails() {
        let metrics = MetricsAggregator::with_thresholds(&thresholds(&[
            ("event_publish_success_rate", &["rate>=1.0"]),
            ("receive_latency", &["p(95)<500"]),
        ]))
        .unwrap();

        metrics.add_rate("event_publish_success_rate", true);
        metrics.add_rate("event_publish_success_rate", false);
        metrics.add_trend("receive_latency", 10.0);

        let report = metrics.evaluate();
        assert!(!report.passed());

        let failed: Vec<_> = report
            .failed_thresholds()
            .map(|o| o.metric.as_str())
            .collect();
        assert_eq!(vec!["event_publish_success_rate"], failed);
    }

    #[test]
    fn threshold_without_samples_reports_no_data() {
        let metrics = MetricsAggregator::with_thresholds(&thresholds(&[(
            "internal_outpost_event_latency",
            &["p(95)<500"],
        )]))
        .unwrap();

        let report = metrics.evaluate();
        assert!(report.passed());
        assert_eq!(Verdict::NoData, report.thresholds[0].verdict);
    }

    #[test]
    fn unsupported_aggregation_fails() {
        let metrics =
            MetricsAggregator::with_thresholds(&thresholds(&[("events_published", &["p(95)<1"])]))
                .unwrap();
        metrics.add_counter("events_published", 1);

        assert!(!metrics.evaluate().passed());
    }

    #[test]
    fn checks_feed_the_checks_rate() {
        let metrics = MetricsAggregator::new();
        assert!(metrics.check("event verified", true));
        assert!(!metrics.check("event verified", false));

        assert_eq!(
            CheckTally {
                passes: 1,
                fails: 1
            },
            metrics.check_tally("event verified")
        );
        assert_eq!(Some(0.5), metrics.rate(CHECKS));
    }

    #[test]
    fn operations_feed_http_metrics() {
        let metrics = MetricsAggregator::new();
        metrics.add_operation(&OperationRecord::new("publish").finish(false));
        metrics.add_operation(&OperationRecord::new("publish").finish(true));

        assert_eq!(Some(0.5), metrics.rate(HTTP_REQ_FAILED));
        assert_eq!(Some(2), metrics.trend(HTTP_REQ_DURATION).map(|t| t.count));
    }
}
