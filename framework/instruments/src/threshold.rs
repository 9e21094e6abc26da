use std::fmt::{Display, Formatter};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ThresholdParseError {
    #[error("threshold `{0}` has no comparison operator")]
    MissingOperator(String),
    #[error("threshold `{expression}` uses unknown aggregation `{aggregation}`")]
    UnknownAggregation {
        expression: String,
        aggregation: String,
    },
    #[error("threshold `{expression}` has an invalid bound `{bound}`")]
    InvalidBound { expression: String, bound: String },
}

/// How a metric is reduced to a single number before it is compared.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Count,
    Rate,
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
}

impl Display for Aggregation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Count => write!(f, "count"),
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

impl Aggregation {
    fn parse(expression: &str, raw: &str) -> Result<Self, ThresholdParseError> {
        let unknown = || ThresholdParseError::UnknownAggregation {
            expression: expression.to_string(),
            aggregation: raw.to_string(),
        };

        match raw {
            "count" => Ok(Aggregation::Count),
            "rate" => Ok(Aggregation::Rate),
            "avg" => Ok(Aggregation::Avg),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "med" => Ok(Aggregation::Med),
            _ => {
                let p = raw
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .and_then(|p| p.trim().parse::<f64>().ok())
                    .ok_or_else(unknown)?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(unknown());
                }
                Ok(Aggregation::Percentile(p))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }
}

/// A pass/fail condition on one metric, written as `<aggregation><operator><bound>`, for
/// example `p(95)<1000` or `rate>=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub expression: String,
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}

impl Threshold {
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ThresholdParseError> {
        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();

        let op_start = compact
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| ThresholdParseError::MissingOperator(expression.to_string()))?;
        let (aggregation, rest) = compact.split_at(op_start);

        let (comparison, bound) = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ]
        .into_iter()
        .find_map(|(token, comparison)| rest.strip_prefix(token).map(|bound| (comparison, bound)))
        .ok_or_else(|| ThresholdParseError::MissingOperator(expression.to_string()))?;

        let bound_value = bound
            .parse::<f64>()
            .map_err(|_| ThresholdParseError::InvalidBound {
                expression: expression.to_string(),
                bound: bound.to_string(),
            })?;

        Ok(Self {
            metric: metric.to_string(),
            expression: expression.to_string(),
            aggregation: Aggregation::parse(expression, aggregation)?,
            comparison,
            bound: bound_value,
        })
    }

    pub(crate) fn judge(&self, observed: Option<f64>) -> ThresholdOutcome {
        let verdict = match observed {
            None => Verdict::NoData,
            Some(value) if self.comparison.holds(value, self.bound) => Verdict::Pass,
            Some(_) => Verdict::Fail,
        };

        ThresholdOutcome {
            metric: self.metric.clone(),
            expression: self.expression.clone(),
            observed,
            verdict,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Verdict {
    #[display("pass")]
    Pass,
    #[display("FAIL")]
    Fail,
    #[display("no data")]
    NoData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub verdict: Verdict,
}

impl ThresholdOutcome {
    /// Thresholds without any samples to judge do not fail the run.
    pub fn passed(&self) -> bool {
        self.verdict != Verdict::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_percentile_threshold() {
        let threshold = Threshold::parse("http_req_duration", "p(95)<1000").unwrap();
        assert_eq!(Aggregation::Percentile(95.0), threshold.aggregation);
        assert_eq!(Comparison::Lt, threshold.comparison);
        assert_eq!(1000.0, threshold.bound);
    }

    #[test]
    fn parse_rate_threshold_with_spaces() {
        let threshold = Threshold::parse("event_publish_success_rate", "rate >= 1.0").unwrap();
        assert_eq!(Aggregation::Rate, threshold.aggregation);
        assert_eq!(Comparison::Ge, threshold.comparison);
        assert_eq!(1.0, threshold.bound);
    }

    #[test]
    fn reject_malformed_thresholds() {
        assert_eq!(
            Err(ThresholdParseError::MissingOperator("p(95)".to_string())),
            Threshold::parse("m", "p(95)")
        );
        assert!(matches!(
            Threshold::parse("m", "p95<10"),
            Err(ThresholdParseError::UnknownAggregation { .. })
        ));
        assert!(matches!(
            Threshold::parse("m", "p(101)<10"),
            Err(ThresholdParseError::UnknownAggregation { .. })
        ));
        assert!(matches!(
            Threshold::parse("m", "avg<ten"),
            Err(ThresholdParseError::InvalidBound { .. })
        ));
    }

    #[test]
    fn judge_against_bound() {
        let threshold = Threshold::parse("m", "rate<0.01").unwrap();
        assert_eq!(Verdict::Pass, threshold.judge(Some(0.0)).verdict);
        assert_eq!(Verdict::Fail, threshold.judge(Some(0.5)).verdict);

        let missing = threshold.judge(None);
        assert_eq!(Verdict::NoData, missing.verdict);
        assert!(missing.passed());
    }
}
