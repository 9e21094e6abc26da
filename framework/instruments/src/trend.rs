/// Percentile of an ascending slice using linear interpolation between the closest ranks.
///
/// `p` is in the range `0..=100`. Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        return Some(sorted[lower]);
    }

    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Distribution summary of a trend metric.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendStats {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
}

impl TrendStats {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let sorted = sorted_samples(samples);
        let first = *sorted.first()?;
        let last = *sorted.last()?;

        Some(Self {
            count: sorted.len(),
            avg: sorted.iter().sum::<f64>() / sorted.len() as f64,
            min: first,
            med: percentile(&sorted, 50.0)?,
            max: last,
            p90: percentile(&sorted, 90.0)?,
            p95: percentile(&sorted, 95.0)?,
        })
    }
}

pub(crate) fn sorted_samples(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}
