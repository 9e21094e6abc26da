use chrono::{DateTime, FixedOffset};

/// A timestamp reported by one of the systems under test, tagged with the format it was given in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexibleTimestamp {
    /// Unix seconds, recognised by having exactly 10 digits.
    Seconds(i64),
    /// Unix milliseconds, any other all-digit value.
    Millis(i64),
    Iso(DateTime<FixedOffset>),
}

impl FlexibleTimestamp {
    pub fn unix_millis(&self) -> i64 {
        match self {
            FlexibleTimestamp::Seconds(seconds) => seconds * 1000,
            FlexibleTimestamp::Millis(millis) => *millis,
            FlexibleTimestamp::Iso(time) => time.timestamp_millis(),
        }
    }
}

/// Parse a Unix timestamp in seconds or milliseconds, or an RFC 3339 date-time.
///
/// Returns `None` for anything else, leaving the caller to decide how to report it.
pub fn parse_flexible_timestamp(value: &str) -> Option<FlexibleTimestamp> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        let number = value.parse::<i64>().ok()?;
        return Some(if value.len() == 10 {
            FlexibleTimestamp::Seconds(number)
        } else {
            FlexibleTimestamp::Millis(number)
        });
    }

    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(FlexibleTimestamp::Iso)
}
