use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

/// Source of wall-clock time and sleeping for components that poll or timestamp events.
///
/// Timestamps are Unix milliseconds so they can be compared with the timestamps reported by the
/// system under test.
#[async_trait]
pub trait Clock: Debug + Send + Sync {
    fn now_millis(&self) -> i64;

    async fn sleep(&self, duration: Duration);
}

/// The real clock, backed by the system time and the Tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only moves when told to. Sleeping advances the clock by the requested duration
/// and returns straight away.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn starting_at(now_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(now_millis),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now
            .fetch_add(duration.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::starting_at(1_000);
        clock.sleep(Duration::from_millis(250)).await;
        assert_eq!(1_250, clock.now_millis());

        clock.set(5);
        clock.advance(Duration::from_secs(1));
        assert_eq!(1_005, clock.now_millis());
    }
}
