//! Rendezvous between the publish and verify phases.

mod memory;
mod redis;

use std::fmt::Debug;

use async_trait::async_trait;

pub use self::memory::InMemoryCorrelationStore;
pub use self::redis::RedisCorrelationStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("correlation store request failed: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("correlation store error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key layout for one run. Every key is scoped by the run id so that runs do not interfere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationKeys {
    run_id: String,
}

impl CorrelationKeys {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    /// Ordered list of published event ids, newest first.
    pub fn list(&self) -> String {
        format!("events_list:{}", self.run_id)
    }

    /// Unordered fallback set of published event ids.
    pub fn set(&self) -> String {
        format!("events:{}", self.run_id)
    }

    pub fn count(&self) -> String {
        format!("events:{}:count", self.run_id)
    }

    /// Companion key holding the send timestamp of one event.
    pub fn sent_at(&self, event_id: &str) -> String {
        format!("event:{}:{}:sent_at", self.run_id, event_id)
    }

    /// Every key of the run that is not tied to a single event.
    pub fn run_keys(&self) -> Vec<String> {
        vec![self.list(), self.set(), self.count()]
    }
}

/// Atomic list, set, string and counter primitives of the correlation store.
///
/// Implementations rely on the atomicity of the backing store and add no locking of their own
/// that spans more than one call.
#[async_trait]
pub trait CorrelationStore: Debug + Send + Sync {
    /// Insert at the head of the list.
    async fn push_latest(&self, list_key: &str, event_id: &str) -> StoreResult<()>;

    /// Remove and return the tail of the list, which is the oldest entry.
    async fn pop_oldest(&self, list_key: &str) -> StoreResult<Option<String>>;

    /// Remove and return any member of the set.
    async fn pop_arbitrary(&self, set_key: &str) -> StoreResult<Option<String>>;

    async fn add_member(&self, set_key: &str, member: &str) -> StoreResult<()>;

    async fn set_string(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn get_string(&self, key: &str) -> StoreResult<Option<String>>;

    /// Remove and return a string in one atomic step. Of several concurrent callers at most one
    /// gets the value.
    async fn take_string(&self, key: &str) -> StoreResult<Option<String>>;

    /// Returns how many of the keys existed.
    async fn delete_keys(&self, keys: &[String]) -> StoreResult<u64>;

    async fn increment(&self, counter_key: &str) -> StoreResult<i64>;

    async fn list_len(&self, list_key: &str) -> StoreResult<u64>;

    /// Prefer draining the list oldest first, falling back to the unordered set once it is empty.
    async fn pop_oldest_or_arbitrary(
        &self,
        list_key: &str,
        set_key: &str,
    ) -> StoreResult<Option<String>> {
        match self.pop_oldest(list_key).await? {
            Some(event_id) => Ok(Some(event_id)),
            None => self.pop_arbitrary(set_key).await,
        }
    }
}
