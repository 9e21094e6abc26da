use std::collections::{BTreeSet, HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CorrelationStore, StoreError, StoreResult};

#[derive(Debug)]
enum Entry {
    List(VecDeque<String>),
    Set(BTreeSet<String>),
    Text(String),
}

impl Entry {
    fn type_name(&self) -> &'static str {
        match self {
            Entry::List(_) => "list",
            Entry::Set(_) => "set",
            Entry::Text(_) => "string",
        }
    }
}

fn wrong_type(key: &str, entry: &Entry, expected: &str) -> StoreError {
    StoreError::Backend(format!(
        "key `{key}` holds a {} but a {expected} was expected",
        entry.type_name()
    ))
}

/// Correlation store held in process memory, with the same key semantics as Redis: one keyspace,
/// typed values and empty collections removed.
#[derive(Debug, Default)]
pub struct InMemoryCorrelationStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

#[async_trait]
impl CorrelationStore for InMemoryCorrelationStore {
    async fn push_latest(&self, list_key: &str, event_id: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock();
        match entries
            .entry(list_key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()))
        {
            Entry::List(list) => {
                list.push_front(event_id.to_string());
                Ok(())
            }
            other => Err(wrong_type(list_key, other, "list")),
        }
    }

    async fn pop_oldest(&self, list_key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock();
        let (popped, now_empty) = match entries.get_mut(list_key) {
            None => return Ok(None),
            Some(Entry::List(list)) => (list.pop_back(), list.is_empty()),
            Some(other) => return Err(wrong_type(list_key, other, "list")),
        };
        if now_empty {
            entries.remove(list_key);
        }
        Ok(popped)
    }

    async fn pop_arbitrary(&self, set_key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock();
        let (popped, now_empty) = match entries.get_mut(set_key) {
            None => return Ok(None),
            Some(Entry::Set(set)) => (set.pop_first(), set.is_empty()),
            Some(other) => return Err(wrong_type(set_key, other, "set")),
        };
        if now_empty {
            entries.remove(set_key);
        }
        Ok(popped)
    }

    async fn add_member(&self, set_key: &str, member: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock();
        match entries
            .entry(set_key.to_string())
            .or_insert_with(|| Entry::Set(BTreeSet::new()))
        {
            Entry::Set(set) => {
                set.insert(member.to_string());
                Ok(())
            }
            other => Err(wrong_type(set_key, other, "set")),
        }
    }

    async fn set_string(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), Entry::Text(value.to_string()));
        Ok(())
    }

    async fn get_string(&self, key: &str) -> StoreResult<Option<String>> {
        match self.entries.lock().get(key) {
            None => Ok(None),
            Some(Entry::Text(value)) => Ok(Some(value.clone())),
            Some(other) => Err(wrong_type(key, other, "string")),
        }
    }

    async fn take_string(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            None => return Ok(None),
            Some(Entry::Text(_)) => {}
            Some(other) => return Err(wrong_type(key, other, "string")),
        }
        match entries.remove(key) {
            Some(Entry::Text(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    async fn delete_keys(&self, keys: &[String]) -> StoreResult<u64> {
        let mut entries = self.entries.lock();
        Ok(keys
            .iter()
            .filter(|key| entries.remove(key.as_str()).is_some())
            .count() as u64)
    }

    async fn increment(&self, counter_key: &str) -> StoreResult<i64> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(counter_key.to_string())
            .or_insert_with(|| Entry::Text("0".to_string()));
        match entry {
            Entry::Text(value) => {
                let next = value
                    .parse::<i64>()
                    .map_err(|_| {
                        StoreError::Backend(format!(
                            "key `{counter_key}` does not hold an integer"
                        ))
                    })?
                    + 1;
                *value = next.to_string();
                Ok(next)
            }
            other => Err(wrong_type(counter_key, other, "string")),
        }
    }

    async fn list_len(&self, list_key: &str) -> StoreResult<u64> {
        match self.entries.lock().get(list_key) {
            None => Ok(0),
            Some(Entry::List(list)) => Ok(list.len() as u64),
            Some(other) => Err(wrong_type(list_key, other, "list")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn list_drains_oldest_first() {
        let store = InMemoryCorrelationStore::new();
        for id in ["e1", "e2", "e3"] {
            store.push_latest("events_list:r", id).await.unwrap();
        }

        assert_eq!(3, store.list_len("events_list:r").await.unwrap());
        assert_eq!(Some("e1".to_string()), store.pop_oldest("events_list:r").await.unwrap());
        assert_eq!(Some("e2".to_string()), store.pop_oldest("events_list:r").await.unwrap());
        assert_eq!(Some("e3".to_string()), store.pop_oldest("events_list:r").await.unwrap());
        assert_eq!(None, store.pop_oldest("events_list:r").await.unwrap());
        assert!(!store.contains_key("events_list:r"));
    }

    #[tokio::test]
    async fn falls_back_to_set_when_list_is_empty() {
        let store = InMemoryCorrelationStore::new();
        store.add_member("events:r", "e9").await.unwrap();
        store.push_latest("events_list:r", "e1").await.unwrap();

        assert_eq!(
            Some("e1".to_string()),
            store
                .pop_oldest_or_arbitrary("events_list:r", "events:r")
                .await
                .unwrap()
        );
        assert_eq!(
            Some("e9".to_string()),
            store
                .pop_oldest_or_arbitrary("events_list:r", "events:r")
                .await
                .unwrap()
        );
        assert_eq!(
            None,
            store
                .pop_oldest_or_arbitrary("events_list:r", "events:r")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn delete_counts_existing_keys_once() {
        let store = InMemoryCorrelationStore::new();
        store.set_string("event:r:e1:sent_at", "1714300000000").await.unwrap();

        let keys = vec!["event:r:e1:sent_at".to_string()];
        assert_eq!(1, store.delete_keys(&keys).await.unwrap());
        assert_eq!(0, store.delete_keys(&keys).await.unwrap());
        assert_eq!(None, store.get_string("event:r:e1:sent_at").await.unwrap());
    }

    #[tokio::test]
    async fn increment_counts_from_zero() {
        let store = InMemoryCorrelationStore::new();
        assert_eq!(1, store.increment("events:r:count").await.unwrap());
        assert_eq!(2, store.increment("events:r:count").await.unwrap());

        store.set_string("events:r:count", "0").await.unwrap();
        assert_eq!(1, store.increment("events:r:count").await.unwrap());
    }

    #[tokio::test]
    async fn mismatched_types_are_errors() {
        let store = InMemoryCorrelationStore::new();
        store.push_latest("k", "e1").await.unwrap();
        assert!(matches!(
            store.get_string("k").await,
            Err(StoreError::Backend(_))
        ));
        assert!(store.increment("k").await.is_err());
    }

    #[tokio::test]
    async fn take_string_hands_the_value_out_once() {
        let store = InMemoryCorrelationStore::new();
        store.set_string("event:r:e1:sent_at", "1714300000000").await.unwrap();

        assert_eq!(
            Some("1714300000000".to_string()),
            store.take_string("event:r:e1:sent_at").await.unwrap()
        );
        assert_eq!(None, store.take_string("event:r:e1:sent_at").await.unwrap());
        assert!(!store.contains_key("event:r:e1:sent_at"));

        store.push_latest("k", "e1").await.unwrap();
        assert!(store.take_string("k").await.is_err());
        assert!(store.contains_key("k"));
    }
}
