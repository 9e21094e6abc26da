use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{CorrelationStore, StoreResult};

/// Correlation store backed by Redis.
///
/// The connection manager is cheap to clone and reconnects on its own, so each call works on its
/// own clone.
#[derive(Clone)]
pub struct RedisCorrelationStore {
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisCorrelationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCorrelationStore").finish_non_exhaustive()
    }
}

impl RedisCorrelationStore {
    pub async fn connect(connection_string: &str) -> StoreResult<Self> {
        let client = redis::Client::open(connection_string)?;
        let connection = ConnectionManager::new(client).await?;
        log::debug!("Connected to the correlation store");
        Ok(Self { connection })
    }
}

#[async_trait]
impl CorrelationStore for RedisCorrelationStore {
    async fn push_latest(&self, list_key: &str, event_id: &str) -> StoreResult<()> {
        let mut connection = self.connection.clone();
        let _: u64 = connection.lpush(list_key, event_id).await?;
        Ok(())
    }

    async fn pop_oldest(&self, list_key: &str) -> StoreResult<Option<String>> {
        let mut connection = self.connection.clone();
        let event_id: Option<String> = connection.rpop(list_key, None).await?;
        Ok(event_id)
    }

    async fn pop_arbitrary(&self, set_key: &str) -> StoreResult<Option<String>> {
        let mut connection = self.connection.clone();
        let member: Option<String> = connection.spop(set_key).await?;
        Ok(member)
    }

    async fn add_member(&self, set_key: &str, member: &str) -> StoreResult<()> {
        let mut connection = self.connection.clone();
        let _: u64 = connection.sadd(set_key, member).await?;
        Ok(())
    }

    async fn set_string(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut connection = self.connection.clone();
        let _: () = connection.set(key, value).await?;
        Ok(())
    }

    async fn get_string(&self, key: &str) -> StoreResult<Option<String>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.get(key).await?;
        Ok(value)
    }

    async fn take_string(&self, key: &str) -> StoreResult<Option<String>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut connection)
            .await?;
        Ok(value)
    }

    async fn delete_keys(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut connection = self.connection.clone();
        let deleted: u64 = connection.del(keys).await?;
        Ok(deleted)
    }

    async fn increment(&self, counter_key: &str) -> StoreResult<i64> {
        let mut connection = self.connection.clone();
        let value: i64 = connection.incr(counter_key, 1).await?;
        Ok(value)
    }

    async fn list_len(&self, list_key: &str) -> StoreResult<u64> {
        let mut connection = self.connection.clone();
        let len: u64 = connection.llen(list_key).await?;
        Ok(len)
    }
}
