use std::{env, time::Duration};

use log::info;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client, Script};

use super::{KvStore, KvStoreError};

const REDIS_URL_DEFAULT: &str = "redis://127.0.0.1:6379";

// The get-compare-del must be a single script: a plain GET followed by DEL would let another holder
// acquire the key between the two calls and then be released by us.
const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
  return redis.call('del', KEYS[1])
else
  return 0
end
"#;

/// Redis-backed [`KvStore`]. This is the production backend: all replicas share lock and cache state
/// through it.
#[derive(Clone)]
pub struct RedisKvStore {
    connection: MultiplexedConnection,
}

impl RedisKvStore {
    pub async fn connect(url: &str) -> Result<Self, KvStoreError> {
        let client = Client::open(url).map_err(|e| KvStoreError::Backend(e.to_string()))?;
        let connection =
            client.get_multiplexed_async_connection().await.map_err(|e| KvStoreError::Backend(e.to_string()))?;
        Ok(Self { connection })
    }

    pub async fn connect_from_env() -> Result<Self, KvStoreError> {
        let url = env::var("COMMERCE_REDIS_URL").unwrap_or_else(|_| {
            info!("COMMERCE_REDIS_URL is not set. Using the default.");
            REDIS_URL_DEFAULT.to_string()
        });
        Self::connect(&url).await
    }

    fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by the server
    (ttl.as_millis() as u64).max(1)
}

impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvStoreError> {
        let mut conn = self.connection();
        let value: Option<String> = conn.get(key).await.map_err(|e| KvStoreError::Backend(e.to_string()))?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvStoreError> {
        let mut conn = self.connection();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| KvStoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvStoreError> {
        let mut conn = self.connection();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| KvStoreError::Backend(e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvStoreError> {
        let mut conn = self.connection();
        let removed: i64 = conn.del(key).await.map_err(|e| KvStoreError::Backend(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KvStoreError> {
        let mut conn = self.connection();
        let deleted: i64 = Script::new(COMPARE_AND_DELETE_SCRIPT)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| KvStoreError::Backend(e.to_string()))?;
        Ok(deleted == 1)
    }
}
