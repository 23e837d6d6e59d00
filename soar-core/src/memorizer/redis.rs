use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::info;

use super::storage::MemorizerStorage;
use crate::error::{Result, SoarError};

/// Memorizer storage on a shared Redis instance.
#[derive(Clone)]
pub struct RedisStorage {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisStorage {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!(target: "soar::memorizer", "connecting to redis cache");

        let client = redis::Client::open(redis_url)
            .map_err(|e| SoarError::Storage(format!("failed to create redis client: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SoarError::Storage(format!("failed to connect to redis: {e}")))?;

        info!(target: "soar::memorizer", "connected to redis cache");
        Ok(Self { conn })
    }
}

#[async_trait]
impl MemorizerStorage for RedisStorage {
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(|e| SoarError::Storage(format!("redis SETEX failed: {e}"))),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| SoarError::Storage(format!("redis SET failed: {e}"))),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| SoarError::Storage(format!("redis GET failed: {e}")))
    }
}
