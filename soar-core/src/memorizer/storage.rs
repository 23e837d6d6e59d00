use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::Result;

/// Key-value contract behind the memorizer.
///
/// `get` and `set` are independent, non-transactional operations; concurrent
/// writers to one key are last-write-wins. A `ttl` of `None` stores forever.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemorizerStorage: Send + Sync {
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Process-local storage. Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MemorizerStorage for InMemoryStorage {
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        self.entries.write().await.remove(key);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let storage = InMemoryStorage::new();
        storage
            .set("soar:a", "[]".into(), Some(Duration::from_secs(30)))
            .await
            .unwrap();
        storage.set("soar:b", "[]".into(), None).await.unwrap();
        assert_eq!(storage.get("soar:a").await.unwrap().as_deref(), Some("[]"));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(storage.get("soar:a").await.unwrap(), None);
        assert_eq!(storage.get("soar:b").await.unwrap().as_deref(), Some("[]"));
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn last_write_wins() {
        let storage = InMemoryStorage::new();
        storage.set("k", "1".into(), None).await.unwrap();
        storage.set("k", "2".into(), None).await.unwrap();
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("2"));
    }
}
