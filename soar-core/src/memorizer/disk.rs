use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::storage::MemorizerStorage;
use crate::error::{Result, SoarError};

/// Stored value plus its absolute expiry.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at_ms: Option<i64>,
    value: String,
}

/// Memorizer storage in a local `cacache` directory.
///
/// `cacache` has no expiry of its own; entries carry their deadline and are
/// removed on the first read past it.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn remove(&self, key: &str) -> Result<()> {
        cacache::remove(&self.root, key)
            .await
            .map_err(|e| SoarError::Storage(format!("cacache remove failed: {e}")))
    }
}

#[async_trait]
impl MemorizerStorage for DiskStorage {
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let expires_at_ms = ttl.map(|ttl| {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            Utc::now().timestamp_millis().saturating_add(ttl_ms)
        });
        let bytes = serde_json::to_vec(&Envelope {
            expires_at_ms,
            value,
        })?;
        cacache::write(&self.root, key, bytes)
            .await
            .map_err(|e| SoarError::Storage(format!("cacache write failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let bytes = match cacache::read(&self.root, key).await {
            Ok(bytes) => bytes,
            Err(cacache::Error::EntryNotFound(_, _)) => return Ok(None),
            Err(cacache::Error::IntegrityError(err)) => {
                warn!(target: "soar::memorizer", key, error = %err, "dropping corrupt cache entry");
                self.remove(key).await?;
                return Ok(None);
            }
            Err(e) => return Err(SoarError::Storage(format!("cacache read failed: {e}"))),
        };

        let envelope: Envelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(target: "soar::memorizer", key, error = %err, "dropping unreadable cache entry");
                self.remove(key).await?;
                return Ok(None);
            }
        };
        if envelope
            .expires_at_ms
            .is_some_and(|at| Utc::now().timestamp_millis() >= at)
        {
            debug!(target: "soar::memorizer", key, "cache entry expired");
            self.remove(key).await?;
            return Ok(None);
        }
        Ok(Some(envelope.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        DiskStorage::new(dir.path())
            .set("soar:abc", r#"[{"json":{}}]"#.into(), None)
            .await
            .unwrap();

        let reopened = DiskStorage::new(dir.path());
        assert_eq!(
            reopened.get("soar:abc").await.unwrap().as_deref(),
            Some(r#"[{"json":{}}]"#)
        );
        assert_eq!(reopened.get("soar:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path());
        storage
            .set("soar:old", "[]".into(), Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(storage.get("soar:old").await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_envelope_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        cacache::write(dir.path(), "soar:bad", b"not an envelope".to_vec())
            .await
            .unwrap();

        let storage = DiskStorage::new(dir.path());
        assert_eq!(storage.get("soar:bad").await.unwrap(), None);
        assert!(matches!(
            cacache::read(dir.path(), "soar:bad").await,
            Err(cacache::Error::EntryNotFound(_, _))
        ));

        storage.set("soar:bad", "[]".into(), None).await.unwrap();
        assert_eq!(storage.get("soar:bad").await.unwrap().as_deref(), Some("[]"));
    }
}
