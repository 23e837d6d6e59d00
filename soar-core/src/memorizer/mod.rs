//! Content-addressed cache of prior runner outputs.
//!
//! A [`Memorizer`] maps one collector input to the records the runner chain
//! produced for it. Keys are `<namespace>:<hex sha256>` over a canonical JSON
//! form, so logically equal inputs share a key whatever their key order.
//! A load result of `None` means "never cached" and is distinct from
//! `Some(vec![])`, a cached empty result.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, warn};

use soar_model::RunnerData;

use crate::error::{Result, SoarError};

#[cfg(feature = "disk-cache")]
#[cfg_attr(docsrs, doc(cfg(feature = "disk-cache")))]
pub mod disk;
pub mod hash;
#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
pub mod redis;
pub mod storage;

pub use hash::{HashStrategy, canonical_json, digest};
pub use storage::{InMemoryStorage, MemorizerStorage};

pub const DEFAULT_NAMESPACE: &str = "soar";

#[derive(Clone)]
pub struct Memorizer {
    storage: Arc<dyn MemorizerStorage>,
    namespace: String,
    ttl: Option<Duration>,
    strategy: HashStrategy,
}

impl fmt::Debug for Memorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memorizer")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl Memorizer {
    pub fn new(storage: Arc<dyn MemorizerStorage>, strategy: HashStrategy) -> Self {
        Self {
            storage,
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl: None,
            strategy,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl.filter(|ttl| !ttl.is_zero());
        self
    }

    /// Non-positive seconds store forever.
    pub fn with_ttl_secs(self, ttl_secs: i64) -> Self {
        let ttl = u64::try_from(ttl_secs).ok().map(Duration::from_secs);
        self.with_ttl(ttl)
    }

    pub fn strategy(&self) -> HashStrategy {
        self.strategy
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Storage key for `input`. Only the payload is hashed; the success flag
    /// and the input position never change the key.
    pub fn hash(&self, input: &RunnerData) -> Result<String> {
        Ok(format!(
            "{}:{}",
            self.namespace,
            digest(self.strategy, &input.json)?
        ))
    }

    pub async fn save(&self, input: &RunnerData, outputs: &[RunnerData]) -> Result<()> {
        let key = self.hash(input)?;
        let value = serde_json::to_string(outputs)?;
        debug!(target: "soar::memorizer", %key, records = outputs.len(), ttl = ?self.ttl, "cache SET");
        self.storage.set(&key, value, self.ttl).await
    }

    pub async fn load(&self, input: &RunnerData) -> Result<Option<Vec<RunnerData>>> {
        let key = self.hash(input)?;
        debug!(target: "soar::memorizer", %key, "cache GET");
        let Some(raw) = self.storage.get(&key).await? else {
            debug!(target: "soar::memorizer", %key, "cache MISS");
            return Ok(None);
        };
        match serde_json::from_str::<Vec<RunnerData<Value>>>(&raw) {
            Ok(records) => {
                debug!(target: "soar::memorizer", %key, records = records.len(), "cache HIT");
                Ok(Some(records))
            }
            Err(e) => {
                warn!(target: "soar::memorizer", %key, error = %e, "unreadable cache entry treated as miss");
                Ok(None)
            }
        }
    }

    /// Saves `outputs[i]` under the key of `inputs[i]`.
    pub async fn batch_save(&self, inputs: &[RunnerData], outputs: &[Vec<RunnerData>]) -> Result<()> {
        if inputs.len() != outputs.len() {
            return Err(SoarError::CacheConsistency {
                inputs: inputs.len(),
                outputs: outputs.len(),
            });
        }
        try_join_all(
            inputs
                .iter()
                .zip(outputs)
                .map(|(input, output)| self.save(input, output)),
        )
        .await?;
        Ok(())
    }

    /// One entry per input, in input order.
    pub async fn batch_load(&self, inputs: &[RunnerData]) -> Result<Vec<Option<Vec<RunnerData>>>> {
        try_join_all(inputs.iter().map(|input| self.load(input))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::{always, eq};
    use serde_json::json;
    use storage::MockMemorizerStorage;

    fn asset(domain: &str, idx: usize) -> RunnerData {
        RunnerData::new(json!({ "basic": { "domain": domain } }), Some(idx))
    }

    fn memorizer() -> Memorizer {
        Memorizer::new(Arc::new(InMemoryStorage::new()), HashStrategy::Asset)
    }

    #[tokio::test]
    async fn batch_round_trip_keeps_positions() {
        let memo = memorizer();
        let inputs = vec![asset("a.test", 0), asset("b.test", 1)];
        let outputs = vec![
            vec![asset("a.test", 0).with_success(true), asset("x.a.test", 0)],
            vec![],
        ];
        memo.batch_save(&inputs, &outputs).await.unwrap();

        let loaded = memo
            .batch_load(&[inputs[1].clone(), asset("fresh.test", 2), inputs[0].clone()])
            .await
            .unwrap();
        assert_eq!(loaded[0], Some(vec![]));
        assert_eq!(loaded[1], None);
        assert_eq!(loaded[2].as_ref(), Some(&outputs[0]));
    }

    #[tokio::test]
    async fn mismatched_batches_are_rejected() {
        let memo = memorizer();
        let err = memo
            .batch_save(&[asset("a.test", 0)], &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SoarError::CacheConsistency {
                inputs: 1,
                outputs: 0
            }
        ));
    }

    #[test]
    fn key_ignores_position_and_annotations() {
        let memo = memorizer().with_namespace("recon");
        let mut annotated = asset("a.test", 7).with_success(true);
        annotated.json["metadata"] = json!({ "program": "acme" });
        let key = memo.hash(&asset("a.test", 0)).unwrap();
        assert!(key.starts_with("recon:"));
        assert_eq!(key, memo.hash(&annotated).unwrap());
    }

    #[tokio::test]
    async fn ttl_is_forwarded_to_storage() {
        let mut storage = MockMemorizerStorage::new();
        storage
            .expect_set()
            .with(always(), eq("[]".to_string()), eq(Some(Duration::from_secs(60))))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let memo = Memorizer::new(Arc::new(storage), HashStrategy::General).with_ttl_secs(60);
        memo.save(&asset("a.test", 0), &[]).await.unwrap();
    }

    #[test]
    fn non_positive_ttl_stores_forever() {
        assert_eq!(memorizer().with_ttl_secs(0).ttl, None);
        assert_eq!(memorizer().with_ttl_secs(-5).ttl, None);
    }

    #[tokio::test]
    async fn corrupt_entries_read_as_miss() {
        let mut storage = MockMemorizerStorage::new();
        storage
            .expect_get()
            .returning(|_| Ok(Some("not json".to_string())));
        let memo = Memorizer::new(Arc::new(storage), HashStrategy::Asset);
        assert_eq!(memo.load(&asset("a.test", 0)).await.unwrap(), None);
    }
}
