use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use soar_model::AssetIdentity;

use crate::error::{Result, SoarError};

/// How a cache key is derived from a runner input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStrategy {
    /// Identity fields only. Metadata, response and success never affect the key.
    #[default]
    Asset,
    /// The whole JSON payload.
    General,
}

const ASSET_TAG: &[u8] = b"asset\n";
const GENERAL_TAG: &[u8] = b"general\n";

/// Writes `value` with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn sha256_hex(tag: &[u8], body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hex digest of a payload under `strategy`.
pub fn digest(strategy: HashStrategy, payload: &Value) -> Result<String> {
    match strategy {
        HashStrategy::General => Ok(sha256_hex(GENERAL_TAG, &canonical_json(payload))),
        HashStrategy::Asset => {
            let basic = payload
                .get("basic")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            let identity: AssetIdentity = serde_json::from_value(basic).map_err(|e| {
                SoarError::InvalidPayload(format!("cannot derive asset identity for hashing: {e}"))
            })?;
            // round-trip through the typed identity drops unknown and absent fields
            let normalized = serde_json::to_value(&identity)?;
            Ok(sha256_hex(ASSET_TAG, &canonical_json(&normalized)))
        }
    }
}
