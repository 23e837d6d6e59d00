use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::asset::Asset;
use crate::error::ModelError;

/// Position of the collector input a record descends from. `None` marks a
/// synthetic record with no single parent; such records are never cached.
pub type SourceIndex = Option<usize>;

/// The unit exchanged between runners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerData<T = Value> {
    pub json: T,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_input_index: SourceIndex,
}

impl<T> RunnerData<T> {
    pub fn new(json: T, source_input_index: SourceIndex) -> Self {
        Self {
            json,
            success: false,
            source_input_index,
        }
    }

    /// A record produced by a runner with no single parent input.
    pub fn synthetic(json: T) -> Self {
        Self::new(json, None)
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    /// Wraps every payload in `items` as a child of `source_input_index`.
    pub fn construct(source_input_index: SourceIndex, items: Vec<T>, success: bool) -> Vec<Self> {
        items
            .into_iter()
            .map(|json| Self {
                json,
                success,
                source_input_index,
            })
            .collect()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RunnerData<U> {
        RunnerData {
            json: f(self.json),
            success: self.success,
            source_input_index: self.source_input_index,
        }
    }
}

impl RunnerData<Value> {
    /// Coerces the JSON payload into an [`Asset`]. The asset's own success
    /// flag mirrors the record's.
    pub fn into_asset(self) -> Result<RunnerData<Asset>, ModelError> {
        let success = self.success;
        let source_input_index = self.source_input_index;
        let mut asset = Asset::from_value(self.json)?;
        asset.success = success;
        Ok(RunnerData {
            json: asset,
            success,
            source_input_index,
        })
    }
}

impl RunnerData<Asset> {
    /// Back to a JSON record. A record counts as successful when either the
    /// record or the asset was marked.
    pub fn into_value(self) -> Result<RunnerData<Value>, ModelError> {
        let success = self.success || self.json.success;
        let mut asset = self.json;
        asset.success = success;
        Ok(RunnerData {
            json: asset.to_value()?,
            success,
            source_input_index: self.source_input_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format_uses_camel_case() {
        let record = RunnerData::new(json!({ "basic": { "ip": "1.1.1.1" } }), Some(3));
        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["sourceInputIndex"], 3);
        assert_eq!(wire["success"], false);

        let synthetic = serde_json::to_value(RunnerData::synthetic(json!("x"))).unwrap();
        assert!(synthetic.get("sourceInputIndex").is_none());
    }

    #[test]
    fn asset_success_folds_into_record() {
        let record = RunnerData::new(json!({ "basic": { "domain": "a.test" } }), Some(0));
        let mut typed = record.into_asset().unwrap();
        assert!(!typed.json.success);
        typed.json.success = true;
        let back = typed.into_value().unwrap();
        assert!(back.success);
        assert_eq!(back.json["success"], true);
        assert_eq!(back.source_input_index, Some(0));
    }
}
