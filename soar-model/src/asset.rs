use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MissingPropertyError, ModelError};
use crate::identity::AssetIdentity;

/// Open provenance map carried by every asset. Merged, never dropped.
pub type Metadata = Map<String, Value>;

/// A named blob attached to an asset (screenshot, raw HTTP body, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryAttachment {
    pub mime_type: String,
    /// Base64 (standard alphabet) encoded content.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl BinaryAttachment {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.data.as_bytes())
    }
}

/// One network-reachable entity under investigation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub basic: AssetIdentity,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Metadata,
    /// Payload attached by the most recent tool that processed the asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments: BTreeMap<String, BinaryAttachment>,
    /// Whether the last pipeline stage meaningfully advanced this asset.
    #[serde(default)]
    pub success: bool,
}

impl Asset {
    pub fn new(basic: AssetIdentity) -> Self {
        Self {
            basic,
            ..Self::default()
        }
    }

    pub fn from_domain(domain: impl Into<String>) -> Self {
        Self::new(AssetIdentity::domain(domain))
    }

    pub fn from_ip(ip: impl Into<String>) -> Self {
        Self::new(AssetIdentity::ip(ip))
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Coerces an arbitrary JSON payload into an asset.
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value, ModelError> {
        Ok(serde_json::to_value(self)?)
    }

    fn missing(&self, property: &'static str) -> MissingPropertyError {
        let rendered = serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self.basic));
        MissingPropertyError::new(property, rendered)
    }

    pub fn domain(&self) -> Result<&str, MissingPropertyError> {
        self.basic
            .domain
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| self.missing("basic.domain"))
    }

    pub fn ip(&self) -> Result<&str, MissingPropertyError> {
        self.basic
            .ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| self.missing("basic.ip"))
    }

    /// Domain when present, otherwise the IP.
    pub fn host(&self) -> Result<&str, MissingPropertyError> {
        self.domain()
            .or_else(|_| self.ip())
            .map_err(|_| self.missing("basic.host"))
    }

    pub fn port(&self) -> Result<u16, MissingPropertyError> {
        self.basic
            .port
            .filter(|p| *p != 0)
            .ok_or_else(|| self.missing("basic.port"))
    }

    pub fn host_and_port(&self) -> Result<String, MissingPropertyError> {
        Ok(format!("{}:{}", self.host()?, self.port()?))
    }

    /// Shallow-merges `extra` into the metadata map; existing keys are overwritten.
    pub fn merge_metadata(&mut self, extra: Metadata) {
        self.metadata.extend(extra);
    }

    /// A fresh asset with the given identity that keeps this asset's metadata.
    pub(crate) fn derive(&self, basic: AssetIdentity) -> Asset {
        Asset {
            basic,
            metadata: self.metadata.clone(),
            ..Asset::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accessors_report_missing_fields() {
        let asset = Asset::from_ip("10.1.1.1");
        assert_eq!(asset.host().unwrap(), "10.1.1.1");
        let err = asset.domain().unwrap_err();
        assert_eq!(err.property(), "basic.domain");
        assert!(err.to_string().contains("10.1.1.1"));
        assert_eq!(asset.port().unwrap_err().property(), "basic.port");
    }

    #[test]
    fn host_prefers_domain() {
        let mut asset = Asset::from_domain("example.com");
        asset.basic.ip = Some("1.2.3.4".into());
        asset.basic.port = Some(8443);
        assert_eq!(asset.host_and_port().unwrap(), "example.com:8443");
    }

    #[test]
    fn empty_identity_has_no_host() {
        let err = Asset::default().host().unwrap_err();
        assert_eq!(err.property(), "basic.host");
    }

    #[test]
    fn coerces_plain_json() {
        let asset = Asset::from_value(json!({
            "basic": { "domain": "example.com", "port": 80, "protocol": "tcp" },
            "metadata": { "source": "fofa" }
        }))
        .unwrap();
        assert_eq!(asset.port().unwrap(), 80);
        assert_eq!(asset.metadata["source"], "fofa");
        assert!(!asset.success);
    }

    #[test]
    fn attachment_round_trips_bytes() {
        let shot = BinaryAttachment::from_bytes("image/png", b"\x89PNG").with_file_name("shot.png");
        assert_eq!(shot.bytes().unwrap(), b"\x89PNG");
        assert_eq!(shot.file_name.as_deref(), Some("shot.png"));
    }
}
