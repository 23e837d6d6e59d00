use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Transport protocol of a discovered port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(ModelError::InvalidProtocol(other.to_string())),
        }
    }
}

/// The identity fields of an asset.
///
/// Serialized under the `basic` key of an asset so payloads stay compatible
/// with existing cache entries and upstream producers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

impl AssetIdentity {
    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..Self::default()
        }
    }

    pub fn ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            ..Self::default()
        }
    }

    /// Sets the port, rejecting 0 and values above 65535.
    pub fn with_port(mut self, port: u32, protocol: Option<Protocol>) -> Result<Self, ModelError> {
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(ModelError::InvalidPort(port))?;
        self.port = Some(port);
        self.protocol = protocol;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.ip.is_none() && self.domain.is_none() && self.port.is_none() && self.protocol.is_none()
    }

    pub fn key(&self) -> IdentityKey {
        IdentityKey {
            domain: self.domain.clone(),
            ip: self.ip.clone(),
            port: self.port,
            protocol: self.protocol,
        }
    }
}

/// Final identity tuple used to de-duplicate fan-out results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub domain: Option<String>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parses_case_insensitively() {
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("udp".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert!("sctp".parse::<Protocol>().is_err());
    }

    #[test]
    fn with_port_rejects_out_of_range() {
        assert!(AssetIdentity::domain("a.test").with_port(0, None).is_err());
        assert!(AssetIdentity::domain("a.test").with_port(70_000, None).is_err());
        let id = AssetIdentity::domain("a.test")
            .with_port(443, Some(Protocol::Tcp))
            .unwrap();
        assert_eq!(id.port, Some(443));
    }

    #[test]
    fn identity_omits_absent_fields() {
        let json = serde_json::to_value(AssetIdentity::ip("10.0.0.1")).unwrap();
        assert_eq!(json, serde_json::json!({ "ip": "10.0.0.1" }));
    }
}
