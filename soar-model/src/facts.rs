//! Facts discovered by tools that drive fan-out.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::identity::Protocol;

/// DNS answers keyed by record kind (`A`, `AAAA`, `CNAME`, ...).
pub type DnsRecord = BTreeMap<String, Vec<String>>;

/// Record kinds whose values are IP literals.
pub const ADDRESS_RECORD_KINDS: [&str; 2] = ["A", "AAAA"];

/// IP literals found under `A`/`AAAA`, in record order. Non-literal values
/// are skipped.
pub fn resolved_addresses(record: &DnsRecord) -> Vec<String> {
    ADDRESS_RECORD_KINDS
        .iter()
        .filter_map(|kind| record.get(*kind))
        .flatten()
        .filter(|value| value.parse::<IpAddr>().is_ok())
        .cloned()
        .collect()
}

/// One open port reported by a scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortSpec {
    pub port: u16,
    pub protocol: Protocol,
}

impl PortSpec {
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }

    pub fn udp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Udp,
        }
    }
}

pub type Ports = Vec<PortSpec>;
