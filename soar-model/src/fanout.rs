//! Fan-out algebra: pure `Asset -> Vec<Asset>` derivations.
//!
//! Every split keeps the parent's metadata on its children and removes
//! duplicate identities, so applying a split twice to the same facts never
//! emits the same `(domain, ip, port, protocol)` tuple twice.

use std::collections::HashSet;

use crate::asset::Asset;
use crate::facts::{DnsRecord, PortSpec, resolved_addresses};
use crate::identity::AssetIdentity;

/// Drops assets whose identity tuple was already seen, keeping the first.
pub fn dedupe_by_identity(assets: Vec<Asset>) -> Vec<Asset> {
    let mut seen = HashSet::with_capacity(assets.len());
    assets
        .into_iter()
        .filter(|asset| seen.insert(asset.basic.key()))
        .collect()
}

impl Asset {
    /// The asset itself plus one child per discovered name. Children carry
    /// only the domain and are marked successful.
    pub fn split_by_subdomains<S: AsRef<str>>(&self, names: &[S]) -> Vec<Asset> {
        let mut out = Vec::with_capacity(names.len() + 1);
        out.push(self.clone());
        out.extend(
            names
                .iter()
                .map(|name| name.as_ref())
                .filter(|name| !name.is_empty())
                .map(|name| {
                    let mut child = self.derive(AssetIdentity::domain(name));
                    child.success = true;
                    child
                }),
        );
        dedupe_by_identity(out)
    }

    /// One child per `A`/`AAAA` literal, keeping the domain. When the record
    /// holds no address the asset is returned unchanged.
    pub fn split_by_resolved_records(&self, record: &DnsRecord) -> Vec<Asset> {
        let addresses = resolved_addresses(record);
        if addresses.is_empty() {
            return vec![self.clone()];
        }
        let children = addresses
            .into_iter()
            .map(|ip| {
                let mut child = self.derive(AssetIdentity {
                    domain: self.basic.domain.clone(),
                    ip: Some(ip),
                    ..AssetIdentity::default()
                });
                child.success = true;
                child
            })
            .collect();
        dedupe_by_identity(children)
    }

    /// One child per open port, keeping domain and IP. An empty port list
    /// returns the asset unchanged rather than dropping it.
    pub fn split_by_ports(&self, ports: &[PortSpec]) -> Vec<Asset> {
        if ports.is_empty() {
            return vec![self.clone()];
        }
        let children = ports
            .iter()
            .filter(|spec| spec.port != 0)
            .map(|spec| {
                let mut child = self.derive(AssetIdentity {
                    domain: self.basic.domain.clone(),
                    ip: self.basic.ip.clone(),
                    port: Some(spec.port),
                    protocol: Some(spec.protocol),
                });
                child.success = true;
                child
            })
            .collect::<Vec<_>>();
        if children.is_empty() {
            return vec![self.clone()];
        }
        dedupe_by_identity(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Protocol;
    use serde_json::json;

    fn annotated(domain: &str) -> Asset {
        let mut asset = Asset::from_domain(domain);
        asset.metadata.insert("program".into(), json!("acme"));
        asset.response = Some(json!({ "status": 200 }));
        asset
    }

    #[test]
    fn subdomains_keep_parent_and_metadata() {
        let parent = annotated("example.com");
        let out = parent.split_by_subdomains(&["a.example.com", "b.example.com"]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], parent);
        for child in &out[1..] {
            assert_eq!(child.metadata, parent.metadata);
            assert!(child.basic.ip.is_none() && child.basic.port.is_none());
            assert!(child.response.is_none());
        }
    }

    #[test]
    fn subdomain_split_is_idempotent() {
        let parent = annotated("example.com");
        let names = ["a.example.com", "a.example.com", "example.com"];
        let out = parent.split_by_subdomains(&names);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn records_replace_parent_with_resolved_children() {
        let parent = annotated("example.com");
        let mut record = DnsRecord::new();
        record.insert("A".into(), vec!["1.2.3.4".into(), "1.2.3.4".into()]);
        let out = parent.split_by_resolved_records(&record);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].basic.domain.as_deref(), Some("example.com"));
        assert_eq!(out[0].basic.ip.as_deref(), Some("1.2.3.4"));
        assert!(out[0].success);
    }

    #[test]
    fn records_without_addresses_return_parent() {
        let parent = annotated("example.com");
        assert_eq!(parent.split_by_resolved_records(&DnsRecord::new()), vec![parent.clone()]);
        let mut txt_only = DnsRecord::new();
        txt_only.insert("TXT".into(), vec!["v=spf1 -all".into()]);
        assert_eq!(parent.split_by_resolved_records(&txt_only), vec![parent]);
    }

    #[test]
    fn empty_port_list_returns_original() {
        let parent = annotated("example.com");
        assert_eq!(parent.split_by_ports(&[]), vec![parent]);
    }

    #[test]
    fn ports_fan_out_with_success() {
        let mut parent = annotated("example.com");
        parent.basic.ip = Some("1.2.3.4".into());
        let out = parent.split_by_ports(&[PortSpec::tcp(80), PortSpec::udp(53), PortSpec::tcp(80)]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].basic.port, Some(80));
        assert_eq!(out[0].basic.protocol, Some(Protocol::Tcp));
        assert_eq!(out[1].basic.protocol, Some(Protocol::Udp));
        assert!(out.iter().all(|a| a.success && a.metadata == parent.metadata));
        assert!(out.iter().all(|a| a.basic.ip.as_deref() == Some("1.2.3.4")));
    }
}
