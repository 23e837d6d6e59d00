//! Core data model definitions shared across soar crates.
//!
//! An [`Asset`] is one network-reachable entity (host, IP, port, domain)
//! flowing through the recon pipeline. Runners exchange assets wrapped in
//! [`RunnerData`] records, which carry the success flag and the index of the
//! input the record descends from.
#![allow(missing_docs)]

pub mod asset;
pub mod error;
pub mod facts;
pub mod fanout;
pub mod identity;
pub mod record;

// Intentionally curated re-exports for downstream consumers.
pub use asset::{Asset, BinaryAttachment, Metadata};
pub use error::{MissingPropertyError, ModelError, Result as ModelResult};
pub use facts::{DnsRecord, PortSpec, Ports};
pub use identity::{AssetIdentity, IdentityKey, Protocol};
pub use record::{RunnerData, SourceIndex};
