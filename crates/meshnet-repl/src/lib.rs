#![warn(missing_docs)]

//! MeshNet replication subsystem: networked MeshObject replicas, per-partner
//! proxies driven by proxy policies, Xpriso messages over ping-pong endpoints,
//! and probe-backed shadow MeshBases.

pub mod access;
pub mod change;
pub mod config;
pub mod error;
pub mod externalized;
pub mod identifier;
pub mod instructions;
pub mod meshbase;
pub mod nameserver;
pub mod object;
pub mod policy;
pub mod probe;
pub mod proxy;
pub mod transaction;
pub mod transport;
pub mod xpriso;

pub use access::{AccessOutcome, AccessResult, CoherenceSpecification, NetMeshObjectAccessSpecification};
pub use config::{ProbeConfig, ReplConfig};
pub use error::{ChangeError, ReplError, Result};
pub use externalized::{BincodeProxyEncoder, ExternalizedProxy, ExternalizedProxyEncoder, JsonProxyEncoder};
pub use identifier::{MeshTypeIdentifier, NetMeshBaseIdentifier, NetMeshObjectIdentifier};
pub use meshbase::NetMeshBase;
pub use nameserver::{MemoryNameServer, NameServer};
pub use object::{NetMeshObject, PropertyValue};
pub use policy::{DefaultProxyPolicy, InitiatingProxyPolicy, ProxyPolicy, ShadowProxyPolicy};
pub use probe::{Probe, ProbeDirectory, ProbeManager, ShadowMeshBase};
pub use proxy::Proxy;
pub use transaction::Transaction;
pub use xpriso::XprisoMessage;
