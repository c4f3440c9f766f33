//! Serializable snapshots of replicas and proxies.
//!
//! `ExternalizedNetMeshObject` is what travels inside an `XprisoMessage` when
//! an object is conveyed. `ExternalizedProxy` is everything a proxy needs to
//! resume after a restart without losing or re-delivering a batch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::access::CoherenceSpecification;
use crate::error::Result;
use crate::identifier::{MeshTypeIdentifier, NetMeshBaseIdentifier, NetMeshObjectIdentifier};
use crate::object::PropertyValue;
use crate::xpriso::XprisoMessage;

/// Full state of one replica as seen by its sender.
///
/// Proxy names are from the sender's point of view; `None` for home or lock
/// means the sender has it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalizedNetMeshObject {
    /// Identifier of the object.
    pub identifier: NetMeshObjectIdentifier,
    /// Types the object is blessed with.
    pub types: Vec<MeshTypeIdentifier>,
    /// Creation time (ms since epoch).
    pub time_created: u64,
    /// Last update time (ms since epoch).
    pub time_updated: u64,
    /// Last read time (ms since epoch).
    pub time_read: u64,
    /// Expiry time, if any.
    pub time_expires: Option<u64>,
    /// Property values.
    pub properties: BTreeMap<MeshTypeIdentifier, PropertyValue>,
    /// Neighbors with their role types.
    pub neighbors: BTreeMap<NetMeshObjectIdentifier, Vec<MeshTypeIdentifier>>,
    /// Equivalent objects.
    pub equivalents: Vec<NetMeshObjectIdentifier>,
    /// Whether the replica gives up home replica status when asked.
    pub will_give_up_home_replica: bool,
    /// Whether the replica gives up the lock when asked.
    pub will_give_up_lock: bool,
    /// Partners the sender replicates this object towards.
    pub proxy_names: Vec<NetMeshBaseIdentifier>,
    /// Sender's direction towards the home replica.
    pub home_proxy: Option<NetMeshBaseIdentifier>,
    /// Sender's direction towards the lock.
    pub lock_proxy: Option<NetMeshBaseIdentifier>,
}

/// Persistent state of a proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalizedProxy {
    /// When the proxy was created (ms since epoch).
    pub time_created: u64,
    /// When the proxy last changed (ms since epoch).
    pub time_updated: u64,
    /// When the proxy last processed a message (ms since epoch).
    pub time_read: u64,
    /// When the proxy expires, if ever.
    pub time_expires: Option<u64>,
    /// This end of the channel.
    pub here: NetMeshBaseIdentifier,
    /// The partner end of the channel.
    pub there: NetMeshBaseIdentifier,
    /// Coherence the proxy was created with.
    pub coherence: Option<CoherenceSpecification>,
    /// Token most recently sent.
    pub last_sent_token: Option<u64>,
    /// Token most recently received.
    pub last_received_token: Option<u64>,
    /// Messages waiting for the next new token.
    #[serde(rename = "messagesToSend")]
    pub messages_to_be_sent: Vec<XprisoMessage>,
    /// Exactly the batch carried by the last token sent.
    pub messages_last_sent: Vec<XprisoMessage>,
}

/// Turns an `ExternalizedProxy` into bytes and back.
pub trait ExternalizedProxyEncoder: Send + Sync {
    /// Short name of the encoding, e.g. for file extensions.
    fn encoding_id(&self) -> &'static str;

    /// Encode a proxy snapshot.
    fn encode(&self, proxy: &ExternalizedProxy) -> Result<Vec<u8>>;

    /// Decode a proxy snapshot.
    fn decode(&self, bytes: &[u8]) -> Result<ExternalizedProxy>;
}

/// Human-readable tagged document.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonProxyEncoder;

impl ExternalizedProxyEncoder for JsonProxyEncoder {
    fn encoding_id(&self) -> &'static str {
        "json"
    }

    fn encode(&self, proxy: &ExternalizedProxy) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(proxy)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<ExternalizedProxy> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Compact binary form.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeProxyEncoder;

impl ExternalizedProxyEncoder for BincodeProxyEncoder {
    fn encoding_id(&self) -> &'static str {
        "bincode"
    }

    fn encode(&self, proxy: &ExternalizedProxy) -> Result<Vec<u8>> {
        Ok(bincode::serialize(proxy)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<ExternalizedProxy> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::NetMeshObject;
    use proptest::prelude::*;

    fn base(s: &str) -> NetMeshBaseIdentifier {
        NetMeshBaseIdentifier::create(s).unwrap()
    }

    fn sample_message(local: &str) -> XprisoMessage {
        let mut msg = XprisoMessage::new(base("http://here/"), base("http://there/"));
        let id = NetMeshObjectIdentifier::create(base("http://here/"), Some(local)).unwrap();
        let mut obj = NetMeshObject::new(id.clone(), 42);
        obj.ripple_bless(&[MeshTypeIdentifier::new("Person")]).unwrap();
        obj.ripple_set_property(&MeshTypeIdentifier::new("Age"), Some(PropertyValue::Float(1.5)))
            .unwrap();
        msg.add_conveyed_object(obj.as_externalized(true));
        msg.add_push_lock_object(id);
        msg
    }

    fn sample_proxy(last_sent: Option<u64>, last_received: Option<u64>, expires: Option<u64>) -> ExternalizedProxy {
        ExternalizedProxy {
            time_created: 1,
            time_updated: 2,
            time_read: 3,
            time_expires: expires,
            here: base("http://here/"),
            there: base("http://there/"),
            coherence: Some(CoherenceSpecification::default()),
            last_sent_token: last_sent,
            last_received_token: last_received,
            messages_to_be_sent: vec![sample_message("queued")],
            messages_last_sent: vec![sample_message("inflight"), sample_message("inflight2")],
        }
    }

    #[test]
    fn test_json_uses_document_tags() {
        let json = String::from_utf8(JsonProxyEncoder.encode(&sample_proxy(Some(4), Some(3), None)).unwrap()).unwrap();
        for tag in [
            "timeCreated",
            "timeUpdated",
            "timeRead",
            "timeExpires",
            "here",
            "there",
            "lastSentToken",
            "lastReceivedToken",
            "messagesToSend",
            "messagesLastSent",
        ] {
            assert!(json.contains(&format!("\"{tag}\"")), "missing tag {tag}");
        }
    }

    #[test]
    fn test_bincode_rejects_garbage() {
        assert!(BincodeProxyEncoder.decode(&[0xff, 0x01]).is_err());
        assert!(JsonProxyEncoder.decode(b"{").is_err());
    }

    proptest! {
        #[test]
        fn prop_proxy_survives_encoding(
            sent in proptest::option::of(1u64..u64::MAX / 2),
            received in proptest::option::of(1u64..u64::MAX / 2),
            expires in proptest::option::of(any::<u64>()),
        ) {
            let proxy = sample_proxy(sent, received, expires);
            let encoders: [&dyn ExternalizedProxyEncoder; 2] = [&JsonProxyEncoder, &BincodeProxyEncoder];
            for encoder in encoders {
                let decoded = encoder.decode(&encoder.encode(&proxy).unwrap()).unwrap();
                prop_assert_eq!(&decoded, &proxy);
            }
        }
    }
}
