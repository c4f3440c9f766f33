//! Message transport between the proxies of two MeshBases in one process.
//!
//! The partner is looked up in the name server on every send, so a MeshBase
//! that died or was never registered shows up as `NoPartner` and the endpoint
//! keeps retrying. Every batch goes through the binary wire encoding.

use async_trait::async_trait;
use meshnet_pingpong::{EndpointError, MessageTransport};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::ReplError;
use crate::identifier::NetMeshBaseIdentifier;
use crate::nameserver::NameServer;
use crate::xpriso::XprisoMessage;

/// Delivers Xpriso batches to the partner MeshBase's proxy towards us.
pub struct NetMessageTransport {
    name_server: Arc<dyn NameServer>,
    here: NetMeshBaseIdentifier,
    there: NetMeshBaseIdentifier,
}

impl fmt::Debug for NetMessageTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetMessageTransport")
            .field("here", &self.here)
            .field("there", &self.there)
            .finish()
    }
}

impl NetMessageTransport {
    /// Create a transport from `here` to `there`.
    pub fn new(name_server: Arc<dyn NameServer>, here: NetMeshBaseIdentifier, there: NetMeshBaseIdentifier) -> Self {
        Self {
            name_server,
            here,
            there,
        }
    }

    fn send_failed(&self, e: ReplError) -> EndpointError {
        EndpointError::SendFailed {
            msg: format!("{} to {}: {}", self.here, self.there, e),
        }
    }
}

#[async_trait]
impl MessageTransport<XprisoMessage> for NetMessageTransport {
    async fn send_message(&self, token: u64, content: Vec<XprisoMessage>) -> meshnet_pingpong::Result<()> {
        let partner = self
            .name_server
            .get(&self.there)
            .ok_or_else(|| EndpointError::NoPartner {
                name: self.there.to_string(),
            })?;

        let mut delivered = Vec::with_capacity(content.len());
        for msg in &content {
            let bytes = msg.encode().map_err(|e| self.send_failed(e))?;
            delivered.push(XprisoMessage::decode(&bytes).map_err(|e| self.send_failed(e))?);
        }

        let proxy = partner.obtain_proxy_for(&self.here, None).map_err(|e| match e {
            ReplError::Shutdown => EndpointError::Dead,
            other => self.send_failed(other),
        })?;
        debug!(here = %self.here, there = %self.there, token = token, messages = delivered.len(), "delivering token");
        proxy.endpoint().incoming_message(token, delivered).await
    }

    fn wins_collision(&self) -> bool {
        self.here < self.there
    }
}
