//! Processing instructions: what a proxy has to do, as computed by its policy.
//!
//! A policy never touches the MeshBase. It looks at a `ReplicaView` and emits
//! one `ProxyProcessingInstructions`, which the proxy then performs: local
//! replica changes in one transaction, requests to third proxies, and at most
//! one outgoing message.

use crate::access::NetMeshObjectAccessSpecification;
use crate::change::Delta;
use crate::externalized::ExternalizedNetMeshObject;
use crate::identifier::{NetMeshBaseIdentifier, NetMeshObjectIdentifier};
use crate::xpriso::XprisoMessage;

/// Create or resynchronize a replica from a conveyed snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RippleInstructions {
    /// The snapshot.
    pub externalized: ExternalizedNetMeshObject,
    /// Partners the local replica is replicated towards.
    pub proxies: Vec<NetMeshBaseIdentifier>,
    /// Direction of the home replica, `None` for here.
    pub home_proxy: Option<NetMeshBaseIdentifier>,
    /// Direction of the lock, `None` for here.
    pub lock_proxy: Option<NetMeshBaseIdentifier>,
}

impl RippleInstructions {
    /// Replica reached through `partner` only, with home and lock over there.
    pub fn via(externalized: ExternalizedNetMeshObject, partner: &NetMeshBaseIdentifier) -> Self {
        Self {
            externalized,
            proxies: vec![partner.clone()],
            home_proxy: Some(partner.clone()),
            lock_proxy: Some(partner.clone()),
        }
    }

    /// Identifier of the affected object.
    pub fn identifier(&self) -> &NetMeshObjectIdentifier {
        &self.externalized.identifier
    }
}

/// Which kind of answer a request waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    /// Replicas requested for the first time.
    Replica,
    /// Locks requested or pushed.
    Lock,
    /// Home replica status requested or pushed.
    Home,
}

/// Send `message` and wait up to `timeout_ms` for the partner's response.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitingSend {
    /// The request.
    pub message: XprisoMessage,
    /// What is being waited for.
    pub kind: WaitKind,
    /// How long to wait (milliseconds).
    pub timeout_ms: u64,
}

/// A request this proxy cannot answer itself: it has to be obtained from a third MeshBase first.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardRequest {
    /// Replicas reachable through `via`.
    Replicas {
        /// Proxy direction to ask.
        via: NetMeshBaseIdentifier,
        /// What to ask for, relative to `via`.
        specs: Vec<NetMeshObjectAccessSpecification>,
    },
    /// Locks currently held in direction `via`.
    Locks {
        /// Proxy direction to ask.
        via: NetMeshBaseIdentifier,
        /// The affected objects.
        identifiers: Vec<NetMeshObjectIdentifier>,
    },
    /// Home replicas currently in direction `via`.
    Homes {
        /// Proxy direction to ask.
        via: NetMeshBaseIdentifier,
        /// The affected objects.
        identifiers: Vec<NetMeshObjectIdentifier>,
    },
}

impl ForwardRequest {
    /// Proxy direction the request goes to.
    pub fn via(&self) -> &NetMeshBaseIdentifier {
        match self {
            ForwardRequest::Replicas { via, .. }
            | ForwardRequest::Locks { via, .. }
            | ForwardRequest::Homes { via, .. } => via,
        }
    }
}

/// Objects to be resynchronized or canceled through a third proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ThirdPartyInstructions {
    /// Partner to talk to.
    pub partner: NetMeshBaseIdentifier,
    /// The affected objects.
    pub identifiers: Vec<NetMeshObjectIdentifier>,
}

/// Everything one policy decision asks a proxy to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyProcessingInstructions {
    /// The message being answered, if any.
    pub incoming: Option<XprisoMessage>,
    /// Kick the endpoint so the outgoing message leaves without waiting for the partner.
    pub start_communicating: bool,
    /// Start replicating these objects towards the partner.
    pub register_replications: Vec<NetMeshObjectIdentifier>,
    /// Replicas to create.
    pub ripple_creates: Vec<RippleInstructions>,
    /// Replicas to overwrite with a newer snapshot.
    pub ripple_resynchronizes: Vec<RippleInstructions>,
    /// Incoming deltas to apply, in sender order.
    pub deltas: Vec<Delta>,
    /// The lock arrived from the partner.
    pub pushed_locks: Vec<NetMeshObjectIdentifier>,
    /// Home replica status arrived from the partner.
    pub pushed_homes: Vec<NetMeshObjectIdentifier>,
    /// Hand the lock to the partner.
    pub surrender_locks: Vec<NetMeshObjectIdentifier>,
    /// Hand home replica status to the partner.
    pub surrender_homes: Vec<NetMeshObjectIdentifier>,
    /// Stop replicating these towards the partner.
    pub cancels: Vec<NetMeshObjectIdentifier>,
    /// Resynchronization requests for other proxies.
    pub resynchronize_instructions: Vec<ThirdPartyInstructions>,
    /// Lease cancellations for other proxies.
    pub cancel_instructions: Vec<ThirdPartyInstructions>,
    /// Requests to pass on before answering.
    pub forwards: Vec<ForwardRequest>,
    /// Request to send and wait for.
    pub send_and_wait: Option<WaitingSend>,
    /// Message to send without waiting.
    pub send: Option<XprisoMessage>,
    /// The partner ends the relationship; tear the proxy down afterwards.
    pub cease_communications: bool,
}

impl ProxyProcessingInstructions {
    /// Returns true if performing these would do nothing.
    pub fn is_empty(&self) -> bool {
        !self.start_communicating
            && self.register_replications.is_empty()
            && self.ripple_creates.is_empty()
            && self.ripple_resynchronizes.is_empty()
            && self.deltas.is_empty()
            && self.pushed_locks.is_empty()
            && self.pushed_homes.is_empty()
            && self.surrender_locks.is_empty()
            && self.surrender_homes.is_empty()
            && self.cancels.is_empty()
            && self.resynchronize_instructions.is_empty()
            && self.cancel_instructions.is_empty()
            && self.forwards.is_empty()
            && self.send_and_wait.is_none()
            && self.send.is_none()
            && !self.cease_communications
    }

    /// Register replication towards the partner, once.
    pub fn add_register_replication(&mut self, identifier: NetMeshObjectIdentifier) {
        if !self.register_replications.contains(&identifier) {
            self.register_replications.push(identifier);
        }
    }

    /// Ask `partner` to resynchronize `identifier`.
    pub fn add_resynchronize_instruction(&mut self, partner: NetMeshBaseIdentifier, identifier: NetMeshObjectIdentifier) {
        add_third_party(&mut self.resynchronize_instructions, partner, identifier);
    }

    /// Cancel the lease on `identifier` held through `partner`.
    pub fn add_cancel_instruction(&mut self, partner: NetMeshBaseIdentifier, identifier: NetMeshObjectIdentifier) {
        add_third_party(&mut self.cancel_instructions, partner, identifier);
    }

    /// Send `outgoing` unless it is empty. Messages answering a request always go out.
    pub fn set_send_if_needed(&mut self, outgoing: XprisoMessage) {
        if !outgoing.is_empty() || outgoing.response_id.is_some() {
            self.start_communicating = true;
            self.send = Some(outgoing);
        }
    }
}

fn add_third_party(
    list: &mut Vec<ThirdPartyInstructions>,
    partner: NetMeshBaseIdentifier,
    identifier: NetMeshObjectIdentifier,
) {
    match list.iter_mut().find(|i| i.partner == partner) {
        Some(existing) => {
            if !existing.identifiers.contains(&identifier) {
                existing.identifiers.push(identifier);
            }
        }
        None => list.push(ThirdPartyInstructions {
            partner,
            identifiers: vec![identifier],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> NetMeshBaseIdentifier {
        NetMeshBaseIdentifier::create(s).unwrap()
    }

    fn id(local: &str) -> NetMeshObjectIdentifier {
        NetMeshObjectIdentifier::create(base("http://m1/"), Some(local)).unwrap()
    }

    #[test]
    fn test_default_is_empty() {
        assert!(ProxyProcessingInstructions::default().is_empty());
    }

    #[test]
    fn test_third_party_instructions_group_by_partner() {
        let mut ret = ProxyProcessingInstructions::default();
        ret.add_resynchronize_instruction(base("http://m3/"), id("a"));
        ret.add_resynchronize_instruction(base("http://m3/"), id("b"));
        ret.add_resynchronize_instruction(base("http://m3/"), id("a"));
        ret.add_resynchronize_instruction(base("http://m4/"), id("a"));
        assert_eq!(ret.resynchronize_instructions.len(), 2);
        assert_eq!(ret.resynchronize_instructions[0].identifiers, vec![id("a"), id("b")]);
        assert!(!ret.is_empty());
    }

    #[test]
    fn test_empty_message_is_not_sent_unless_response() {
        let mut ret = ProxyProcessingInstructions::default();
        let mut outgoing = XprisoMessage::new(base("http://m1/"), base("http://m2/"));
        ret.set_send_if_needed(outgoing.clone());
        assert!(ret.send.is_none());

        outgoing.response_id = Some(4);
        ret.set_send_if_needed(outgoing);
        assert!(ret.send.is_some());
        assert!(ret.start_communicating);
    }
}
