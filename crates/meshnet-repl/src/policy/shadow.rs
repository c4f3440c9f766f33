//! Policy for the proxies of a ShadowMeshBase.
//!
//! A shadow only ever answers. It keeps conveyed objects only when its probe
//! is writable and the partner hands over home replica status with them; it
//! never gives home replica status away.

use tracing::debug;

use crate::change::Delta;
use crate::instructions::{ProxyProcessingInstructions, RippleInstructions};
use crate::policy::{InitiatingProxyPolicy, ProxyIdentity, ProxyPolicy, ReplicaView, DEFAULT_RPC_WAIT_MS};
use crate::xpriso::XprisoMessage;

/// Proxy policy used by shadows.
#[derive(Debug, Clone)]
pub struct ShadowProxyPolicy {
    writable_probe: bool,
    default_rpc_wait_ms: u64,
}

impl ShadowProxyPolicy {
    /// Create for a shadow whose probe does or does not accept writes.
    pub fn new(writable_probe: bool) -> Self {
        Self {
            writable_probe,
            default_rpc_wait_ms: DEFAULT_RPC_WAIT_MS,
        }
    }

    /// Whether the shadow's probe accepts writes.
    pub fn is_writable_probe(&self) -> bool {
        self.writable_probe
    }
}

impl ProxyPolicy for ShadowProxyPolicy {
    fn name(&self) -> &'static str {
        "shadow"
    }

    fn default_rpc_wait_ms(&self) -> u64 {
        self.default_rpc_wait_ms
    }

    fn as_initiating(&self) -> Option<&dyn InitiatingProxyPolicy> {
        None
    }

    fn process_requested_home_replicas(
        &self,
        _incoming: &XprisoMessage,
        _proxy: &ProxyIdentity,
        _view: &dyn ReplicaView,
        _ret: &mut ProxyProcessingInstructions,
        _outgoing: &mut XprisoMessage,
    ) {
    }

    fn process_conveyed_objects(
        &self,
        incoming: &XprisoMessage,
        _is_response: bool,
        proxy: &ProxyIdentity,
        view: &dyn ReplicaView,
        ret: &mut ProxyProcessingInstructions,
        outgoing: &mut XprisoMessage,
    ) {
        for current in &incoming.conveyed_objects {
            let identifier = &current.identifier;
            let got_lock = incoming.pushes_lock_for(identifier);
            let got_home = incoming.pushes_home_for(identifier);
            let want_it = view.find(identifier).is_none() && self.writable_probe && got_home;

            if want_it {
                ret.ripple_creates.push(RippleInstructions {
                    externalized: current.clone(),
                    proxies: vec![proxy.there.clone()],
                    home_proxy: None,
                    lock_proxy: if got_lock { None } else { Some(proxy.there.clone()) },
                });
            } else {
                debug!(
                    mesh_base = %proxy.here,
                    partner = %proxy.there,
                    object = %identifier,
                    "shadow declines conveyed object"
                );
                if got_lock {
                    outgoing.add_push_lock_object(identifier.clone());
                }
                if got_home {
                    outgoing.add_push_home_replica(identifier.clone());
                }
                outgoing.add_requested_canceled_object(identifier.clone());
            }
        }
    }

    fn accept_relationship_event(&self, delta: &Delta, view: &dyn ReplicaView) -> bool {
        view.find(&delta.source).is_some()
            && delta
                .referenced_objects()
                .into_iter()
                .all(|other| view.find(other).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeKind;
    use crate::identifier::{NetMeshBaseIdentifier, NetMeshObjectIdentifier};
    use crate::object::NetMeshObject;
    use crate::policy::testing::FakeView;

    fn base(s: &str) -> NetMeshBaseIdentifier {
        NetMeshBaseIdentifier::create(s).unwrap()
    }

    fn client() -> NetMeshBaseIdentifier {
        base("http://client/")
    }

    fn shadow() -> NetMeshBaseIdentifier {
        base("http://example.com/data")
    }

    fn id(local: &str) -> NetMeshObjectIdentifier {
        NetMeshObjectIdentifier::create(client(), Some(local)).unwrap()
    }

    fn at_shadow() -> ProxyIdentity {
        ProxyIdentity::new(shadow(), client())
    }

    fn pushed_with_home(local: &str) -> XprisoMessage {
        let mut incoming = XprisoMessage::new(client(), shadow());
        incoming.add_conveyed_object(NetMeshObject::new(id(local), 1).as_externalized(true));
        incoming.add_push_home_replica(id(local));
        incoming.add_push_lock_object(id(local));
        incoming
    }

    #[test]
    fn test_read_only_shadow_returns_pushed_home() {
        let view = FakeView::new("http://example.com/data");
        let policy = ShadowProxyPolicy::new(false);
        let ret = policy.calculate_for_incoming_message(&pushed_with_home("x"), false, &at_shadow(), &view);

        assert!(ret.ripple_creates.is_empty());
        assert!(ret.pushed_homes.is_empty());
        assert!(ret.pushed_locks.is_empty());
        let out = ret.send.unwrap();
        assert!(out.pushes_home_for(&id("x")));
        assert!(out.pushes_lock_for(&id("x")));
        assert_eq!(out.requested_canceled_objects, vec![id("x")]);
    }

    #[test]
    fn test_writable_shadow_takes_home_and_lock() {
        let view = FakeView::new("http://example.com/data");
        let policy = ShadowProxyPolicy::new(true);
        let ret = policy.calculate_for_incoming_message(&pushed_with_home("x"), false, &at_shadow(), &view);

        assert_eq!(ret.ripple_creates.len(), 1);
        let ripple = &ret.ripple_creates[0];
        assert_eq!(ripple.home_proxy, None);
        assert_eq!(ripple.lock_proxy, None);
        assert_eq!(ripple.proxies, vec![client()]);
        // created with both already here, nothing left to push
        assert!(ret.pushed_homes.is_empty());
        assert!(ret.pushed_locks.is_empty());
        assert!(ret.send.is_none());
    }

    #[test]
    fn test_writable_shadow_declines_without_home() {
        let view = FakeView::new("http://example.com/data");
        let mut incoming = XprisoMessage::new(client(), shadow());
        incoming.add_conveyed_object(NetMeshObject::new(id("x"), 1).as_externalized(true));

        let ret = ShadowProxyPolicy::new(true).calculate_for_incoming_message(&incoming, true, &at_shadow(), &view);
        assert!(ret.ripple_creates.is_empty());
        let out = ret.send.unwrap();
        assert!(!out.pushes_home_for(&id("x")));
        assert_eq!(out.requested_canceled_objects, vec![id("x")]);
    }

    #[test]
    fn test_home_requests_are_ignored() {
        let view = FakeView::new("http://example.com/data").with(NetMeshObject::new(id("x"), 1));
        let mut incoming = XprisoMessage::new(client(), shadow());
        incoming.add_requested_home_replica(id("x"));

        let ret = ShadowProxyPolicy::new(true).calculate_for_incoming_message(&incoming, false, &at_shadow(), &view);
        assert!(ret.surrender_homes.is_empty());
        assert!(ret.send.is_none());
    }

    #[test]
    fn test_relationship_needs_both_ends() {
        let view = FakeView::new("http://example.com/data").with(NetMeshObject::new(id("a"), 1));
        let policy = ShadowProxyPolicy::new(false);
        let mut delta = Delta {
            sequence: 1,
            source: id("a"),
            time_updated: 2,
            kind: ChangeKind::NeighborAdded { neighbor: id("b") },
        };
        assert!(!policy.accept_relationship_event(&delta, &view));

        let view = view.with(NetMeshObject::new(id("b"), 1));
        assert!(policy.accept_relationship_event(&delta, &view));

        delta.kind = ChangeKind::EquivalentsAdded {
            equivalents: vec![id("b"), id("c")],
        };
        assert!(!policy.accept_relationship_event(&delta, &view));
    }

    #[test]
    fn test_shadow_does_not_initiate() {
        assert!(ShadowProxyPolicy::new(true).as_initiating().is_none());
    }
}
