//! Proxy policies.
//!
//! A policy is the only place that decides what a proxy does: which incoming
//! conveyed objects to keep, whether to hand out a lock, what to tell the
//! partner after a local commit. Policies are pure: they read a
//! `ReplicaView` and return `ProxyProcessingInstructions` for the proxy to
//! perform.
//!
//! Initiating operations (obtaining replicas, locks and home replicas on our
//! own behalf) are a separate capability, `InitiatingProxyPolicy`. A policy
//! that never initiates simply does not provide it.

pub mod default;
pub mod shadow;

pub use default::DefaultProxyPolicy;
pub use shadow::ShadowProxyPolicy;

use std::collections::BTreeMap;
use std::fmt;

use crate::access::NetMeshObjectAccessSpecification;
use crate::change::{ChangeKind, Delta, NetChange};
use crate::identifier::{NetMeshBaseIdentifier, NetMeshObjectIdentifier};
use crate::instructions::{ForwardRequest, ProxyProcessingInstructions, RippleInstructions};
use crate::object::NetMeshObject;
use crate::xpriso::XprisoMessage;

/// How long to wait for a partner when the caller does not say (milliseconds).
pub const DEFAULT_RPC_WAIT_MS: u64 = 5000;

/// Read-only access to the replicas of the MeshBase a policy decides for.
pub trait ReplicaView {
    /// The MeshBase holding the replicas.
    fn here(&self) -> &NetMeshBaseIdentifier;

    /// The replica with this identifier.
    fn find(&self, identifier: &NetMeshObjectIdentifier) -> Option<&NetMeshObject>;

    /// A replica that lists `identifier` among its equivalents.
    fn find_equivalent(&self, identifier: &NetMeshObjectIdentifier) -> Option<&NetMeshObject>;

    /// Whether the MeshBase keeps every lock, whatever its objects say.
    fn refuses_to_give_up_lock(&self) -> bool {
        false
    }

    /// Whether the MeshBase keeps every home replica, whatever its objects say.
    fn refuses_to_give_up_home(&self) -> bool {
        false
    }

    /// Whether `obj` hands out its lock when asked.
    fn gives_up_lock(&self, obj: &NetMeshObject) -> bool {
        obj.will_give_up_lock() && !self.refuses_to_give_up_lock()
    }

    /// Whether `obj` hands out home replica status when asked.
    fn gives_up_home(&self, obj: &NetMeshObject) -> bool {
        obj.will_give_up_home_replica() && !self.refuses_to_give_up_home()
    }
}

/// The two ends of the proxy a decision is made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyIdentity {
    /// Our MeshBase.
    pub here: NetMeshBaseIdentifier,
    /// The partner MeshBase.
    pub there: NetMeshBaseIdentifier,
}

impl ProxyIdentity {
    /// Create an identity.
    pub fn new(here: NetMeshBaseIdentifier, there: NetMeshBaseIdentifier) -> Self {
        Self { here, there }
    }

    /// An empty message from here to there.
    pub fn outgoing_message(&self) -> XprisoMessage {
        XprisoMessage::new(self.here.clone(), self.there.clone())
    }
}

/// Decides what a proxy does in response to incoming messages, commits and requests.
pub trait ProxyPolicy: Send + Sync + fmt::Debug {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Wait used when a caller does not give a timeout (milliseconds).
    fn default_rpc_wait_ms(&self) -> u64 {
        DEFAULT_RPC_WAIT_MS
    }

    /// If true, conveyed snapshots claim to be the home replica with the lock,
    /// so receivers point all their replicas back at us.
    fn points_replicas_to_itself(&self) -> bool {
        false
    }

    /// The initiating capability, if this policy has it.
    fn as_initiating(&self) -> Option<&dyn InitiatingProxyPolicy>;

    /// Resolve a caller-supplied timeout.
    fn calculate_timeout_ms(&self, requested: Option<u64>) -> u64 {
        requested.unwrap_or_else(|| self.default_rpc_wait_ms())
    }

    /// Decide what to do with one incoming message.
    fn calculate_for_incoming_message(
        &self,
        incoming: &XprisoMessage,
        is_response: bool,
        proxy: &ProxyIdentity,
        view: &dyn ReplicaView,
    ) -> ProxyProcessingInstructions {
        let mut ret = ProxyProcessingInstructions {
            incoming: Some(incoming.clone()),
            ..Default::default()
        };
        let mut outgoing = proxy.outgoing_message();
        outgoing.response_id = incoming.request_id;

        process_requested_first_time_objects(incoming, proxy, view, self.points_replicas_to_itself(), &mut ret, &mut outgoing);
        process_requested_resynchronize_replicas(incoming, proxy, view, self.points_replicas_to_itself(), &mut ret, &mut outgoing);
        self.process_requested_home_replicas(incoming, proxy, view, &mut ret, &mut outgoing);
        process_requested_lock_objects(incoming, proxy, view, self.points_replicas_to_itself(), &mut ret, &mut outgoing);
        process_reclaimed_lock_objects(incoming, view, &mut ret);
        process_canceled_objects(incoming, view, &mut ret);
        self.process_conveyed_objects(incoming, is_response, proxy, view, &mut ret, &mut outgoing);
        process_pushed_locks(incoming, view, &mut ret);
        process_pushed_homes(incoming, view, &mut ret);
        for delta in incoming.deltas_in_order() {
            let known = view.find(&delta.source).is_some()
                || ret.ripple_creates.iter().any(|r| r.identifier() == &delta.source);
            if !known {
                continue;
            }
            if delta.is_relationship_change() && !self.accept_relationship_event(delta, view) {
                continue;
            }
            ret.deltas.push(delta.clone());
        }

        if incoming.cease_communications {
            ret.cease_communications = true;
        } else {
            ret.set_send_if_needed(outgoing);
        }
        ret
    }

    /// The partner asks for home replica status.
    fn process_requested_home_replicas(
        &self,
        incoming: &XprisoMessage,
        proxy: &ProxyIdentity,
        view: &dyn ReplicaView,
        ret: &mut ProxyProcessingInstructions,
        outgoing: &mut XprisoMessage,
    ) {
        let mut forwards: BTreeMap<NetMeshBaseIdentifier, Vec<NetMeshObjectIdentifier>> = BTreeMap::new();
        for identifier in &incoming.requested_home_replicas {
            let Some(obj) = view.find(identifier) else {
                continue;
            };
            if !view.gives_up_home(obj) {
                continue;
            }
            match obj.proxy_towards_home() {
                None => {
                    potentially_convey(obj, outgoing, proxy, self.points_replicas_to_itself());
                    ret.surrender_homes.push(identifier.clone());
                    outgoing.add_push_home_replica(identifier.clone());
                }
                Some(towards) if towards != &proxy.there => {
                    forwards.entry(towards.clone()).or_default().push(identifier.clone());
                }
                Some(_) => {}
            }
        }
        for (via, identifiers) in forwards {
            ret.forwards.push(ForwardRequest::Homes { via, identifiers });
        }
    }

    /// The partner sent object snapshots. Decide which to create, resynchronize or decline.
    fn process_conveyed_objects(
        &self,
        incoming: &XprisoMessage,
        is_response: bool,
        proxy: &ProxyIdentity,
        view: &dyn ReplicaView,
        ret: &mut ProxyProcessingInstructions,
        outgoing: &mut XprisoMessage,
    ) {
        for current in &incoming.conveyed_objects {
            let identifier = &current.identifier;
            let ripple = RippleInstructions::via(current.clone(), &proxy.there);
            let different_home = current
                .home_proxy
                .as_ref()
                .map(|home| home != &proxy.there)
                .unwrap_or(false);
            let solicited = is_response || incoming.pushes_lock_for(identifier) || incoming.pushes_home_for(identifier);

            match view.find(identifier) {
                None => {
                    if solicited {
                        ret.ripple_creates.push(ripple);
                        if different_home {
                            if let Some(home) = &current.home_proxy {
                                ret.add_resynchronize_instruction(home.clone(), identifier.clone());
                            }
                        }
                    } else {
                        outgoing.add_requested_canceled_object(identifier.clone());
                    }
                }
                Some(found) => match found.proxy_towards_home() {
                    Some(home) if home == &proxy.there => {
                        if different_home {
                            ret.ripple_resynchronizes.push(ripple);
                            if let Some(home) = &current.home_proxy {
                                ret.add_resynchronize_instruction(home.clone(), identifier.clone());
                            }
                        }
                    }
                    Some(home) => {
                        ret.add_cancel_instruction(home.clone(), identifier.clone());
                        if !different_home {
                            ret.ripple_resynchronizes.push(ripple);
                        }
                    }
                    None => {
                        tracing::debug!(
                            mesh_base = %proxy.here,
                            partner = %proxy.there,
                            object = %identifier,
                            "ignoring conveyed snapshot of a home replica"
                        );
                    }
                },
            }
        }
    }

    /// Whether to apply an incoming neighbor, role or equivalent change.
    fn accept_relationship_event(&self, _delta: &Delta, _view: &dyn ReplicaView) -> bool {
        true
    }

    /// Work out what the partner needs to hear about a committed transaction.
    fn calculate_for_transaction_committed(
        &self,
        changes: &[NetChange],
        proxy: &ProxyIdentity,
        view: &dyn ReplicaView,
    ) -> Option<ProxyProcessingInstructions> {
        let mut ret = ProxyProcessingInstructions::default();
        let mut outgoing = proxy.outgoing_message();
        let mut convey_candidates: Vec<NetMeshObjectIdentifier> = Vec::new();

        for change in changes.iter().filter(|c| c.should_be_sent(&proxy.there)) {
            match &change.delta.kind {
                ChangeKind::ReplicaPurged => outgoing.add_requested_canceled_object(change.source().clone()),
                ChangeKind::Created => {}
                ChangeKind::NeighborAdded { neighbor } => {
                    outgoing.add_delta(change.delta.clone());
                    convey_candidates.push(neighbor.clone());
                }
                _ => outgoing.add_delta(change.delta.clone()),
            }
        }
        for neighbor in convey_candidates {
            let Some(obj) = view.find(&neighbor) else {
                continue;
            };
            if outgoing.conveys(&neighbor) || obj.has_replica_towards(&proxy.there) {
                continue;
            }
            potentially_convey(obj, &mut outgoing, proxy, self.points_replicas_to_itself());
            ret.add_register_replication(neighbor);
        }

        ret.set_send_if_needed(outgoing);
        if ret.is_empty() {
            None
        } else {
            Some(ret)
        }
    }

    /// Tell the partner we took the locks back.
    fn calculate_for_force_obtain_locks(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        proxy: &ProxyIdentity,
    ) -> ProxyProcessingInstructions {
        let mut outgoing = proxy.outgoing_message();
        for identifier in identifiers {
            outgoing.add_reclaimed_lock_object(identifier.clone());
        }
        send_now(outgoing)
    }

    /// Ask the partner for fresh snapshots.
    fn calculate_for_try_resynchronize_replicas(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        proxy: &ProxyIdentity,
    ) -> ProxyProcessingInstructions {
        let mut outgoing = proxy.outgoing_message();
        for identifier in identifiers {
            outgoing.add_requested_resynchronize_replica(identifier.clone());
        }
        send_now(outgoing)
    }

    /// Tell the partner we no longer want updates for these replicas.
    fn calculate_for_cancel_replicas(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        proxy: &ProxyIdentity,
    ) -> ProxyProcessingInstructions {
        let mut outgoing = proxy.outgoing_message();
        for identifier in identifiers {
            outgoing.add_requested_canceled_object(identifier.clone());
        }
        send_now(outgoing)
    }

    /// End the relationship with the partner.
    fn calculate_for_cease_communications(&self, proxy: &ProxyIdentity) -> ProxyProcessingInstructions {
        let mut outgoing = proxy.outgoing_message();
        outgoing.cease_communications = true;
        let mut ret = send_now(outgoing);
        ret.cease_communications = true;
        ret
    }
}

/// Obtaining replicas, locks and home replicas on our own behalf.
pub trait InitiatingProxyPolicy: Send + Sync {
    /// Ask the partner for replicas. `timeout_ms` of `None` means the default wait.
    fn calculate_for_obtain_replicas(
        &self,
        specs: &[NetMeshObjectAccessSpecification],
        timeout_ms: Option<u64>,
        proxy: &ProxyIdentity,
    ) -> ProxyProcessingInstructions;

    /// Ask the partner for the locks of these local replicas.
    fn calculate_for_try_to_obtain_locks(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        timeout_ms: Option<u64>,
        proxy: &ProxyIdentity,
    ) -> ProxyProcessingInstructions;

    /// Hand the locks held here to the partner, conveying objects it does not have yet.
    fn calculate_for_try_to_push_locks(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        timeout_ms: Option<u64>,
        proxy: &ProxyIdentity,
        view: &dyn ReplicaView,
    ) -> ProxyProcessingInstructions;

    /// Ask the partner for home replica status of these local replicas.
    fn calculate_for_try_to_obtain_home_replicas(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        timeout_ms: Option<u64>,
        proxy: &ProxyIdentity,
    ) -> ProxyProcessingInstructions;

    /// Hand home replica status held here to the partner.
    fn calculate_for_try_to_push_home_replicas(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        timeout_ms: Option<u64>,
        proxy: &ProxyIdentity,
        view: &dyn ReplicaView,
    ) -> ProxyProcessingInstructions;
}

fn send_now(outgoing: XprisoMessage) -> ProxyProcessingInstructions {
    ProxyProcessingInstructions {
        start_communicating: true,
        send: Some(outgoing),
        ..Default::default()
    }
}

/// Add a snapshot of `obj` to `outgoing` unless it is there already.
/// Returns true if the partner did not have a replica yet.
pub(crate) fn potentially_convey(
    obj: &NetMeshObject,
    outgoing: &mut XprisoMessage,
    proxy: &ProxyIdentity,
    points_replicas_to_itself: bool,
) -> bool {
    if outgoing.conveys(obj.identifier()) {
        return false;
    }
    outgoing.add_conveyed_object(obj.as_externalized(!points_replicas_to_itself));
    !obj.has_replica_towards(&proxy.there)
}

fn strip_hops(spec: &NetMeshObjectAccessSpecification, here: &NetMeshBaseIdentifier) -> NetMeshObjectAccessSpecification {
    let mut spec = spec.clone();
    while spec.path().first().map(|hop| &hop.base == here).unwrap_or(false) {
        spec = spec.remainder();
    }
    spec
}

fn process_requested_first_time_objects(
    incoming: &XprisoMessage,
    proxy: &ProxyIdentity,
    view: &dyn ReplicaView,
    points_replicas_to_itself: bool,
    ret: &mut ProxyProcessingInstructions,
    outgoing: &mut XprisoMessage,
) {
    let mut forwards: BTreeMap<NetMeshBaseIdentifier, Vec<NetMeshObjectAccessSpecification>> = BTreeMap::new();
    for spec in &incoming.requested_first_time_objects {
        let spec = strip_hops(spec, view.here());
        let found = view
            .find(spec.object())
            .or_else(|| view.find_equivalent(spec.object()));
        if let Some(obj) = found {
            if potentially_convey(obj, outgoing, proxy, points_replicas_to_itself) {
                ret.add_register_replication(obj.identifier().clone());
            }
            continue;
        }
        let next = spec.first_hop().base;
        if &next == view.here() || next == proxy.there {
            continue;
        }
        forwards.entry(next).or_default().push(spec.remainder());
    }
    for (via, specs) in forwards {
        ret.forwards.push(ForwardRequest::Replicas { via, specs });
    }
}

fn process_requested_resynchronize_replicas(
    incoming: &XprisoMessage,
    proxy: &ProxyIdentity,
    view: &dyn ReplicaView,
    points_replicas_to_itself: bool,
    ret: &mut ProxyProcessingInstructions,
    outgoing: &mut XprisoMessage,
) {
    for identifier in &incoming.requested_resynchronize_replicas {
        if let Some(obj) = view.find(identifier) {
            if potentially_convey(obj, outgoing, proxy, points_replicas_to_itself) {
                ret.add_register_replication(identifier.clone());
            }
        }
    }
}

fn process_requested_lock_objects(
    incoming: &XprisoMessage,
    proxy: &ProxyIdentity,
    view: &dyn ReplicaView,
    points_replicas_to_itself: bool,
    ret: &mut ProxyProcessingInstructions,
    outgoing: &mut XprisoMessage,
) {
    let mut forwards: BTreeMap<NetMeshBaseIdentifier, Vec<NetMeshObjectIdentifier>> = BTreeMap::new();
    for identifier in &incoming.requested_lock_objects {
        let Some(obj) = view.find(identifier) else {
            continue;
        };
        if !view.gives_up_lock(obj) {
            continue;
        }
        match obj.proxy_towards_lock() {
            None => {
                potentially_convey(obj, outgoing, proxy, points_replicas_to_itself);
                ret.surrender_locks.push(identifier.clone());
                outgoing.add_push_lock_object(identifier.clone());
            }
            Some(towards) if towards != &proxy.there => {
                forwards.entry(towards.clone()).or_default().push(identifier.clone());
            }
            Some(_) => {}
        }
    }
    for (via, identifiers) in forwards {
        ret.forwards.push(ForwardRequest::Locks { via, identifiers });
    }
}

fn process_reclaimed_lock_objects(incoming: &XprisoMessage, view: &dyn ReplicaView, ret: &mut ProxyProcessingInstructions) {
    for identifier in &incoming.reclaimed_lock_objects {
        if view.find(identifier).is_some() {
            ret.surrender_locks.push(identifier.clone());
        }
    }
}

fn process_canceled_objects(incoming: &XprisoMessage, view: &dyn ReplicaView, ret: &mut ProxyProcessingInstructions) {
    for identifier in &incoming.requested_canceled_objects {
        if view.find(identifier).is_some() {
            ret.cancels.push(identifier.clone());
        }
    }
}

fn created_here_with<'a>(ret: &'a ProxyProcessingInstructions, identifier: &NetMeshObjectIdentifier) -> Option<&'a RippleInstructions> {
    ret.ripple_creates.iter().find(|r| r.identifier() == identifier)
}

fn process_pushed_locks(incoming: &XprisoMessage, view: &dyn ReplicaView, ret: &mut ProxyProcessingInstructions) {
    for identifier in &incoming.push_lock_objects {
        let pending = match created_here_with(ret, identifier) {
            Some(ripple) => ripple.lock_proxy.is_some(),
            None => view.find(identifier).is_some(),
        };
        if pending {
            ret.pushed_locks.push(identifier.clone());
        }
    }
}

fn process_pushed_homes(incoming: &XprisoMessage, view: &dyn ReplicaView, ret: &mut ProxyProcessingInstructions) {
    for identifier in &incoming.push_home_replicas {
        let pending = match created_here_with(ret, identifier) {
            Some(ripple) => ripple.home_proxy.is_some(),
            None => view.find(identifier).is_some(),
        };
        if pending {
            ret.pushed_homes.push(identifier.clone());
        }
    }
}
