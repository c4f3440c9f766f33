//! Xpriso protocol messages: one batch of requests, grants and deltas.

use serde::{Deserialize, Serialize};

use crate::access::NetMeshObjectAccessSpecification;
use crate::change::{ChangeKind, Delta};
use crate::error::Result;
use crate::externalized::ExternalizedNetMeshObject;
use crate::identifier::{NetMeshBaseIdentifier, NetMeshObjectIdentifier};

/// Message exchanged between two proxies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XprisoMessage {
    /// Set when the sender waits for an answer.
    pub request_id: Option<u64>,
    /// Set when this answers a request.
    pub response_id: Option<u64>,
    /// Sending MeshBase.
    pub sender: NetMeshBaseIdentifier,
    /// Receiving MeshBase.
    pub receiver: NetMeshBaseIdentifier,
    /// Objects the sender wants replicated for the first time.
    pub requested_first_time_objects: Vec<NetMeshObjectAccessSpecification>,
    /// Objects the sender no longer replicates.
    pub requested_canceled_objects: Vec<NetMeshObjectIdentifier>,
    /// Full snapshots of objects.
    pub conveyed_objects: Vec<ExternalizedNetMeshObject>,
    /// Objects whose lock the sender hands over.
    pub push_lock_objects: Vec<NetMeshObjectIdentifier>,
    /// Objects whose home replica status the sender hands over.
    pub push_home_replicas: Vec<NetMeshObjectIdentifier>,
    /// Objects whose lock the sender asks for.
    pub requested_lock_objects: Vec<NetMeshObjectIdentifier>,
    /// Objects whose home replica status the sender asks for.
    pub requested_home_replicas: Vec<NetMeshObjectIdentifier>,
    /// Objects whose lock the sender takes back unilaterally.
    pub reclaimed_lock_objects: Vec<NetMeshObjectIdentifier>,
    /// Objects the sender wants a fresh snapshot of.
    pub requested_resynchronize_replicas: Vec<NetMeshObjectIdentifier>,
    /// Type additions.
    pub type_additions: Vec<Delta>,
    /// Type removals.
    pub type_removals: Vec<Delta>,
    /// Property changes.
    pub property_changes: Vec<Delta>,
    /// Relationships created.
    pub neighbor_additions: Vec<Delta>,
    /// Relationships removed.
    pub neighbor_removals: Vec<Delta>,
    /// Role types added to relationships.
    pub role_additions: Vec<Delta>,
    /// Role types removed from relationships.
    pub role_removals: Vec<Delta>,
    /// Equivalents added.
    pub equivalent_additions: Vec<Delta>,
    /// Equivalents removed.
    pub equivalent_removals: Vec<Delta>,
    /// Deleted objects.
    pub deletions: Vec<Delta>,
    /// The sender tears down the channel.
    pub cease_communications: bool,
}

impl XprisoMessage {
    /// Empty message from `sender` to `receiver`.
    pub fn new(sender: NetMeshBaseIdentifier, receiver: NetMeshBaseIdentifier) -> Self {
        Self {
            request_id: None,
            response_id: None,
            sender,
            receiver,
            requested_first_time_objects: Vec::new(),
            requested_canceled_objects: Vec::new(),
            conveyed_objects: Vec::new(),
            push_lock_objects: Vec::new(),
            push_home_replicas: Vec::new(),
            requested_lock_objects: Vec::new(),
            requested_home_replicas: Vec::new(),
            reclaimed_lock_objects: Vec::new(),
            requested_resynchronize_replicas: Vec::new(),
            type_additions: Vec::new(),
            type_removals: Vec::new(),
            property_changes: Vec::new(),
            neighbor_additions: Vec::new(),
            neighbor_removals: Vec::new(),
            role_additions: Vec::new(),
            role_removals: Vec::new(),
            equivalent_additions: Vec::new(),
            equivalent_removals: Vec::new(),
            deletions: Vec::new(),
            cease_communications: false,
        }
    }

    /// Returns true if the message carries no content. Correlation ids do not count.
    pub fn is_empty(&self) -> bool {
        self.requested_first_time_objects.is_empty()
            && self.requested_canceled_objects.is_empty()
            && self.conveyed_objects.is_empty()
            && self.push_lock_objects.is_empty()
            && self.push_home_replicas.is_empty()
            && self.requested_lock_objects.is_empty()
            && self.requested_home_replicas.is_empty()
            && self.reclaimed_lock_objects.is_empty()
            && self.requested_resynchronize_replicas.is_empty()
            && self.delta_count() == 0
            && !self.cease_communications
    }

    fn delta_vecs(&self) -> [&Vec<Delta>; 10] {
        [
            &self.type_additions,
            &self.type_removals,
            &self.property_changes,
            &self.neighbor_additions,
            &self.neighbor_removals,
            &self.role_additions,
            &self.role_removals,
            &self.equivalent_additions,
            &self.equivalent_removals,
            &self.deletions,
        ]
    }

    /// Total number of deltas.
    pub fn delta_count(&self) -> usize {
        self.delta_vecs().iter().map(|v| v.len()).sum()
    }

    /// All deltas, in the order the sender made the changes.
    pub fn deltas_in_order(&self) -> Vec<&Delta> {
        let mut all: Vec<&Delta> = self.delta_vecs().into_iter().flatten().collect();
        all.sort_by_key(|d| d.sequence);
        all
    }

    /// Returns true if `identifier` is offered with the lock.
    pub fn pushes_lock_for(&self, identifier: &NetMeshObjectIdentifier) -> bool {
        self.push_lock_objects.contains(identifier)
    }

    /// Returns true if `identifier` is offered with home replica status.
    pub fn pushes_home_for(&self, identifier: &NetMeshObjectIdentifier) -> bool {
        self.push_home_replicas.contains(identifier)
    }

    /// Returns true if a snapshot of `identifier` is conveyed already.
    pub fn conveys(&self, identifier: &NetMeshObjectIdentifier) -> bool {
        self.conveyed_objects.iter().any(|o| &o.identifier == identifier)
    }

    /// Add a requested first-time object.
    pub fn add_requested_first_time_object(&mut self, spec: NetMeshObjectAccessSpecification) {
        self.requested_first_time_objects.push(spec);
    }

    /// Add a canceled object, once.
    pub fn add_requested_canceled_object(&mut self, identifier: NetMeshObjectIdentifier) {
        push_unique(&mut self.requested_canceled_objects, identifier);
    }

    /// Add a conveyed object, unless already conveyed.
    pub fn add_conveyed_object(&mut self, obj: ExternalizedNetMeshObject) {
        if !self.conveys(&obj.identifier) {
            self.conveyed_objects.push(obj);
        }
    }

    /// Add a pushed lock, once.
    pub fn add_push_lock_object(&mut self, identifier: NetMeshObjectIdentifier) {
        push_unique(&mut self.push_lock_objects, identifier);
    }

    /// Add a pushed home replica, once.
    pub fn add_push_home_replica(&mut self, identifier: NetMeshObjectIdentifier) {
        push_unique(&mut self.push_home_replicas, identifier);
    }

    /// Add a requested lock, once.
    pub fn add_requested_lock_object(&mut self, identifier: NetMeshObjectIdentifier) {
        push_unique(&mut self.requested_lock_objects, identifier);
    }

    /// Add a requested home replica, once.
    pub fn add_requested_home_replica(&mut self, identifier: NetMeshObjectIdentifier) {
        push_unique(&mut self.requested_home_replicas, identifier);
    }

    /// Add a reclaimed lock, once.
    pub fn add_reclaimed_lock_object(&mut self, identifier: NetMeshObjectIdentifier) {
        push_unique(&mut self.reclaimed_lock_objects, identifier);
    }

    /// Add a resynchronization request, once.
    pub fn add_requested_resynchronize_replica(&mut self, identifier: NetMeshObjectIdentifier) {
        push_unique(&mut self.requested_resynchronize_replicas, identifier);
    }

    /// File a delta under the list matching its kind. Creation and purge are not sent as deltas.
    pub fn add_delta(&mut self, delta: Delta) {
        let target = match delta.kind {
            ChangeKind::TypeAdded { .. } => &mut self.type_additions,
            ChangeKind::TypeRemoved { .. } => &mut self.type_removals,
            ChangeKind::PropertyChanged { .. } => &mut self.property_changes,
            ChangeKind::NeighborAdded { .. } => &mut self.neighbor_additions,
            ChangeKind::NeighborRemoved { .. } => &mut self.neighbor_removals,
            ChangeKind::RoleAdded { .. } => &mut self.role_additions,
            ChangeKind::RoleRemoved { .. } => &mut self.role_removals,
            ChangeKind::EquivalentsAdded { .. } => &mut self.equivalent_additions,
            ChangeKind::EquivalentsRemoved { .. } => &mut self.equivalent_removals,
            ChangeKind::Deleted => &mut self.deletions,
            ChangeKind::Created | ChangeKind::ReplicaPurged => return,
        };
        target.push(delta);
    }

    /// Binary wire encoding.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode the binary wire encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, item: T) {
    if !list.contains(&item) {
        list.push(item);
    }
}
