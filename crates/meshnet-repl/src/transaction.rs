//! Transactions: the only way to change replicas.
//!
//! A transaction holds the MeshBase state guard from creation until commit or
//! drop. Local changes require the lock on every object they touch; ripple and
//! bookkeeping operations apply changes that were authorized elsewhere and are
//! reserved for proxies. Dropping an uncommitted transaction restores every
//! touched object.

use std::collections::HashMap;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::change::{ChangeKind, Delta, NetChange};
use crate::error::{ChangeError, ReplError, Result};
use crate::identifier::{MeshTypeIdentifier, NetMeshBaseIdentifier, NetMeshObjectIdentifier};
use crate::instructions::RippleInstructions;
use crate::meshbase::{MeshBaseState, NetMeshBase};
use crate::object::{current_time_ms, NetMeshObject, PropertyValue};
use crate::policy::ReplicaView;

/// An open transaction on one MeshBase.
pub struct Transaction {
    base: NetMeshBase,
    state: OwnedMutexGuard<MeshBaseState>,
    undo: HashMap<NetMeshObjectIdentifier, Option<NetMeshObject>>,
    changes: Vec<NetChange>,
    origin: Option<NetMeshBaseIdentifier>,
    committed: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("mesh_base", self.base.identifier())
            .field("origin", &self.origin)
            .field("changes", &self.changes.len())
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(
        base: NetMeshBase,
        state: OwnedMutexGuard<MeshBaseState>,
        origin: Option<NetMeshBaseIdentifier>,
    ) -> Self {
        Self {
            base,
            state,
            undo: HashMap::new(),
            changes: Vec::new(),
            origin,
            committed: false,
        }
    }

    /// Read access to the replicas as they are inside this transaction.
    pub fn view(&self) -> &MeshBaseState {
        &self.state
    }

    /// Snapshot of one replica inside this transaction.
    pub fn find(&self, identifier: &NetMeshObjectIdentifier) -> Option<&NetMeshObject> {
        self.state.find(identifier)
    }

    /// Changes recorded so far.
    pub fn changes(&self) -> &[NetChange] {
        &self.changes
    }

    fn remember(&mut self, identifier: &NetMeshObjectIdentifier) {
        if !self.undo.contains_key(identifier) {
            let prior = self.state.find(identifier).cloned();
            self.undo.insert(identifier.clone(), prior);
        }
    }

    fn object_mut(&mut self, identifier: &NetMeshObjectIdentifier) -> std::result::Result<&mut NetMeshObject, ChangeError> {
        self.remember(identifier);
        self.state.get_mut(identifier).ok_or_else(|| ChangeError::NotFound {
            identifier: identifier.clone(),
        })
    }

    fn check_update_rights(&self, identifier: &NetMeshObjectIdentifier) -> std::result::Result<(), ChangeError> {
        let obj = self.state.find(identifier).ok_or_else(|| ChangeError::NotFound {
            identifier: identifier.clone(),
        })?;
        if obj.is_dead() {
            return Err(ChangeError::IsDead {
                identifier: identifier.clone(),
            });
        }
        if !obj.has_lock() {
            return Err(ChangeError::NoUpdateRights {
                identifier: identifier.clone(),
            });
        }
        Ok(())
    }

    fn record(&mut self, identifier: &NetMeshObjectIdentifier, kind: ChangeKind) {
        let Some(obj) = self.state.find(identifier) else {
            return;
        };
        let time_updated = obj.time_updated();
        let replicated_towards = obj.proxies().to_vec();
        let sequence = self.state.next_sequence();
        self.changes.push(NetChange {
            delta: Delta {
                sequence,
                source: identifier.clone(),
                time_updated,
                kind,
            },
            origin: self.origin.clone(),
            replicated_towards,
        });
    }

    // ---- local changes ----

    /// Create an object homed here, with a random identifier unless one is given.
    pub fn create_mesh_object(
        &mut self,
        identifier: Option<NetMeshObjectIdentifier>,
        types: &[MeshTypeIdentifier],
    ) -> Result<NetMeshObjectIdentifier> {
        let identifier = identifier.unwrap_or_else(|| self.base.identifier_factory().create_random_identifier());
        if self.state.find(&identifier).is_some() {
            return Err(ChangeError::IdentifierNotUnique { identifier }.into());
        }
        self.remember(&identifier);
        let mut obj = NetMeshObject::new(identifier.clone(), current_time_ms());
        if !types.is_empty() {
            obj.ripple_bless(types)?;
        }
        self.state.insert(obj);
        self.record(&identifier, ChangeKind::Created);
        if !types.is_empty() {
            self.record(&identifier, ChangeKind::TypeAdded { types: types.to_vec() });
        }
        debug!(mesh_base = %self.base.identifier(), object = %identifier, "created mesh object");
        Ok(identifier)
    }

    /// Add types to an object.
    pub fn bless(&mut self, identifier: &NetMeshObjectIdentifier, types: &[MeshTypeIdentifier]) -> Result<()> {
        self.check_update_rights(identifier)?;
        let obj = self.object_mut(identifier)?;
        obj.ripple_bless(types)?;
        obj.touch(current_time_ms());
        self.record(identifier, ChangeKind::TypeAdded { types: types.to_vec() });
        Ok(())
    }

    /// Remove types from an object.
    pub fn unbless(&mut self, identifier: &NetMeshObjectIdentifier, types: &[MeshTypeIdentifier]) -> Result<()> {
        self.check_update_rights(identifier)?;
        let obj = self.object_mut(identifier)?;
        obj.ripple_unbless(types)?;
        obj.touch(current_time_ms());
        self.record(identifier, ChangeKind::TypeRemoved { types: types.to_vec() });
        Ok(())
    }

    /// Set or clear a property. Returns the previous value.
    pub fn set_property(
        &mut self,
        identifier: &NetMeshObjectIdentifier,
        property: &MeshTypeIdentifier,
        value: Option<PropertyValue>,
    ) -> Result<Option<PropertyValue>> {
        self.check_update_rights(identifier)?;
        let obj = self.object_mut(identifier)?;
        let old = obj.ripple_set_property(property, value.clone())?;
        obj.touch(current_time_ms());
        self.record(
            identifier,
            ChangeKind::PropertyChanged {
                property: property.clone(),
                old: old.clone(),
                new: value,
            },
        );
        Ok(old)
    }

    /// Relate two local objects. Both sides change, so both need the lock.
    pub fn relate(&mut self, a: &NetMeshObjectIdentifier, b: &NetMeshObjectIdentifier) -> Result<()> {
        self.check_update_rights(a)?;
        self.check_update_rights(b)?;
        if self.state.find(b).map(|o| o.is_related_to(a)).unwrap_or(false) {
            return Err(ChangeError::RelatedAlready {
                identifier: b.clone(),
                neighbor: a.clone(),
            }
            .into());
        }
        let now = current_time_ms();
        let obj = self.object_mut(a)?;
        obj.ripple_relate(b)?;
        obj.touch(now);
        let other = self.object_mut(b)?;
        other.ripple_relate(a)?;
        other.touch(now);
        self.record(a, ChangeKind::NeighborAdded { neighbor: b.clone() });
        self.record(b, ChangeKind::NeighborAdded { neighbor: a.clone() });
        Ok(())
    }

    /// Remove the relationship between two local objects.
    pub fn unrelate(&mut self, a: &NetMeshObjectIdentifier, b: &NetMeshObjectIdentifier) -> Result<()> {
        self.check_update_rights(a)?;
        self.check_update_rights(b)?;
        let now = current_time_ms();
        if !self.state.find(b).map(|o| o.is_related_to(a)).unwrap_or(false) {
            return Err(ChangeError::NotRelated {
                identifier: b.clone(),
                neighbor: a.clone(),
            }
            .into());
        }
        let obj = self.object_mut(a)?;
        obj.ripple_unrelate(b)?;
        obj.touch(now);
        let other = self.object_mut(b)?;
        other.ripple_unrelate(a)?;
        other.touch(now);
        self.record(a, ChangeKind::NeighborRemoved { neighbor: b.clone() });
        self.record(b, ChangeKind::NeighborRemoved { neighbor: a.clone() });
        Ok(())
    }

    /// Add role types to `source`'s side of its relationship with `neighbor`.
    pub fn bless_relationship(
        &mut self,
        source: &NetMeshObjectIdentifier,
        neighbor: &NetMeshObjectIdentifier,
        roles: &[MeshTypeIdentifier],
    ) -> Result<()> {
        self.check_update_rights(source)?;
        let obj = self.object_mut(source)?;
        obj.ripple_bless_relationship(neighbor, roles)?;
        obj.touch(current_time_ms());
        self.record(
            source,
            ChangeKind::RoleAdded {
                neighbor: neighbor.clone(),
                roles: roles.to_vec(),
            },
        );
        Ok(())
    }

    /// Remove role types from `source`'s side of its relationship with `neighbor`.
    pub fn unbless_relationship(
        &mut self,
        source: &NetMeshObjectIdentifier,
        neighbor: &NetMeshObjectIdentifier,
        roles: &[MeshTypeIdentifier],
    ) -> Result<()> {
        self.check_update_rights(source)?;
        let obj = self.object_mut(source)?;
        obj.ripple_unbless_relationship(neighbor, roles)?;
        obj.touch(current_time_ms());
        self.record(
            source,
            ChangeKind::RoleRemoved {
                neighbor: neighbor.clone(),
                roles: roles.to_vec(),
            },
        );
        Ok(())
    }

    /// Declare `a` and `b` equivalent. If `b` has a replica here it is updated as well.
    pub fn add_as_equivalent(&mut self, a: &NetMeshObjectIdentifier, b: &NetMeshObjectIdentifier) -> Result<()> {
        self.check_update_rights(a)?;
        let b_local = self.state.find(b).is_some();
        if b_local {
            self.check_update_rights(b)?;
            if self.state.find(b).map(|o| o.equivalents().contains(a)).unwrap_or(false) {
                return Err(ChangeError::EquivalentAlready {
                    identifier: b.clone(),
                    equivalent: a.clone(),
                }
                .into());
            }
        }
        let now = current_time_ms();
        let obj = self.object_mut(a)?;
        obj.ripple_add_as_equivalent(b)?;
        obj.touch(now);
        self.record(a, ChangeKind::EquivalentsAdded { equivalents: vec![b.clone()] });
        if b_local {
            let other = self.object_mut(b)?;
            other.ripple_add_as_equivalent(a)?;
            other.touch(now);
            self.record(b, ChangeKind::EquivalentsAdded { equivalents: vec![a.clone()] });
        }
        Ok(())
    }

    /// Undo `add_as_equivalent`.
    pub fn remove_as_equivalent(&mut self, a: &NetMeshObjectIdentifier, b: &NetMeshObjectIdentifier) -> Result<()> {
        self.check_update_rights(a)?;
        let b_local = self.state.find(b).map(|o| o.equivalents().contains(a)).unwrap_or(false);
        if b_local {
            self.check_update_rights(b)?;
        }
        let now = current_time_ms();
        let obj = self.object_mut(a)?;
        obj.ripple_remove_as_equivalent(b)?;
        obj.touch(now);
        self.record(a, ChangeKind::EquivalentsRemoved { equivalents: vec![b.clone()] });
        if b_local {
            let other = self.object_mut(b)?;
            other.ripple_remove_as_equivalent(a)?;
            other.touch(now);
            self.record(b, ChangeKind::EquivalentsRemoved { equivalents: vec![a.clone()] });
        }
        Ok(())
    }

    /// Delete an object, first removing its relationships to local neighbors.
    pub fn delete(&mut self, identifier: &NetMeshObjectIdentifier) -> Result<()> {
        self.check_update_rights(identifier)?;
        let neighbors: Vec<NetMeshObjectIdentifier> = self
            .state
            .find(identifier)
            .map(|o| o.neighbors().keys().cloned().collect())
            .unwrap_or_default();
        for neighbor in &neighbors {
            if self.state.find(neighbor).is_some() {
                self.check_update_rights(neighbor)?;
            }
        }
        let now = current_time_ms();
        for neighbor in &neighbors {
            let obj = self.object_mut(identifier)?;
            obj.ripple_unrelate(neighbor)?;
            self.record(identifier, ChangeKind::NeighborRemoved { neighbor: neighbor.clone() });
            if self.state.find(neighbor).is_some() {
                let other = self.object_mut(neighbor)?;
                other.ripple_unrelate(identifier)?;
                other.touch(now);
                self.record(neighbor, ChangeKind::NeighborRemoved { neighbor: identifier.clone() });
            }
        }
        let obj = self.object_mut(identifier)?;
        obj.ripple_delete()?;
        obj.touch(now);
        self.record(identifier, ChangeKind::Deleted);
        self.state.remove(identifier);
        debug!(mesh_base = %self.base.identifier(), object = %identifier, "deleted mesh object");
        Ok(())
    }

    /// Drop the local replica of an object homed elsewhere. Partners are told to cancel their lease.
    pub fn purge_replica(&mut self, identifier: &NetMeshObjectIdentifier) -> Result<()> {
        let obj = self.state.find(identifier).ok_or_else(|| ChangeError::NotFound {
            identifier: identifier.clone(),
        })?;
        if obj.is_home_replica() {
            return Err(ChangeError::Replication {
                identifier: identifier.clone(),
                partner: self.base.identifier().clone(),
                msg: "cannot purge the home replica".to_string(),
            }
            .into());
        }
        self.remember(identifier);
        self.record(identifier, ChangeKind::ReplicaPurged);
        self.state.remove(identifier);
        Ok(())
    }

    /// Whether the replica hands out the lock when asked.
    pub fn set_will_give_up_lock(&mut self, identifier: &NetMeshObjectIdentifier, value: bool) -> Result<()> {
        self.object_mut(identifier)?.set_will_give_up_lock(value);
        Ok(())
    }

    /// Whether the replica hands out home replica status when asked.
    pub fn set_will_give_up_home_replica(&mut self, identifier: &NetMeshObjectIdentifier, value: bool) -> Result<()> {
        self.object_mut(identifier)?.set_will_give_up_home_replica(value);
        Ok(())
    }

    /// Set or clear the expiry time.
    pub fn set_time_expires(&mut self, identifier: &NetMeshObjectIdentifier, value: Option<u64>) -> Result<()> {
        self.object_mut(identifier)?.set_time_expires(value);
        Ok(())
    }

    /// Take the lock back from whoever has it. Only allowed on the home replica.
    pub fn reclaim_lock(&mut self, identifier: &NetMeshObjectIdentifier) -> Result<Option<NetMeshBaseIdentifier>> {
        let obj = self.object_mut(identifier)?;
        if !obj.is_home_replica() {
            return Err(ReplError::NotHomeReplica {
                identifier: identifier.clone(),
            });
        }
        Ok(obj.reclaim_lock())
    }

    // ---- ripples, performed by proxies ----

    pub(crate) fn ripple_create(&mut self, instructions: &RippleInstructions) -> std::result::Result<(), ChangeError> {
        let identifier = instructions.identifier().clone();
        if self.state.find(&identifier).is_some() {
            return Err(ChangeError::IdentifierNotUnique { identifier });
        }
        self.remember(&identifier);
        self.state.insert(NetMeshObject::from_externalized(
            &instructions.externalized,
            instructions.proxies.clone(),
            instructions.home_proxy.clone(),
            instructions.lock_proxy.clone(),
        ));
        Ok(())
    }

    pub(crate) fn ripple_resynchronize(&mut self, instructions: &RippleInstructions) -> std::result::Result<(), ChangeError> {
        self.object_mut(instructions.identifier())?.ripple_resynchronize(
            &instructions.externalized,
            &instructions.proxies,
            instructions.home_proxy.clone(),
            instructions.lock_proxy.clone(),
        )
    }

    /// Apply a delta received from a partner and record it for onward propagation.
    pub(crate) fn apply_delta(&mut self, delta: &Delta) -> std::result::Result<(), ChangeError> {
        delta.apply_to(self.object_mut(&delta.source)?)?;
        self.record(&delta.source, delta.kind.clone());
        if matches!(delta.kind, ChangeKind::Deleted) {
            self.state.remove(&delta.source);
        }
        Ok(())
    }

    pub(crate) fn register_replication(
        &mut self,
        identifier: &NetMeshObjectIdentifier,
        partner: &NetMeshBaseIdentifier,
    ) -> std::result::Result<(), ChangeError> {
        self.object_mut(identifier)?.register_replication_towards(partner)
    }

    pub(crate) fn unregister_replication(
        &mut self,
        identifier: &NetMeshObjectIdentifier,
        partner: &NetMeshBaseIdentifier,
    ) -> std::result::Result<(), ChangeError> {
        self.object_mut(identifier)?.unregister_replication_towards(partner)
    }

    pub(crate) fn push_lock(
        &mut self,
        identifier: &NetMeshObjectIdentifier,
        partner: &NetMeshBaseIdentifier,
    ) -> std::result::Result<(), ChangeError> {
        self.object_mut(identifier)?.push_lock(partner)
    }

    pub(crate) fn push_home_replica(
        &mut self,
        identifier: &NetMeshObjectIdentifier,
        partner: &NetMeshBaseIdentifier,
    ) -> std::result::Result<(), ChangeError> {
        self.object_mut(identifier)?.push_home_replica(partner)
    }

    pub(crate) fn surrender_lock(
        &mut self,
        identifier: &NetMeshObjectIdentifier,
        partner: &NetMeshBaseIdentifier,
    ) -> std::result::Result<(), ChangeError> {
        if self.object_mut(identifier)?.surrender_lock(partner) {
            Ok(())
        } else {
            Err(ChangeError::WillNotSurrender {
                identifier: identifier.clone(),
                partner: partner.clone(),
            })
        }
    }

    pub(crate) fn surrender_home_replica(
        &mut self,
        identifier: &NetMeshObjectIdentifier,
        partner: &NetMeshBaseIdentifier,
    ) -> std::result::Result<(), ChangeError> {
        if self.object_mut(identifier)?.surrender_home_replica(partner) {
            Ok(())
        } else {
            Err(ChangeError::WillNotSurrender {
                identifier: identifier.clone(),
                partner: partner.clone(),
            })
        }
    }

    /// Commit: keep all changes and hand them to every proxy whose partner needs to hear about them.
    pub async fn commit(mut self) -> Result<()> {
        self.committed = true;
        let changes = std::mem::take(&mut self.changes);
        if changes.is_empty() {
            return Ok(());
        }
        let mut work = Vec::new();
        for proxy in self.base.proxies() {
            if !changes.iter().any(|c| c.should_be_sent(proxy.partner())) {
                continue;
            }
            if let Some(instructions) = proxy.transaction_committed(&changes, &*self.state) {
                work.push((proxy, instructions));
            }
        }
        let here = self.base.identifier().clone();
        drop(self);
        for (proxy, instructions) in work {
            if let Err(e) = proxy.perform_instructions(instructions).await {
                warn!(mesh_base = %here, partner = %proxy.partner(), error = %e, "propagating changes failed");
            }
        }
        Ok(())
    }

    /// Discard all changes made so far.
    pub fn rollback(self) {
        drop(self);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if !self.undo.is_empty() {
            debug!(mesh_base = %self.base.identifier(), objects = self.undo.len(), "rolling back transaction");
        }
        for (identifier, prior) in self.undo.drain() {
            match prior {
                Some(obj) => self.state.insert(obj),
                None => {
                    self.state.remove(&identifier);
                }
            }
        }
    }
}
