//! Changes recorded by transactions and the deltas that carry them to partners.

use serde::{Deserialize, Serialize};

use crate::error::ChangeError;
use crate::identifier::{MeshTypeIdentifier, NetMeshBaseIdentifier, NetMeshObjectIdentifier};
use crate::object::{NetMeshObject, PropertyValue};

/// What happened to an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The object was created here.
    Created,
    /// Types were added.
    TypeAdded {
        /// The added types.
        types: Vec<MeshTypeIdentifier>,
    },
    /// Types were removed.
    TypeRemoved {
        /// The removed types.
        types: Vec<MeshTypeIdentifier>,
    },
    /// A property was set or cleared.
    PropertyChanged {
        /// The property.
        property: MeshTypeIdentifier,
        /// Value before the change.
        old: Option<PropertyValue>,
        /// Value after the change.
        new: Option<PropertyValue>,
    },
    /// A relationship to `neighbor` was created.
    NeighborAdded {
        /// The new neighbor.
        neighbor: NetMeshObjectIdentifier,
    },
    /// The relationship to `neighbor` was removed.
    NeighborRemoved {
        /// The former neighbor.
        neighbor: NetMeshObjectIdentifier,
    },
    /// Role types were added to the relationship with `neighbor`.
    RoleAdded {
        /// The neighbor.
        neighbor: NetMeshObjectIdentifier,
        /// The added role types.
        roles: Vec<MeshTypeIdentifier>,
    },
    /// Role types were removed from the relationship with `neighbor`.
    RoleRemoved {
        /// The neighbor.
        neighbor: NetMeshObjectIdentifier,
        /// The removed role types.
        roles: Vec<MeshTypeIdentifier>,
    },
    /// Equivalents were added.
    EquivalentsAdded {
        /// The new equivalents.
        equivalents: Vec<NetMeshObjectIdentifier>,
    },
    /// Equivalents were removed.
    EquivalentsRemoved {
        /// The removed equivalents.
        equivalents: Vec<NetMeshObjectIdentifier>,
    },
    /// The object was deleted.
    Deleted,
    /// The local replica was dropped; the object itself lives on elsewhere.
    ReplicaPurged,
}

/// A change as it travels to a partner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Position in the sender's change history. Deltas apply in this order.
    pub sequence: u64,
    /// The affected object.
    pub source: NetMeshObjectIdentifier,
    /// Update time of the object after the change.
    pub time_updated: u64,
    /// What changed.
    pub kind: ChangeKind,
}

impl Delta {
    /// Other objects this delta refers to, which must be resolvable for it to make sense.
    pub fn referenced_objects(&self) -> Vec<&NetMeshObjectIdentifier> {
        match &self.kind {
            ChangeKind::NeighborAdded { neighbor }
            | ChangeKind::NeighborRemoved { neighbor }
            | ChangeKind::RoleAdded { neighbor, .. }
            | ChangeKind::RoleRemoved { neighbor, .. } => vec![neighbor],
            ChangeKind::EquivalentsAdded { equivalents } | ChangeKind::EquivalentsRemoved { equivalents } => {
                equivalents.iter().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Returns true for neighbor, role and equivalent changes.
    pub fn is_relationship_change(&self) -> bool {
        matches!(
            self.kind,
            ChangeKind::NeighborAdded { .. }
                | ChangeKind::NeighborRemoved { .. }
                | ChangeKind::RoleAdded { .. }
                | ChangeKind::RoleRemoved { .. }
                | ChangeKind::EquivalentsAdded { .. }
                | ChangeKind::EquivalentsRemoved { .. }
        )
    }

    /// Apply to a replica with the ripple operations.
    pub(crate) fn apply_to(&self, obj: &mut NetMeshObject) -> Result<(), ChangeError> {
        match &self.kind {
            ChangeKind::Created | ChangeKind::ReplicaPurged => {}
            ChangeKind::TypeAdded { types } => obj.ripple_bless(types)?,
            ChangeKind::TypeRemoved { types } => obj.ripple_unbless(types)?,
            ChangeKind::PropertyChanged { property, new, .. } => {
                obj.ripple_set_property(property, new.clone())?;
            }
            ChangeKind::NeighborAdded { neighbor } => obj.ripple_relate(neighbor)?,
            ChangeKind::NeighborRemoved { neighbor } => obj.ripple_unrelate(neighbor)?,
            ChangeKind::RoleAdded { neighbor, roles } => obj.ripple_bless_relationship(neighbor, roles)?,
            ChangeKind::RoleRemoved { neighbor, roles } => obj.ripple_unbless_relationship(neighbor, roles)?,
            ChangeKind::EquivalentsAdded { equivalents } => {
                for e in equivalents {
                    obj.ripple_add_as_equivalent(e)?;
                }
            }
            ChangeKind::EquivalentsRemoved { equivalents } => {
                for e in equivalents {
                    obj.ripple_remove_as_equivalent(e)?;
                }
            }
            ChangeKind::Deleted => obj.ripple_delete()?,
        }
        obj.touch(self.time_updated);
        Ok(())
    }
}

/// A change recorded by a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NetChange {
    /// The change itself.
    pub delta: Delta,
    /// Partner whose incoming message caused this change, if any.
    pub origin: Option<NetMeshBaseIdentifier>,
    /// Partners the object was replicated towards when the change happened.
    pub replicated_towards: Vec<NetMeshBaseIdentifier>,
}

impl NetChange {
    /// Returns true if `partner` needs to hear about this change.
    pub fn should_be_sent(&self, partner: &NetMeshBaseIdentifier) -> bool {
        self.replicated_towards.contains(partner) && self.origin.as_ref() != Some(partner)
    }

    /// The affected object.
    pub fn source(&self) -> &NetMeshObjectIdentifier {
        &self.delta.source
    }
}
