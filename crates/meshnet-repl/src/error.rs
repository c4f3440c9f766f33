//! Error types for the replication subsystem.

use thiserror::Error;

use crate::identifier::{NetMeshBaseIdentifier, NetMeshObjectIdentifier};

/// Errors that can occur in the replication subsystem.
#[derive(Debug, Error)]
pub enum ReplError {
    /// The partner did not answer a request in time. Retrying is safe.
    #[error("remote query to {partner} timed out after {timeout_ms}ms")]
    RemoteQueryTimeout {
        /// Partner MeshBase that was asked.
        partner: NetMeshBaseIdentifier,
        /// How long we waited (milliseconds).
        timeout_ms: u64,
    },

    /// The message endpoint refused the message.
    #[error("message send failed: {0}")]
    MessageSend(#[from] meshnet_pingpong::EndpointError),

    /// A local change or ripple could not be applied.
    #[error("change rejected: {0}")]
    Change(#[from] ChangeError),

    /// An identifier or access specification could not be parsed.
    #[error("invalid identifier: {msg}")]
    Identifier {
        /// Error message describing the problem.
        msg: String,
    },

    /// No replica with this identifier exists locally.
    #[error("mesh object not found: {identifier}")]
    ObjectNotFound {
        /// The identifier that was looked up.
        identifier: NetMeshObjectIdentifier,
    },

    /// The operation is reserved for the home replica.
    #[error("{identifier} is not the home replica")]
    NotHomeReplica {
        /// The replica the operation was attempted on.
        identifier: NetMeshObjectIdentifier,
    },

    /// The policy of this proxy never initiates requests.
    #[error("proxy to {partner} does not initiate replication requests")]
    InitiationUnsupported {
        /// Partner of the proxy.
        partner: NetMeshBaseIdentifier,
    },

    /// The MeshBase could not be found or is no longer alive.
    #[error("unknown mesh base: {identifier}")]
    UnknownMeshBase {
        /// Identifier of the missing MeshBase.
        identifier: NetMeshBaseIdentifier,
    },

    /// An access outcome was constructed inconsistently.
    #[error("invalid access outcome: {msg}")]
    InvalidAccessOutcome {
        /// Error message describing the inconsistency.
        msg: String,
    },

    /// An externalized form could not be encoded or decoded.
    #[error("encoding error: {msg}")]
    Encoding {
        /// Error message describing the problem.
        msg: String,
    },

    /// Binary serialization/deserialization error.
    #[error("serialization error")]
    Serialization(#[from] bincode::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// A probe could not read its data source.
    #[error("probe for {identifier} failed: {msg}")]
    Probe {
        /// Data source the probe was reading.
        identifier: NetMeshBaseIdentifier,
        /// Error message describing the problem.
        msg: String,
    },

    /// The MeshBase or proxy was shut down.
    #[error("shut down")]
    Shutdown,
}

impl ReplError {
    /// Returns true for outcomes that a caller should simply retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReplError::RemoteQueryTimeout { .. })
    }
}

/// A change that cannot be applied to a replica.
///
/// During ripples these indicate that two replicas have diverged; they are
/// logged and the offending change is skipped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChangeError {
    /// Object is already blessed with the type.
    #[error("{identifier} is blessed with {type_id} already")]
    BlessedAlready {
        /// Affected object.
        identifier: NetMeshObjectIdentifier,
        /// Offending type.
        type_id: String,
    },

    /// Object is not blessed with the type.
    #[error("{identifier} is not blessed with {type_id}")]
    NotBlessed {
        /// Affected object.
        identifier: NetMeshObjectIdentifier,
        /// Offending type.
        type_id: String,
    },

    /// The two objects are related already.
    #[error("{identifier} is related to {neighbor} already")]
    RelatedAlready {
        /// Affected object.
        identifier: NetMeshObjectIdentifier,
        /// Neighbor object.
        neighbor: NetMeshObjectIdentifier,
    },

    /// The two objects are not related.
    #[error("{identifier} is not related to {neighbor}")]
    NotRelated {
        /// Affected object.
        identifier: NetMeshObjectIdentifier,
        /// Neighbor object.
        neighbor: NetMeshObjectIdentifier,
    },

    /// The relationship already carries the role type.
    #[error("relationship {identifier} -> {neighbor} is blessed with {role} already")]
    RoleTypeBlessedAlready {
        /// Affected object.
        identifier: NetMeshObjectIdentifier,
        /// Neighbor object.
        neighbor: NetMeshObjectIdentifier,
        /// Offending role type.
        role: String,
    },

    /// The relationship does not carry the role type.
    #[error("relationship {identifier} -> {neighbor} is not blessed with {role}")]
    RoleTypeNotBlessed {
        /// Affected object.
        identifier: NetMeshObjectIdentifier,
        /// Neighbor object.
        neighbor: NetMeshObjectIdentifier,
        /// Offending role type.
        role: String,
    },

    /// The objects are equivalent already.
    #[error("{identifier} is equivalent to {equivalent} already")]
    EquivalentAlready {
        /// Affected object.
        identifier: NetMeshObjectIdentifier,
        /// Equivalent object.
        equivalent: NetMeshObjectIdentifier,
    },

    /// The objects are not equivalent.
    #[error("{identifier} is not equivalent to {equivalent}")]
    NotEquivalent {
        /// Affected object.
        identifier: NetMeshObjectIdentifier,
        /// Equivalent object.
        equivalent: NetMeshObjectIdentifier,
    },

    /// The object has been deleted.
    #[error("{identifier} is dead")]
    IsDead {
        /// Affected object.
        identifier: NetMeshObjectIdentifier,
    },

    /// No such object in this MeshBase.
    #[error("{identifier} not found")]
    NotFound {
        /// Missing object.
        identifier: NetMeshObjectIdentifier,
    },

    /// An object with this identifier exists already.
    #[error("identifier {identifier} is not unique")]
    IdentifierNotUnique {
        /// Clashing identifier.
        identifier: NetMeshObjectIdentifier,
    },

    /// The local replica does not hold the lock.
    #[error("no update rights for {identifier}")]
    NoUpdateRights {
        /// Affected object.
        identifier: NetMeshObjectIdentifier,
    },

    /// The replica refuses to give up the lock or home replica status.
    #[error("{identifier} refuses to surrender to {partner}")]
    WillNotSurrender {
        /// Affected object.
        identifier: NetMeshObjectIdentifier,
        /// Requesting partner.
        partner: NetMeshBaseIdentifier,
    },

    /// Replica bookkeeping is inconsistent with the request.
    #[error("replication of {identifier} towards {partner}: {msg}")]
    Replication {
        /// Affected object.
        identifier: NetMeshObjectIdentifier,
        /// Partner named in the request.
        partner: NetMeshBaseIdentifier,
        /// What went wrong.
        msg: String,
    },
}

/// Result type for replication operations.
pub type Result<T> = std::result::Result<T, ReplError>;
