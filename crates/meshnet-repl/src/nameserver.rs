//! Name server: resolves a MeshBase identifier to a live MeshBase in this process.

use dashmap::DashMap;
use std::fmt;
use tracing::debug;

use crate::identifier::NetMeshBaseIdentifier;
use crate::meshbase::NetMeshBase;

/// Maps MeshBase identifiers to live MeshBases.
pub trait NameServer: Send + Sync + fmt::Debug {
    /// Find a live MeshBase.
    fn get(&self, identifier: &NetMeshBaseIdentifier) -> Option<NetMeshBase>;

    /// Make `base` reachable under its identifier, replacing any previous entry.
    fn register(&self, base: NetMeshBase);

    /// Remove the entry for `identifier`, returning it if present.
    fn unregister(&self, identifier: &NetMeshBaseIdentifier) -> Option<NetMeshBase>;
}

/// In-process name server.
#[derive(Default)]
pub struct MemoryNameServer {
    bases: DashMap<NetMeshBaseIdentifier, NetMeshBase>,
}

impl MemoryNameServer {
    /// Create an empty name server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered MeshBases.
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

impl fmt::Debug for MemoryNameServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryNameServer")
            .field("bases", &self.bases.len())
            .finish()
    }
}

impl NameServer for MemoryNameServer {
    fn get(&self, identifier: &NetMeshBaseIdentifier) -> Option<NetMeshBase> {
        self.bases.get(identifier).map(|entry| entry.value().clone())
    }

    fn register(&self, base: NetMeshBase) {
        debug!(mesh_base = %base.identifier(), "registering with name server");
        self.bases.insert(base.identifier().clone(), base);
    }

    fn unregister(&self, identifier: &NetMeshBaseIdentifier) -> Option<NetMeshBase> {
        debug!(mesh_base = %identifier, "unregistering from name server");
        self.bases.remove(identifier).map(|(_, base)| base)
    }
}
