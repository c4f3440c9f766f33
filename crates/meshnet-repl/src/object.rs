//! Replicas of MeshObjects and their home/lock bookkeeping.
//!
//! A replica holds the lock iff `lock_proxy` is `None`, and is the home
//! replica iff `home_proxy` is `None`. Proxies are named by the partner
//! MeshBase they lead to. Every mutation happens inside a `Transaction` on
//! the owning MeshBase; the methods here only maintain the state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::ChangeError;
use crate::externalized::ExternalizedNetMeshObject;
use crate::identifier::{MeshTypeIdentifier, NetMeshBaseIdentifier, NetMeshObjectIdentifier};

/// Get current time in milliseconds since Unix epoch.
pub fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Value of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Floating-point value.
    Float(f64),
    /// String value.
    String(String),
    /// Binary value.
    Blob(Vec<u8>),
}

/// One replica of a MeshObject.
#[derive(Debug, Clone, PartialEq)]
pub struct NetMeshObject {
    identifier: NetMeshObjectIdentifier,
    types: BTreeSet<MeshTypeIdentifier>,
    properties: BTreeMap<MeshTypeIdentifier, PropertyValue>,
    neighbors: BTreeMap<NetMeshObjectIdentifier, BTreeSet<MeshTypeIdentifier>>,
    equivalents: BTreeSet<NetMeshObjectIdentifier>,
    time_created: u64,
    time_updated: u64,
    time_read: u64,
    time_expires: Option<u64>,
    proxies: Vec<NetMeshBaseIdentifier>,
    home_proxy: Option<NetMeshBaseIdentifier>,
    lock_proxy: Option<NetMeshBaseIdentifier>,
    will_give_up_lock: bool,
    will_give_up_home_replica: bool,
    dead: bool,
}

impl NetMeshObject {
    /// A fresh home replica holding the lock, not replicated anywhere.
    pub fn new(identifier: NetMeshObjectIdentifier, now: u64) -> Self {
        Self {
            identifier,
            types: BTreeSet::new(),
            properties: BTreeMap::new(),
            neighbors: BTreeMap::new(),
            equivalents: BTreeSet::new(),
            time_created: now,
            time_updated: now,
            time_read: now,
            time_expires: None,
            proxies: Vec::new(),
            home_proxy: None,
            lock_proxy: None,
            will_give_up_lock: true,
            will_give_up_home_replica: true,
            dead: false,
        }
    }

    /// Create a replica from a conveyed snapshot.
    pub(crate) fn from_externalized(
        ext: &ExternalizedNetMeshObject,
        proxies: Vec<NetMeshBaseIdentifier>,
        home_proxy: Option<NetMeshBaseIdentifier>,
        lock_proxy: Option<NetMeshBaseIdentifier>,
    ) -> Self {
        let mut obj = Self::new(ext.identifier.clone(), ext.time_created);
        obj.overwrite_from(ext);
        obj.will_give_up_lock = ext.will_give_up_lock;
        obj.will_give_up_home_replica = ext.will_give_up_home_replica;
        obj.proxies = proxies;
        obj.home_proxy = home_proxy;
        obj.lock_proxy = lock_proxy;
        obj
    }

    /// Identifier of this object.
    pub fn identifier(&self) -> &NetMeshObjectIdentifier {
        &self.identifier
    }

    /// Types this object is blessed with.
    pub fn types(&self) -> &BTreeSet<MeshTypeIdentifier> {
        &self.types
    }

    /// Returns true if blessed with `type_id`.
    pub fn is_blessed_by(&self, type_id: &MeshTypeIdentifier) -> bool {
        self.types.contains(type_id)
    }

    /// Current value of a property.
    pub fn property(&self, property: &MeshTypeIdentifier) -> Option<&PropertyValue> {
        self.properties.get(property)
    }

    /// All property values.
    pub fn properties(&self) -> &BTreeMap<MeshTypeIdentifier, PropertyValue> {
        &self.properties
    }

    /// Neighbors and the role types of each relationship.
    pub fn neighbors(&self) -> &BTreeMap<NetMeshObjectIdentifier, BTreeSet<MeshTypeIdentifier>> {
        &self.neighbors
    }

    /// Returns true if related to `neighbor`.
    pub fn is_related_to(&self, neighbor: &NetMeshObjectIdentifier) -> bool {
        self.neighbors.contains_key(neighbor)
    }

    /// Objects this one is equivalent to.
    pub fn equivalents(&self) -> &BTreeSet<NetMeshObjectIdentifier> {
        &self.equivalents
    }

    /// Creation time (ms since epoch).
    pub fn time_created(&self) -> u64 {
        self.time_created
    }

    /// Last update time (ms since epoch).
    pub fn time_updated(&self) -> u64 {
        self.time_updated
    }

    /// Last read time (ms since epoch).
    pub fn time_read(&self) -> u64 {
        self.time_read
    }

    /// Expiry time, if any.
    pub fn time_expires(&self) -> Option<u64> {
        self.time_expires
    }

    /// Partners this object is replicated towards.
    pub fn proxies(&self) -> &[NetMeshBaseIdentifier] {
        &self.proxies
    }

    /// Partner through which the home replica is reached, `None` if this is it.
    pub fn proxy_towards_home(&self) -> Option<&NetMeshBaseIdentifier> {
        self.home_proxy.as_ref()
    }

    /// Partner through which the lock is reached, `None` if held here.
    pub fn proxy_towards_lock(&self) -> Option<&NetMeshBaseIdentifier> {
        self.lock_proxy.as_ref()
    }

    /// Returns true if this replica holds the update rights.
    pub fn has_lock(&self) -> bool {
        self.lock_proxy.is_none()
    }

    /// Returns true if this is the home replica.
    pub fn is_home_replica(&self) -> bool {
        self.home_proxy.is_none()
    }

    /// Returns true if this object is replicated towards `partner`.
    pub fn has_replica_towards(&self, partner: &NetMeshBaseIdentifier) -> bool {
        self.proxies.contains(partner)
    }

    /// Whether this replica hands out the lock when asked.
    pub fn will_give_up_lock(&self) -> bool {
        self.will_give_up_lock
    }

    /// Whether this replica hands out home replica status when asked.
    pub fn will_give_up_home_replica(&self) -> bool {
        self.will_give_up_home_replica
    }

    /// Returns true once deleted.
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub(crate) fn set_will_give_up_lock(&mut self, value: bool) {
        self.will_give_up_lock = value;
    }

    pub(crate) fn set_will_give_up_home_replica(&mut self, value: bool) {
        self.will_give_up_home_replica = value;
    }

    pub(crate) fn set_time_expires(&mut self, value: Option<u64>) {
        self.time_expires = value;
    }

    pub(crate) fn touch(&mut self, now: u64) {
        self.time_updated = now;
    }

    pub(crate) fn mark_read(&mut self, now: u64) {
        self.time_read = now;
    }

    fn check_alive(&self) -> Result<(), ChangeError> {
        if self.dead {
            return Err(ChangeError::IsDead {
                identifier: self.identifier.clone(),
            });
        }
        Ok(())
    }

    // ---- ripple operations: apply an already-authorized change ----

    pub(crate) fn ripple_bless(&mut self, types: &[MeshTypeIdentifier]) -> Result<(), ChangeError> {
        self.check_alive()?;
        if let Some(already) = types.iter().find(|t| self.types.contains(*t)) {
            return Err(ChangeError::BlessedAlready {
                identifier: self.identifier.clone(),
                type_id: already.to_string(),
            });
        }
        self.types.extend(types.iter().cloned());
        Ok(())
    }

    pub(crate) fn ripple_unbless(&mut self, types: &[MeshTypeIdentifier]) -> Result<(), ChangeError> {
        self.check_alive()?;
        if let Some(missing) = types.iter().find(|t| !self.types.contains(*t)) {
            return Err(ChangeError::NotBlessed {
                identifier: self.identifier.clone(),
                type_id: missing.to_string(),
            });
        }
        for t in types {
            self.types.remove(t);
        }
        Ok(())
    }

    pub(crate) fn ripple_relate(&mut self, neighbor: &NetMeshObjectIdentifier) -> Result<(), ChangeError> {
        self.check_alive()?;
        if self.neighbors.contains_key(neighbor) {
            return Err(ChangeError::RelatedAlready {
                identifier: self.identifier.clone(),
                neighbor: neighbor.clone(),
            });
        }
        self.neighbors.insert(neighbor.clone(), BTreeSet::new());
        Ok(())
    }

    pub(crate) fn ripple_unrelate(&mut self, neighbor: &NetMeshObjectIdentifier) -> Result<(), ChangeError> {
        self.check_alive()?;
        if self.neighbors.remove(neighbor).is_none() {
            return Err(ChangeError::NotRelated {
                identifier: self.identifier.clone(),
                neighbor: neighbor.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn ripple_bless_relationship(
        &mut self,
        neighbor: &NetMeshObjectIdentifier,
        roles: &[MeshTypeIdentifier],
    ) -> Result<(), ChangeError> {
        self.check_alive()?;
        let identifier = self.identifier.clone();
        let current = self
            .neighbors
            .get_mut(neighbor)
            .ok_or_else(|| ChangeError::NotRelated {
                identifier: identifier.clone(),
                neighbor: neighbor.clone(),
            })?;
        if let Some(already) = roles.iter().find(|r| current.contains(*r)) {
            return Err(ChangeError::RoleTypeBlessedAlready {
                identifier,
                neighbor: neighbor.clone(),
                role: already.to_string(),
            });
        }
        current.extend(roles.iter().cloned());
        Ok(())
    }

    pub(crate) fn ripple_unbless_relationship(
        &mut self,
        neighbor: &NetMeshObjectIdentifier,
        roles: &[MeshTypeIdentifier],
    ) -> Result<(), ChangeError> {
        self.check_alive()?;
        let identifier = self.identifier.clone();
        let current = self
            .neighbors
            .get_mut(neighbor)
            .ok_or_else(|| ChangeError::NotRelated {
                identifier: identifier.clone(),
                neighbor: neighbor.clone(),
            })?;
        if let Some(missing) = roles.iter().find(|r| !current.contains(*r)) {
            return Err(ChangeError::RoleTypeNotBlessed {
                identifier,
                neighbor: neighbor.clone(),
                role: missing.to_string(),
            });
        }
        for r in roles {
            current.remove(r);
        }
        Ok(())
    }

    pub(crate) fn ripple_add_as_equivalent(&mut self, equivalent: &NetMeshObjectIdentifier) -> Result<(), ChangeError> {
        self.check_alive()?;
        if !self.equivalents.insert(equivalent.clone()) {
            return Err(ChangeError::EquivalentAlready {
                identifier: self.identifier.clone(),
                equivalent: equivalent.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn ripple_remove_as_equivalent(
        &mut self,
        equivalent: &NetMeshObjectIdentifier,
    ) -> Result<(), ChangeError> {
        self.check_alive()?;
        if !self.equivalents.remove(equivalent) {
            return Err(ChangeError::NotEquivalent {
                identifier: self.identifier.clone(),
                equivalent: equivalent.clone(),
            });
        }
        Ok(())
    }

    /// Set or clear a property, returning the previous value.
    pub(crate) fn ripple_set_property(
        &mut self,
        property: &MeshTypeIdentifier,
        value: Option<PropertyValue>,
    ) -> Result<Option<PropertyValue>, ChangeError> {
        self.check_alive()?;
        Ok(match value {
            Some(v) => self.properties.insert(property.clone(), v),
            None => self.properties.remove(property),
        })
    }

    pub(crate) fn ripple_delete(&mut self) -> Result<(), ChangeError> {
        self.check_alive()?;
        self.dead = true;
        Ok(())
    }

    /// Overwrite the replicated state with a newer snapshot, merging the proxy bookkeeping.
    pub(crate) fn ripple_resynchronize(
        &mut self,
        ext: &ExternalizedNetMeshObject,
        proxies: &[NetMeshBaseIdentifier],
        home_proxy: Option<NetMeshBaseIdentifier>,
        lock_proxy: Option<NetMeshBaseIdentifier>,
    ) -> Result<(), ChangeError> {
        self.check_alive()?;
        self.overwrite_from(ext);
        for p in proxies {
            if !self.proxies.contains(p) {
                self.proxies.push(p.clone());
            }
        }
        self.home_proxy = home_proxy;
        self.lock_proxy = lock_proxy;
        Ok(())
    }

    fn overwrite_from(&mut self, ext: &ExternalizedNetMeshObject) {
        self.types = ext.types.iter().cloned().collect();
        self.properties = ext.properties.clone();
        self.neighbors = ext
            .neighbors
            .iter()
            .map(|(n, roles)| (n.clone(), roles.iter().cloned().collect()))
            .collect();
        self.equivalents = ext.equivalents.iter().cloned().collect();
        self.time_created = ext.time_created;
        self.time_updated = ext.time_updated;
        self.time_read = ext.time_read;
        self.time_expires = ext.time_expires;
    }

    // ---- proxy-only bookkeeping ----

    pub(crate) fn register_replication_towards(&mut self, partner: &NetMeshBaseIdentifier) -> Result<(), ChangeError> {
        if self.proxies.contains(partner) {
            return Err(self.replication_error(partner, "already replicated towards partner"));
        }
        self.proxies.push(partner.clone());
        Ok(())
    }

    /// Forget the replica towards `partner`. Home or lock pointing there fall back to here.
    pub(crate) fn unregister_replication_towards(
        &mut self,
        partner: &NetMeshBaseIdentifier,
    ) -> Result<(), ChangeError> {
        let before = self.proxies.len();
        self.proxies.retain(|p| p != partner);
        if self.proxies.len() == before {
            return Err(self.replication_error(partner, "not replicated towards partner"));
        }
        if self.home_proxy.as_ref() == Some(partner) {
            self.home_proxy = None;
        }
        if self.lock_proxy.as_ref() == Some(partner) {
            self.lock_proxy = None;
        }
        Ok(())
    }

    /// The lock arrived here from `partner`.
    pub(crate) fn push_lock(&mut self, partner: &NetMeshBaseIdentifier) -> Result<(), ChangeError> {
        match &self.lock_proxy {
            None => Err(self.replication_error(partner, "lock is here already")),
            Some(current) if current != partner => {
                let msg = format!("lock pushed by partner, expected from {current}");
                self.lock_proxy = None;
                Err(self.replication_error(partner, &msg))
            }
            Some(_) => {
                self.lock_proxy = None;
                Ok(())
            }
        }
    }

    /// Hand the lock to `partner`. The home direction may always take it back.
    pub(crate) fn surrender_lock(&mut self, partner: &NetMeshBaseIdentifier) -> bool {
        let reclaim_by_home = self.home_proxy.as_ref() == Some(partner);
        if !self.will_give_up_lock && !reclaim_by_home {
            return false;
        }
        if let Some(current) = &self.lock_proxy {
            if current != partner {
                return false;
            }
        }
        if !self.proxies.contains(partner) {
            self.proxies.push(partner.clone());
        }
        self.lock_proxy = Some(partner.clone());
        true
    }

    /// Home replica status arrived here from `partner`.
    pub(crate) fn push_home_replica(&mut self, partner: &NetMeshBaseIdentifier) -> Result<(), ChangeError> {
        match &self.home_proxy {
            None => Err(self.replication_error(partner, "home replica is here already")),
            Some(current) if current != partner => {
                let msg = format!("home replica pushed by partner, expected from {current}");
                self.home_proxy = None;
                Err(self.replication_error(partner, &msg))
            }
            Some(_) => {
                self.home_proxy = None;
                Ok(())
            }
        }
    }

    /// Hand home replica status to `partner`.
    pub(crate) fn surrender_home_replica(&mut self, partner: &NetMeshBaseIdentifier) -> bool {
        if !self.will_give_up_home_replica {
            return false;
        }
        if let Some(current) = &self.home_proxy {
            if current != partner {
                return false;
            }
        }
        if !self.proxies.contains(partner) {
            self.proxies.push(partner.clone());
        }
        self.home_proxy = Some(partner.clone());
        true
    }

    /// Forcefully take the lock back, returning the partner that had it.
    pub(crate) fn reclaim_lock(&mut self) -> Option<NetMeshBaseIdentifier> {
        self.lock_proxy.take()
    }

    fn replication_error(&self, partner: &NetMeshBaseIdentifier, msg: &str) -> ChangeError {
        ChangeError::Replication {
            identifier: self.identifier.clone(),
            partner: partner.clone(),
            msg: msg.to_string(),
        }
    }

    /// Snapshot for conveying to another MeshBase or for persistence.
    ///
    /// Without `capture_proxies` the snapshot claims to be the home replica
    /// holding the lock, with no proxies.
    pub fn as_externalized(&self, capture_proxies: bool) -> ExternalizedNetMeshObject {
        let (proxy_names, home_proxy, lock_proxy) = if capture_proxies {
            (self.proxies.clone(), self.home_proxy.clone(), self.lock_proxy.clone())
        } else {
            (Vec::new(), None, None)
        };
        ExternalizedNetMeshObject {
            identifier: self.identifier.clone(),
            types: self.types.iter().cloned().collect(),
            time_created: self.time_created,
            time_updated: self.time_updated,
            time_read: self.time_read,
            time_expires: self.time_expires,
            properties: self.properties.clone(),
            neighbors: self
                .neighbors
                .iter()
                .map(|(n, roles)| (n.clone(), roles.iter().cloned().collect()))
                .collect(),
            equivalents: self.equivalents.iter().cloned().collect(),
            will_give_up_home_replica: self.will_give_up_home_replica,
            will_give_up_lock: self.will_give_up_lock,
            proxy_names,
            home_proxy,
            lock_proxy,
        }
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

    fn person() -> MeshTypeIdentifier {
        MeshTypeIdentifier::new("Person")
    }

    mod ripple {
        use super::*;

        #[test]
        fn test_bless_twice_is_inconsistent() {
            let mut obj = NetMeshObject::new(id("a"), 1);
            obj.ripple_bless(&[person()]).unwrap();
            let err = obj.ripple_bless(&[person()]).unwrap_err();
            assert!(matches!(err, ChangeError::BlessedAlready { .. }));
            assert!(obj.is_blessed_by(&person()));
        }

        #[test]
        fn test_unbless_missing_leaves_state() {
            let mut obj = NetMeshObject::new(id("a"), 1);
            obj.ripple_bless(&[person()]).unwrap();
            let err = obj
                .ripple_unbless(&[person(), MeshTypeIdentifier::new("Robot")])
                .unwrap_err();
            assert!(matches!(err, ChangeError::NotBlessed { .. }));
            assert!(obj.is_blessed_by(&person()));
        }

        #[test]
        fn test_relationship_roles() {
            let mut obj = NetMeshObject::new(id("a"), 1);
            let role = MeshTypeIdentifier::new("Knows-S");
            assert!(matches!(
                obj.ripple_bless_relationship(&id("b"), &[role.clone()]),
                Err(ChangeError::NotRelated { .. })
            ));
            obj.ripple_relate(&id("b")).unwrap();
            obj.ripple_bless_relationship(&id("b"), &[role.clone()]).unwrap();
            assert!(matches!(
                obj.ripple_bless_relationship(&id("b"), &[role.clone()]),
                Err(ChangeError::RoleTypeBlessedAlready { .. })
            ));
            obj.ripple_unbless_relationship(&id("b"), &[role.clone()]).unwrap();
            assert!(matches!(
                obj.ripple_unbless_relationship(&id("b"), &[role]),
                Err(ChangeError::RoleTypeNotBlessed { .. })
            ));
            obj.ripple_unrelate(&id("b")).unwrap();
            assert!(matches!(obj.ripple_unrelate(&id("b")), Err(ChangeError::NotRelated { .. })));
        }

        #[test]
        fn test_property_returns_old_value() {
            let mut obj = NetMeshObject::new(id("a"), 1);
            let name = MeshTypeIdentifier::new("Name");
            let old = obj
                .ripple_set_property(&name, Some(PropertyValue::String("x".into())))
                .unwrap();
            assert_eq!(old, None);
            let old = obj.ripple_set_property(&name, None).unwrap();
            assert_eq!(old, Some(PropertyValue::String("x".into())));
        }

        #[test]
        fn test_dead_object_rejects_ripples() {
            let mut obj = NetMeshObject::new(id("a"), 1);
            obj.ripple_delete().unwrap();
            assert!(matches!(obj.ripple_delete(), Err(ChangeError::IsDead { .. })));
            assert!(matches!(obj.ripple_bless(&[person()]), Err(ChangeError::IsDead { .. })));
        }

        #[test]
        fn test_equivalents() {
            let mut obj = NetMeshObject::new(id("a"), 1);
            obj.ripple_add_as_equivalent(&id("b")).unwrap();
            assert!(obj.ripple_add_as_equivalent(&id("b")).is_err());
            obj.ripple_remove_as_equivalent(&id("b")).unwrap();
            assert!(matches!(
                obj.ripple_remove_as_equivalent(&id("b")),
                Err(ChangeError::NotEquivalent { .. })
            ));
        }
    }

    mod bookkeeping {
        use super::*;

        #[test]
        fn test_new_object_is_home_with_lock() {
            let obj = NetMeshObject::new(id("a"), 1);
            assert!(obj.has_lock());
            assert!(obj.is_home_replica());
            assert!(obj.proxies().is_empty());
        }

        #[test]
        fn test_lock_moves_and_returns() {
            let m2 = base("http://m2/");
            let mut obj = NetMeshObject::new(id("a"), 1);
            obj.register_replication_towards(&m2).unwrap();
            assert!(obj.register_replication_towards(&m2).is_err());

            assert!(obj.surrender_lock(&m2));
            assert!(!obj.has_lock());
            assert_eq!(obj.proxy_towards_lock(), Some(&m2));

            obj.push_lock(&m2).unwrap();
            assert!(obj.has_lock());
            assert!(obj.push_lock(&m2).is_err());
        }

        #[test]
        fn test_refuses_lock_unless_home_asks() {
            let m2 = base("http://m2/");
            let m3 = base("http://m3/");
            let mut obj = NetMeshObject::new(id("a"), 1);
            obj.set_will_give_up_lock(false);
            assert!(!obj.surrender_lock(&m3));

            let mut replica =
                NetMeshObject::from_externalized(&obj.as_externalized(false), vec![m2.clone()], Some(m2.clone()), None);
            replica.set_will_give_up_lock(false);
            assert!(!replica.surrender_lock(&m3));
            assert!(replica.surrender_lock(&m2));
        }

        #[test]
        fn test_unregister_falls_back_to_here() {
            let m2 = base("http://m2/");
            let mut obj =
                NetMeshObject::from_externalized(&NetMeshObject::new(id("a"), 1).as_externalized(false), vec![m2.clone()], Some(m2.clone()), Some(m2.clone()));
            obj.unregister_replication_towards(&m2).unwrap();
            assert!(obj.has_lock());
            assert!(obj.is_home_replica());
            assert!(obj.unregister_replication_towards(&m2).is_err());
        }

        #[test]
        fn test_home_transfer() {
            let m2 = base("http://m2/");
            let mut obj = NetMeshObject::new(id("a"), 1);
            assert!(obj.surrender_home_replica(&m2));
            assert!(!obj.is_home_replica());
            assert!(obj.has_replica_towards(&m2));
            obj.push_home_replica(&m2).unwrap();
            assert!(obj.is_home_replica());
        }

        #[test]
        fn test_externalized_without_proxies_claims_home() {
            let m2 = base("http://m2/");
            let mut obj = NetMeshObject::new(id("a"), 1);
            obj.register_replication_towards(&m2).unwrap();
            obj.surrender_lock(&m2);
            let ext = obj.as_externalized(false);
            assert!(ext.proxy_names.is_empty());
            assert!(ext.lock_proxy.is_none());
            let ext = obj.as_externalized(true);
            assert_eq!(ext.lock_proxy, Some(m2));
        }
    }
}
