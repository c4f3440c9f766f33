//! In-memory NetMeshBase: the replicas of one node, its transactions and its proxies.
//!
//! All replica state lives behind one async mutex. A `Transaction` owns the
//! guard for its whole lifetime, so transactions on one MeshBase are strictly
//! serialized. Proxies are created lazily per partner and kept until the
//! partner is removed or the MeshBase dies.

use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::access::{
    AccessOutcome, AccessResult, CoherenceSpecification, NetMeshObjectAccessSpecification,
};
use crate::config::ReplConfig;
use crate::error::{ReplError, Result};
use crate::externalized::ExternalizedProxy;
use crate::identifier::{NetMeshBaseIdentifier, NetMeshObjectIdentifier, NetMeshObjectIdentifierFactory};
use crate::nameserver::NameServer;
use crate::object::{current_time_ms, NetMeshObject};
use crate::policy::{DefaultProxyPolicy, ProxyPolicy, ReplicaView};
use crate::proxy::Proxy;
use crate::transaction::Transaction;

/// Replica state of one MeshBase.
#[derive(Debug)]
pub struct MeshBaseState {
    here: NetMeshBaseIdentifier,
    objects: HashMap<NetMeshObjectIdentifier, NetMeshObject>,
    next_sequence: u64,
    refuse_to_give_up_lock: bool,
    refuse_to_give_up_home: bool,
}

impl MeshBaseState {
    pub(crate) fn new(here: NetMeshBaseIdentifier) -> Self {
        Self {
            here,
            objects: HashMap::new(),
            next_sequence: 0,
            refuse_to_give_up_lock: false,
            refuse_to_give_up_home: false,
        }
    }

    /// All replicas.
    pub fn objects(&self) -> impl Iterator<Item = &NetMeshObject> {
        self.objects.values()
    }

    /// Number of replicas.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if there are no replicas.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub(crate) fn get_mut(&mut self, identifier: &NetMeshObjectIdentifier) -> Option<&mut NetMeshObject> {
        self.objects.get_mut(identifier)
    }

    pub(crate) fn insert(&mut self, obj: NetMeshObject) {
        self.objects.insert(obj.identifier().clone(), obj);
    }

    pub(crate) fn remove(&mut self, identifier: &NetMeshObjectIdentifier) -> Option<NetMeshObject> {
        self.objects.remove(identifier)
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    /// Look up an object, falling back to one that is equivalent to it.
    pub(crate) fn resolve(&mut self, identifier: &NetMeshObjectIdentifier, now: u64) -> Option<AccessResult> {
        if let Some(obj) = self.objects.get_mut(identifier) {
            obj.mark_read(now);
            return Some(AccessResult::Found(obj.clone()));
        }
        let stand_in = self
            .objects
            .values_mut()
            .find(|obj| obj.equivalents().contains(identifier))?;
        stand_in.mark_read(now);
        Some(AccessResult::Redirected {
            found: stand_in.clone(),
        })
    }
}

impl ReplicaView for MeshBaseState {
    fn here(&self) -> &NetMeshBaseIdentifier {
        &self.here
    }

    fn find(&self, identifier: &NetMeshObjectIdentifier) -> Option<&NetMeshObject> {
        self.objects.get(identifier)
    }

    fn find_equivalent(&self, identifier: &NetMeshObjectIdentifier) -> Option<&NetMeshObject> {
        self.objects
            .values()
            .find(|obj| obj.equivalents().contains(identifier))
    }

    fn refuses_to_give_up_lock(&self) -> bool {
        self.refuse_to_give_up_lock
    }

    fn refuses_to_give_up_home(&self) -> bool {
        self.refuse_to_give_up_home
    }
}

struct Inner {
    identifier: NetMeshBaseIdentifier,
    factory: NetMeshObjectIdentifierFactory,
    config: ReplConfig,
    state: Arc<Mutex<MeshBaseState>>,
    proxies: DashMap<NetMeshBaseIdentifier, Proxy>,
    policy: Arc<dyn ProxyPolicy>,
    name_server: Arc<dyn NameServer>,
    runtime: Handle,
    dead: AtomicBool,
}

/// A MeshBase whose objects replicate to other MeshBases. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct NetMeshBase {
    inner: Arc<Inner>,
}

impl fmt::Debug for NetMeshBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetMeshBase")
            .field("identifier", &self.inner.identifier)
            .field("proxies", &self.inner.proxies.len())
            .field("dead", &self.is_dead())
            .finish()
    }
}

/// Non-owning handle to a MeshBase, held by its proxies.
#[derive(Clone)]
pub(crate) struct WeakNetMeshBase {
    inner: Weak<Inner>,
}

impl WeakNetMeshBase {
    pub(crate) fn upgrade(&self) -> Option<NetMeshBase> {
        self.inner.upgrade().map(|inner| NetMeshBase { inner })
    }
}

impl NetMeshBase {
    /// Create a MeshBase with the default proxy policy and register it with `name_server`.
    pub fn create(
        identifier: NetMeshBaseIdentifier,
        config: ReplConfig,
        name_server: Arc<dyn NameServer>,
        runtime: Handle,
    ) -> Self {
        let policy = Arc::new(DefaultProxyPolicy::new(&config));
        Self::create_with_policy(identifier, config, policy, name_server, runtime)
    }

    /// Create a MeshBase whose proxies all use `policy`.
    pub fn create_with_policy(
        identifier: NetMeshBaseIdentifier,
        config: ReplConfig,
        policy: Arc<dyn ProxyPolicy>,
        name_server: Arc<dyn NameServer>,
        runtime: Handle,
    ) -> Self {
        let mut state = MeshBaseState::new(identifier.clone());
        let home = NetMeshObjectIdentifier::home_object(identifier.clone());
        state.insert(NetMeshObject::new(home, current_time_ms()));

        let base = Self {
            inner: Arc::new(Inner {
                factory: NetMeshObjectIdentifierFactory::new(identifier.clone()),
                identifier,
                config,
                state: Arc::new(Mutex::new(state)),
                proxies: DashMap::new(),
                policy,
                name_server,
                runtime,
                dead: AtomicBool::new(false),
            }),
        };
        info!(mesh_base = %base.identifier(), policy = base.inner.policy.name(), "mesh base created");
        base.inner.name_server.register(base.clone());
        base
    }

    /// Identifier of this MeshBase.
    pub fn identifier(&self) -> &NetMeshBaseIdentifier {
        &self.inner.identifier
    }

    /// Identifier factory for objects homed here.
    pub fn identifier_factory(&self) -> &NetMeshObjectIdentifierFactory {
        &self.inner.factory
    }

    /// Identifier of the home object.
    pub fn home_object_identifier(&self) -> NetMeshObjectIdentifier {
        self.inner.factory.home_object_identifier()
    }

    /// Configuration.
    pub fn config(&self) -> &ReplConfig {
        &self.inner.config
    }

    /// Policy shared by all proxies of this MeshBase.
    pub fn policy(&self) -> &Arc<dyn ProxyPolicy> {
        &self.inner.policy
    }

    /// Name server used to reach partners.
    pub fn name_server(&self) -> &Arc<dyn NameServer> {
        &self.inner.name_server
    }

    /// Runtime that proxies and timers run on.
    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Returns true once `die` has been called.
    pub fn is_dead(&self) -> bool {
        self.inner.dead.load(Ordering::SeqCst)
    }

    pub(crate) fn downgrade(&self) -> WeakNetMeshBase {
        WeakNetMeshBase {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn check_alive(&self) -> Result<()> {
        if self.is_dead() {
            return Err(ReplError::Shutdown);
        }
        Ok(())
    }

    pub(crate) async fn lock_state(&self) -> OwnedMutexGuard<MeshBaseState> {
        Arc::clone(&self.inner.state).lock_owned().await
    }

    /// Snapshot of a replica.
    pub async fn find_mesh_object_by_identifier(&self, identifier: &NetMeshObjectIdentifier) -> Option<NetMeshObject> {
        self.lock_state().await.find(identifier).cloned()
    }

    /// Snapshots of several replicas, in request order.
    pub async fn find_mesh_objects_by_identifiers(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
    ) -> Vec<Option<NetMeshObject>> {
        let state = self.lock_state().await;
        identifiers.iter().map(|id| state.find(id).cloned()).collect()
    }

    /// Number of replicas held here.
    pub async fn size(&self) -> usize {
        self.lock_state().await.len()
    }

    /// Find objects locally, obtaining replicas through proxies where the path leads elsewhere.
    ///
    /// Each remote hop is given `timeout_ms` to answer. Objects that cannot be
    /// obtained are reported per element in the outcome.
    pub async fn access_locally(
        &self,
        specs: Vec<NetMeshObjectAccessSpecification>,
        timeout_ms: u64,
    ) -> Result<AccessOutcome> {
        self.check_alive()?;
        if specs.is_empty() {
            return Ok(AccessOutcome::empty());
        }
        let now = current_time_ms();
        let mut results: Vec<Option<AccessResult>> = Vec::with_capacity(specs.len());
        let mut remote: BTreeMap<NetMeshBaseIdentifier, (Option<CoherenceSpecification>, Vec<(usize, NetMeshObjectAccessSpecification)>)> =
            BTreeMap::new();
        {
            let mut state = self.lock_state().await;
            for (i, spec) in specs.iter().enumerate() {
                let spec = self.strip_local_hops(spec);
                if let Some(found) = state.resolve(spec.object(), now) {
                    results.push(Some(found));
                    continue;
                }
                let hop = spec.first_hop();
                if &hop.base == self.identifier() {
                    results.push(Some(AccessResult::NotFound(ReplError::ObjectNotFound {
                        identifier: spec.object().clone(),
                    })));
                } else {
                    results.push(None);
                    let entry = remote.entry(hop.base.clone()).or_insert_with(|| (hop.coherence.clone(), Vec::new()));
                    entry.1.push((i, spec.remainder()));
                }
            }
        }

        for (via, (coherence, requests)) in remote {
            let asked: Vec<NetMeshObjectAccessSpecification> = requests.iter().map(|(_, s)| s.clone()).collect();
            let timed_out = match self.obtain_proxy_for(&via, coherence) {
                Ok(proxy) => match proxy.obtain_replicas(asked, timeout_ms).await {
                    Ok(()) => false,
                    Err(e) => {
                        warn!(mesh_base = %self.identifier(), partner = %via, error = %e, "obtaining replicas failed");
                        e.is_timeout()
                    }
                },
                Err(e) => {
                    warn!(mesh_base = %self.identifier(), partner = %via, error = %e, "no proxy for partner");
                    false
                }
            };
            let mut state = self.lock_state().await;
            for (i, spec) in requests {
                let result = state.resolve(spec.object(), now).unwrap_or_else(|| {
                    AccessResult::NotFound(if timed_out {
                        ReplError::RemoteQueryTimeout {
                            partner: via.clone(),
                            timeout_ms,
                        }
                    } else {
                        ReplError::ObjectNotFound {
                            identifier: spec.object().clone(),
                        }
                    })
                });
                results[i] = Some(result);
            }
        }

        AccessOutcome::new(specs, results)
    }

    fn strip_local_hops(&self, spec: &NetMeshObjectAccessSpecification) -> NetMeshObjectAccessSpecification {
        let mut spec = spec.clone();
        while spec.path().first().map(|hop| &hop.base == self.identifier()).unwrap_or(false) {
            spec = spec.remainder();
        }
        spec
    }

    /// Start a transaction for local changes. Waits until no other transaction is open.
    pub async fn create_transaction_now(&self) -> Result<Transaction> {
        self.check_alive()?;
        Ok(Transaction::new(self.clone(), self.lock_state().await, None))
    }

    /// Start a transaction that applies changes received from `partner`.
    pub(crate) async fn create_transaction_for(&self, partner: &NetMeshBaseIdentifier) -> Transaction {
        Transaction::new(self.clone(), self.lock_state().await, Some(partner.clone()))
    }

    /// The proxy towards `partner`, created on first use.
    pub fn obtain_proxy_for(
        &self,
        partner: &NetMeshBaseIdentifier,
        coherence: Option<CoherenceSpecification>,
    ) -> Result<Proxy> {
        self.check_alive()?;
        if partner == self.identifier() {
            return Err(ReplError::MessageSend(meshnet_pingpong::EndpointError::SelfPartner {
                name: partner.to_string(),
            }));
        }
        if let Some(existing) = self.inner.proxies.get(partner) {
            return Ok(existing.value().clone());
        }
        let proxy = self
            .inner
            .proxies
            .entry(partner.clone())
            .or_insert_with(|| {
                debug!(mesh_base = %self.identifier(), partner = %partner, "creating proxy");
                Proxy::create(self, partner.clone(), coherence)
            })
            .value()
            .clone();
        Ok(proxy)
    }

    /// The proxy towards `partner`, if one exists.
    pub fn proxy_for(&self, partner: &NetMeshBaseIdentifier) -> Option<Proxy> {
        self.inner.proxies.get(partner).map(|p| p.value().clone())
    }

    /// All current proxies.
    pub fn proxies(&self) -> Vec<Proxy> {
        self.inner.proxies.iter().map(|p| p.value().clone()).collect()
    }

    /// Re-create a proxy from its persisted form, replacing any live proxy to the same partner.
    pub fn restore_proxy(&self, externalized: ExternalizedProxy) -> Result<Proxy> {
        self.check_alive()?;
        if &externalized.here != self.identifier() {
            return Err(ReplError::Encoding {
                msg: format!(
                    "proxy belongs to {}, not to {}",
                    externalized.here,
                    self.identifier()
                ),
            });
        }
        let partner = externalized.there.clone();
        let proxy = Proxy::restore(self, externalized);
        if let Some(previous) = self.inner.proxies.insert(partner.clone(), proxy.clone()) {
            previous.die(false);
        }
        info!(mesh_base = %self.identifier(), partner = %partner, "restored proxy");
        Ok(proxy)
    }

    /// Tear down the proxy towards `partner` and forget all replication towards it.
    pub async fn remove_proxy(&self, partner: &NetMeshBaseIdentifier) {
        let Some((_, proxy)) = self.inner.proxies.remove(partner) else {
            return;
        };
        proxy.die(true);
        let mut tx = self.create_transaction_for(partner).await;
        let affected: Vec<NetMeshObjectIdentifier> = tx
            .view()
            .objects()
            .filter(|obj| obj.has_replica_towards(partner))
            .map(|obj| obj.identifier().clone())
            .collect();
        for identifier in affected {
            if let Err(e) = tx.unregister_replication(&identifier, partner) {
                warn!(mesh_base = %self.identifier(), partner = %partner, error = %e, "unregistering replication failed");
            }
        }
        if let Err(e) = tx.commit().await {
            warn!(mesh_base = %self.identifier(), error = %e, "commit after removing proxy failed");
        }
        info!(mesh_base = %self.identifier(), partner = %partner, "removed proxy");
    }

    /// Make this replica hold the lock, asking the partner in the direction of the lock if needed.
    ///
    /// Returns whether the lock is held here afterwards. A partner that does
    /// not answer within `timeout_ms` yields `RemoteQueryTimeout`.
    pub async fn try_to_obtain_lock(&self, identifier: &NetMeshObjectIdentifier, timeout_ms: u64) -> Result<bool> {
        let obj = self.require(identifier).await?;
        let Some(towards) = obj.proxy_towards_lock() else {
            return Ok(true);
        };
        let proxy = self.obtain_proxy_for(towards, None)?;
        proxy.try_to_obtain_locks(&[identifier.clone()], timeout_ms).await?;
        Ok(self.require(identifier).await?.has_lock())
    }

    /// Make this replica the home replica, asking the partner in the direction of the home if needed.
    pub async fn try_to_obtain_home_replica(
        &self,
        identifier: &NetMeshObjectIdentifier,
        timeout_ms: u64,
    ) -> Result<bool> {
        let obj = self.require(identifier).await?;
        let Some(towards) = obj.proxy_towards_home() else {
            return Ok(true);
        };
        let proxy = self.obtain_proxy_for(towards, None)?;
        proxy
            .try_to_obtain_home_replicas(&[identifier.clone()], timeout_ms)
            .await?;
        Ok(self.require(identifier).await?.is_home_replica())
    }

    /// Hand the lock held here to `partner`. Returns whether the lock left.
    pub async fn try_to_push_lock(
        &self,
        identifier: &NetMeshObjectIdentifier,
        partner: &NetMeshBaseIdentifier,
        timeout_ms: u64,
    ) -> Result<bool> {
        if !self.require(identifier).await?.has_lock() {
            return Ok(false);
        }
        let proxy = self.obtain_proxy_for(partner, None)?;
        proxy.try_to_push_locks(&[identifier.clone()], timeout_ms).await?;
        Ok(!self.require(identifier).await?.has_lock())
    }

    /// Hand home replica status held here to `partner`. Returns whether it left.
    pub async fn try_to_push_home_replica(
        &self,
        identifier: &NetMeshObjectIdentifier,
        partner: &NetMeshBaseIdentifier,
        timeout_ms: u64,
    ) -> Result<bool> {
        if !self.require(identifier).await?.is_home_replica() {
            return Ok(false);
        }
        let proxy = self.obtain_proxy_for(partner, None)?;
        proxy
            .try_to_push_home_replicas(&[identifier.clone()], timeout_ms)
            .await?;
        Ok(!self.require(identifier).await?.is_home_replica())
    }

    /// Take the lock back unilaterally. Only the home replica may do this.
    pub async fn force_obtain_lock(&self, identifier: &NetMeshObjectIdentifier) -> Result<()> {
        let mut tx = self.create_transaction_now().await?;
        let previous = tx.reclaim_lock(identifier)?;
        tx.commit().await?;
        if let Some(previous) = previous {
            info!(mesh_base = %self.identifier(), object = %identifier, previous = %previous, "reclaimed lock");
            let proxy = self.obtain_proxy_for(&previous, None)?;
            proxy.force_obtain_locks(&[identifier.clone()]).await?;
        }
        Ok(())
    }

    /// Ask the home direction for a fresh snapshot of a replica.
    pub async fn try_resynchronize_replica(&self, identifier: &NetMeshObjectIdentifier) -> Result<()> {
        let obj = self.require(identifier).await?;
        let Some(home) = obj.proxy_towards_home() else {
            return Ok(());
        };
        let proxy = self.obtain_proxy_for(home, None)?;
        proxy.try_resynchronize_replicas(&[identifier.clone()]).await
    }

    /// Refuse (or stop refusing) to hand out locks, whatever the objects say.
    pub async fn set_refuse_to_give_up_lock(&self, refuse: bool) {
        self.lock_state().await.refuse_to_give_up_lock = refuse;
    }

    /// Refuse (or stop refusing) to hand out home replica status.
    pub async fn set_refuse_to_give_up_home(&self, refuse: bool) {
        self.lock_state().await.refuse_to_give_up_home = refuse;
    }

    async fn require(&self, identifier: &NetMeshObjectIdentifier) -> Result<NetMeshObject> {
        self.check_alive()?;
        self.find_mesh_object_by_identifier(identifier)
            .await
            .ok_or_else(|| ReplError::ObjectNotFound {
                identifier: identifier.clone(),
            })
    }

    /// Shut down: leave the name server and stop every proxy. Replicas stay as they are.
    pub fn die(&self) {
        if self.inner.dead.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(mesh_base = %self.identifier(), "mesh base dying");
        self.inner.name_server.unregister(self.identifier());
        let partners: Vec<NetMeshBaseIdentifier> = self.inner.proxies.iter().map(|p| p.key().clone()).collect();
        for partner in partners {
            if let Some((_, proxy)) = self.inner.proxies.remove(&partner) {
                proxy.die(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessHop;
    use crate::identifier::MeshTypeIdentifier;
    use crate::nameserver::MemoryNameServer;

    fn base(s: &str) -> NetMeshBaseIdentifier {
        NetMeshBaseIdentifier::create(s).unwrap()
    }

    fn mesh_base(name: &str) -> NetMeshBase {
        NetMeshBase::create(
            base(name),
            ReplConfig::default(),
            Arc::new(MemoryNameServer::new()),
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_new_mesh_base_has_home_object() {
        let mb = mesh_base("http://m1/");
        let home = mb.home_object_identifier();
        assert!(home.identifies_home_object());
        let obj = mb.find_mesh_object_by_identifier(&home).await.unwrap();
        assert!(obj.has_lock());
        assert!(obj.is_home_replica());
        assert_eq!(mb.size().await, 1);
    }

    #[tokio::test]
    async fn test_access_locally_found_redirected_and_missing() {
        let mb = mesh_base("http://m1/");
        let a = mb.identifier_factory().create_identifier("a").unwrap();
        let b = mb.identifier_factory().create_identifier("b").unwrap();
        let missing = mb.identifier_factory().create_identifier("missing").unwrap();
        let alias = NetMeshObjectIdentifier::create(base("http://elsewhere/"), Some("alias")).unwrap();

        let mut tx = mb.create_transaction_now().await.unwrap();
        tx.create_mesh_object(Some(a.clone()), &[MeshTypeIdentifier::new("T")]).unwrap();
        tx.create_mesh_object(Some(b.clone()), &[]).unwrap();
        tx.commit().await.unwrap();

        let mut tx = mb.create_transaction_now().await.unwrap();
        tx.add_as_equivalent(&b, &alias).unwrap();
        tx.commit().await.unwrap();

        let outcome = mb
            .access_locally(
                vec![
                    NetMeshObjectAccessSpecification::to_home(a.clone()),
                    NetMeshObjectAccessSpecification::new(vec![AccessHop::new(base("http://m1/"))], alias),
                    NetMeshObjectAccessSpecification::to_home(missing),
                ],
                100,
            )
            .await
            .unwrap();
        assert!(outcome.is_partial_result_available());
        assert!(!outcome.is_complete_result_available());
        assert!(matches!(outcome.results()[0], Some(AccessResult::Found(_))));
        assert!(matches!(outcome.results()[1], Some(AccessResult::Redirected { .. })));
        assert!(matches!(outcome.cause_for(2), Some(ReplError::ObjectNotFound { .. })));
    }

    #[tokio::test]
    async fn test_access_locally_nothing_requested() {
        let mb = mesh_base("http://m1/");
        let outcome = mb.access_locally(Vec::new(), 100).await.unwrap();
        assert!(outcome.results().is_empty());
        assert!(outcome.is_complete_result_available());
        assert!(!outcome.is_partial_result_available());
        assert!(mb.proxies().is_empty());
    }

    #[tokio::test]
    async fn test_obtain_proxy_is_lazy_and_shared() {
        let mb = mesh_base("http://m1/");
        let m2 = base("http://m2/");
        assert!(mb.proxy_for(&m2).is_none());
        let p1 = mb.obtain_proxy_for(&m2, None).unwrap();
        let p2 = mb.obtain_proxy_for(&m2, None).unwrap();
        assert_eq!(p1.partner(), p2.partner());
        assert_eq!(mb.proxies().len(), 1);
        assert!(mb.obtain_proxy_for(&base("http://m1/"), None).is_err());
    }

    #[tokio::test]
    async fn test_die_rejects_further_work() {
        let mb = mesh_base("http://m1/");
        let proxy = mb.obtain_proxy_for(&base("http://m2/"), None).unwrap();
        mb.die();
        assert!(proxy.is_dead());
        assert!(mb.proxies().is_empty());
        assert!(matches!(mb.create_transaction_now().await, Err(ReplError::Shutdown)));
    }

    #[tokio::test]
    async fn test_force_obtain_lock_requires_home() {
        let mb = mesh_base("http://m1/");
        let home = mb.home_object_identifier();
        mb.force_obtain_lock(&home).await.unwrap();

        let foreign = NetMeshObjectIdentifier::create(base("http://m2/"), Some("x")).unwrap();
        let err = mb.force_obtain_lock(&foreign).await.unwrap_err();
        assert!(matches!(err, ReplError::Change(crate::error::ChangeError::NotFound { .. })));
    }
}
