//! Shadow MeshBases over external data, and the manager that keeps them fresh.
//!
//! A [`Probe`] reads a data source into a [`ShadowMeshBase`]. The
//! [`ProbeManager`] runs the first read when a shadow is obtained, then
//! re-runs it at the delay the shadow's coherence specification gives, until
//! that delay says never or the manager is stopped.

use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::access::CoherenceSpecification;
use crate::config::ProbeConfig;
use crate::error::{ReplError, Result};
use crate::identifier::{NetMeshBaseIdentifier, NetMeshObjectIdentifier};
use crate::meshbase::NetMeshBase;
use crate::nameserver::NameServer;
use crate::object::current_time_ms;
use crate::policy::ShadowProxyPolicy;
use crate::transaction::Transaction;

/// Reads an external data source into a shadow.
///
/// The probe sees the shadow's current content through `tx` and changes it to
/// match the source. A run that leaves `tx` without changes counts as "nothing
/// changed" for adaptive coherence.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Bring the shadow for `source` up to date.
    async fn read(&self, source: &NetMeshBaseIdentifier, tx: &mut Transaction) -> Result<()>;

    /// Whether clients may write to the shadow and hand it home replica status.
    fn is_writable(&self) -> bool {
        false
    }
}

/// Finds the probe for a data source.
pub trait ProbeDirectory: Send + Sync {
    /// The probe that can read `source`, if any.
    fn probe_for(&self, source: &NetMeshBaseIdentifier) -> Option<Arc<dyn Probe>>;
}

impl<F> ProbeDirectory for F
where
    F: Fn(&NetMeshBaseIdentifier) -> Option<Arc<dyn Probe>> + Send + Sync,
{
    fn probe_for(&self, source: &NetMeshBaseIdentifier) -> Option<Arc<dyn Probe>> {
        self(source)
    }
}

#[derive(Debug, Default)]
struct UpdateStats {
    update_count: u64,
    failure_count: u64,
    last_delay_ms: Option<u64>,
    delay_until_next_update_ms: Option<u64>,
    last_update: Option<u64>,
    last_successful_update: Option<u64>,
}

/// A MeshBase whose content comes from a probe.
pub struct ShadowMeshBase {
    base: NetMeshBase,
    probe: Arc<dyn Probe>,
    coherence: CoherenceSpecification,
    stats: Mutex<UpdateStats>,
}

impl fmt::Debug for ShadowMeshBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowMeshBase")
            .field("identifier", self.base.identifier())
            .field("coherence", &self.coherence)
            .field("writable", &self.probe.is_writable())
            .finish()
    }
}

impl ShadowMeshBase {
    /// Create a shadow for `source` and register it with `name_server`. No data is read yet.
    pub fn create(
        source: NetMeshBaseIdentifier,
        probe: Arc<dyn Probe>,
        coherence: CoherenceSpecification,
        config: &ProbeConfig,
        name_server: Arc<dyn NameServer>,
        runtime: Handle,
    ) -> Self {
        let policy = Arc::new(ShadowProxyPolicy::new(probe.is_writable()));
        let base = NetMeshBase::create_with_policy(source, config.shadow.clone(), policy, name_server, runtime);
        Self {
            base,
            probe,
            coherence,
            stats: Mutex::new(UpdateStats::default()),
        }
    }

    /// The MeshBase holding the probed content.
    pub fn mesh_base(&self) -> &NetMeshBase {
        &self.base
    }

    /// Identifier of the data source, which is also the shadow's identifier.
    pub fn identifier(&self) -> &NetMeshBaseIdentifier {
        self.base.identifier()
    }

    /// Coherence specification driving the update schedule.
    pub fn coherence(&self) -> &CoherenceSpecification {
        &self.coherence
    }

    /// Number of successful probe runs.
    pub fn update_count(&self) -> u64 {
        self.stats().update_count
    }

    /// Number of failed probe runs.
    pub fn failure_count(&self) -> u64 {
        self.stats().failure_count
    }

    /// Delay until the next run, or `None` if the shadow is never updated again.
    pub fn delay_until_next_update(&self) -> Option<u64> {
        self.stats().delay_until_next_update_ms
    }

    /// Time of the last run, successful or not.
    pub fn last_update(&self) -> Option<u64> {
        self.stats().last_update
    }

    /// Time of the last successful run.
    pub fn last_successful_update(&self) -> Option<u64> {
        self.stats().last_successful_update
    }

    fn stats(&self) -> std::sync::MutexGuard<'_, UpdateStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run the probe once and return the delay until the next run.
    ///
    /// Locks handed out to clients are taken back first, so the probe can
    /// write every object homed here. A failed run still schedules a retry at
    /// the delay a changed run would get.
    pub async fn do_update_now(&self) -> Result<Option<u64>> {
        if self.base.is_dead() {
            return Err(ReplError::Shutdown);
        }
        if self.update_count() > 0 {
            self.reclaim_locks().await?;
        }

        let now = current_time_ms();
        let outcome = self.run_probe().await;

        let mut stats = self.stats();
        stats.last_update = Some(now);
        let changed = match &outcome {
            Ok(changed) => {
                stats.update_count += 1;
                stats.last_successful_update = Some(now);
                *changed
            }
            Err(_) => {
                stats.failure_count += 1;
                true
            }
        };
        let next = self.coherence.next_delay_ms(stats.last_delay_ms, changed);
        if next.is_some() {
            stats.last_delay_ms = next;
        }
        stats.delay_until_next_update_ms = next;
        drop(stats);

        outcome.map(|changed| {
            debug!(
                shadow = %self.identifier(),
                changed = changed,
                next_delay_ms = ?next,
                "shadow updated"
            );
            next
        })
    }

    async fn run_probe(&self) -> Result<bool> {
        let mut tx = self.base.create_transaction_now().await?;
        match self.probe.read(self.identifier(), &mut tx).await {
            Ok(()) => {
                let changed = !tx.changes().is_empty();
                tx.commit().await?;
                Ok(changed)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    async fn reclaim_locks(&self) -> Result<()> {
        let lent: Vec<NetMeshObjectIdentifier> = {
            let state = self.base.lock_state().await;
            state
                .objects()
                .filter(|obj| obj.is_home_replica() && !obj.has_lock())
                .map(|obj| obj.identifier().clone())
                .collect()
        };
        for identifier in lent {
            self.base.force_obtain_lock(&identifier).await?;
        }
        Ok(())
    }

    /// Stop the underlying MeshBase.
    pub fn die(&self) {
        self.base.die();
    }
}

struct ManagerInner {
    config: ProbeConfig,
    directory: Arc<dyn ProbeDirectory>,
    name_server: Arc<dyn NameServer>,
    runtime: Handle,
    shadows: DashMap<NetMeshBaseIdentifier, Arc<ShadowMeshBase>>,
    tasks: DashMap<NetMeshBaseIdentifier, JoinHandle<()>>,
    stopped: AtomicBool,
}

/// Creates shadows on demand and schedules their updates.
#[derive(Clone)]
pub struct ProbeManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for ProbeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeManager")
            .field("shadows", &self.inner.shadows.len())
            .field("scheduled", &self.inner.tasks.len())
            .field("stopped", &self.inner.stopped.load(Ordering::SeqCst))
            .finish()
    }
}

impl ProbeManager {
    /// Create a manager that finds probes in `directory`.
    pub fn new(
        config: ProbeConfig,
        directory: Arc<dyn ProbeDirectory>,
        name_server: Arc<dyn NameServer>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                directory,
                name_server,
                runtime,
                shadows: DashMap::new(),
                tasks: DashMap::new(),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// The shadow for `source`, if one exists.
    pub fn get(&self, source: &NetMeshBaseIdentifier) -> Option<Arc<ShadowMeshBase>> {
        self.inner.shadows.get(source).map(|s| Arc::clone(s.value()))
    }

    /// Number of shadows.
    pub fn len(&self) -> usize {
        self.inner.shadows.len()
    }

    /// Whether there are no shadows.
    pub fn is_empty(&self) -> bool {
        self.inner.shadows.is_empty()
    }

    /// Whether updates are scheduled for `source`.
    pub fn is_scheduled(&self, source: &NetMeshBaseIdentifier) -> bool {
        self.inner.tasks.contains_key(source)
    }

    /// The shadow for `source`, created and read for the first time if needed.
    ///
    /// Without a coherence specification the configured default is used. If
    /// the first read fails, no shadow is kept.
    pub async fn obtain_for(
        &self,
        source: &NetMeshBaseIdentifier,
        coherence: Option<CoherenceSpecification>,
    ) -> Result<Arc<ShadowMeshBase>> {
        if let Some(existing) = self.get(source) {
            return Ok(existing);
        }
        let probe = self
            .inner
            .directory
            .probe_for(source)
            .ok_or_else(|| ReplError::UnknownMeshBase {
                identifier: source.clone(),
            })?;
        let coherence = coherence.unwrap_or_else(|| self.inner.config.default_coherence.clone());

        let shadow = Arc::new(ShadowMeshBase::create(
            source.clone(),
            probe,
            coherence,
            &self.inner.config,
            Arc::clone(&self.inner.name_server),
            self.inner.runtime.clone(),
        ));
        let next = match shadow.do_update_now().await {
            Ok(next) => next,
            Err(e) => {
                warn!(shadow = %source, error = %e, "first probe run failed");
                shadow.die();
                return Err(e);
            }
        };

        // Another caller may have created the same shadow while we were reading.
        let shadow = match self.inner.shadows.entry(source.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                shadow.die();
                let existing = Arc::clone(existing.get());
                self.inner.name_server.register(existing.mesh_base().clone());
                return Ok(existing);
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => Arc::clone(slot.insert(shadow).value()),
        };
        info!(shadow = %source, coherence = %shadow.coherence(), "shadow created");

        if let Some(delay) = next {
            self.schedule(source.clone(), delay);
        }
        Ok(shadow)
    }

    fn schedule(&self, source: NetMeshBaseIdentifier, delay_ms: u64) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        debug!(shadow = %source, delay_ms = delay_ms, "scheduling shadow update");
        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let key = source.clone();
        let task = self.inner.runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            ProbeManager { inner }.run_scheduled(key).await;
        });
        if let Some(previous) = self.inner.tasks.insert(source, task) {
            previous.abort();
        }
    }

    async fn run_scheduled(&self, source: NetMeshBaseIdentifier) {
        // our own handle; dropping it detaches without aborting
        self.inner.tasks.remove(&source);
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        let Some(shadow) = self.get(&source) else {
            return;
        };
        let next = match shadow.do_update_now().await {
            Ok(next) => next,
            Err(ReplError::Shutdown) => return,
            Err(e) => {
                warn!(shadow = %source, error = %e, "shadow update failed");
                shadow.delay_until_next_update()
            }
        };
        match next {
            Some(delay) => self.schedule(source, delay),
            None => debug!(shadow = %source, "no further shadow updates"),
        }
    }

    /// Run the update of `source` now instead of waiting for its turn.
    pub async fn update_now(&self, source: &NetMeshBaseIdentifier) -> Result<Option<u64>> {
        let shadow = self.get(source).ok_or_else(|| ReplError::UnknownMeshBase {
            identifier: source.clone(),
        })?;
        if let Some((_, task)) = self.inner.tasks.remove(source) {
            task.abort();
        }
        let next = match shadow.do_update_now().await {
            Ok(next) => next,
            Err(ReplError::Shutdown) => return Err(ReplError::Shutdown),
            Err(e) => {
                warn!(shadow = %source, error = %e, "shadow update failed");
                if let Some(delay) = shadow.delay_until_next_update() {
                    self.schedule(source.clone(), delay);
                }
                return Err(e);
            }
        };
        if let Some(delay) = next {
            self.schedule(source.clone(), delay);
        }
        Ok(next)
    }

    /// Resume scheduling after `stop`, at each shadow's pending delay.
    pub fn start(&self) {
        self.inner.stopped.store(false, Ordering::SeqCst);
        let pending: Vec<(NetMeshBaseIdentifier, Option<u64>)> = self
            .inner
            .shadows
            .iter()
            .map(|s| (s.key().clone(), s.value().delay_until_next_update()))
            .collect();
        for (source, delay) in pending {
            if let Some(delay) = delay {
                self.schedule(source, delay);
            }
        }
    }

    /// Cancel every scheduled update. Shadows stay alive.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let sources: Vec<NetMeshBaseIdentifier> = self.inner.tasks.iter().map(|t| t.key().clone()).collect();
        for source in sources {
            if let Some((_, task)) = self.inner.tasks.remove(&source) {
                task.abort();
            }
        }
        debug!("probe manager stopped");
    }

    /// Stop updating `source` and kill its shadow.
    pub fn remove(&self, source: &NetMeshBaseIdentifier) -> Option<Arc<ShadowMeshBase>> {
        if let Some((_, task)) = self.inner.tasks.remove(source) {
            task.abort();
        }
        let (_, shadow) = self.inner.shadows.remove(source)?;
        shadow.die();
        Some(shadow)
    }

    /// Stop and kill every shadow.
    pub fn die(&self) {
        self.stop();
        let sources: Vec<NetMeshBaseIdentifier> = self.inner.shadows.iter().map(|s| s.key().clone()).collect();
        for source in sources {
            if let Some((_, shadow)) = self.inner.shadows.remove(&source) {
                shadow.die();
            }
        }
        info!("probe manager died");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::MeshTypeIdentifier;
    use crate::nameserver::MemoryNameServer;
    use crate::object::PropertyValue;
    use std::sync::atomic::AtomicU64;

    fn source() -> NetMeshBaseIdentifier {
        NetMeshBaseIdentifier::create("http://example.com/feed").unwrap()
    }

    fn item(source: &NetMeshBaseIdentifier) -> NetMeshObjectIdentifier {
        NetMeshObjectIdentifier::create(source.clone(), Some("item")).unwrap()
    }

    fn count_property() -> MeshTypeIdentifier {
        MeshTypeIdentifier::new("Feed/Count")
    }

    /// Writes a counter into one object. Changes it on the first `changing_runs` runs only.
    struct CountingProbe {
        runs: AtomicU64,
        changing_runs: u64,
    }

    impl CountingProbe {
        fn new(changing_runs: u64) -> Self {
            Self {
                runs: AtomicU64::new(0),
                changing_runs,
            }
        }
    }

    #[async_trait]
    impl Probe for CountingProbe {
        async fn read(&self, source: &NetMeshBaseIdentifier, tx: &mut Transaction) -> Result<()> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            let id = item(source);
            if tx.find(&id).is_none() {
                tx.create_mesh_object(Some(id.clone()), &[])?;
            }
            if run <= self.changing_runs {
                tx.set_property(&id, &count_property(), Some(PropertyValue::Integer(run as i64)))?;
            }
            Ok(())
        }
    }

    struct FailingProbe;

    #[async_trait]
    impl Probe for FailingProbe {
        async fn read(&self, source: &NetMeshBaseIdentifier, _tx: &mut Transaction) -> Result<()> {
            Err(ReplError::Probe {
                identifier: source.clone(),
                msg: "connection refused".to_string(),
            })
        }
    }

    /// Fails on run `fail_on` and succeeds otherwise.
    struct FlakyProbe {
        runs: AtomicU64,
        fail_on: u64,
    }

    #[async_trait]
    impl Probe for FlakyProbe {
        async fn read(&self, source: &NetMeshBaseIdentifier, tx: &mut Transaction) -> Result<()> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if run == self.fail_on {
                return Err(ReplError::Probe {
                    identifier: source.clone(),
                    msg: "timed out".to_string(),
                });
            }
            let id = item(source);
            if tx.find(&id).is_none() {
                tx.create_mesh_object(Some(id.clone()), &[])?;
            }
            tx.set_property(&id, &count_property(), Some(PropertyValue::Integer(run as i64)))?;
            Ok(())
        }
    }

    fn manager_with(probe: Arc<dyn Probe>, ns: Arc<MemoryNameServer>) -> ProbeManager {
        let directory = move |s: &NetMeshBaseIdentifier| {
            if *s == source() {
                Some(Arc::clone(&probe))
            } else {
                None
            }
        };
        ProbeManager::new(ProbeConfig::default(), Arc::new(directory), ns, Handle::current())
    }

    mod shadow {
        use super::*;

        fn shadow_with(probe: Arc<dyn Probe>, coherence: CoherenceSpecification) -> ShadowMeshBase {
            ShadowMeshBase::create(
                source(),
                probe,
                coherence,
                &ProbeConfig::default(),
                Arc::new(MemoryNameServer::new()),
                Handle::current(),
            )
        }

        #[tokio::test]
        async fn test_update_fills_shadow() {
            let shadow = shadow_with(Arc::new(CountingProbe::new(1)), CoherenceSpecification::OneTimeOnly);
            assert_eq!(shadow.do_update_now().await.unwrap(), None);
            assert_eq!(shadow.update_count(), 1);

            let obj = shadow.mesh_base().find_mesh_object_by_identifier(&item(&source())).await.unwrap();
            assert!(obj.is_home_replica());
            assert_eq!(obj.property(&count_property()), Some(&PropertyValue::Integer(1)));
            assert_eq!(shadow.mesh_base().policy().name(), "shadow");
        }

        #[tokio::test]
        async fn test_adaptive_delay_grows_while_unchanged() {
            let coherence = CoherenceSpecification::AdaptivePeriodic {
                fallback_delay_ms: 100,
                max_delay_ms: 300,
                adaptive_factor: 2.0,
            };
            let shadow = shadow_with(Arc::new(CountingProbe::new(1)), coherence);
            assert_eq!(shadow.do_update_now().await.unwrap(), Some(100));
            assert_eq!(shadow.do_update_now().await.unwrap(), Some(200));
            assert_eq!(shadow.do_update_now().await.unwrap(), Some(300));
            assert_eq!(shadow.delay_until_next_update(), Some(300));
        }

        #[tokio::test]
        async fn test_change_resets_adaptive_delay() {
            let coherence = CoherenceSpecification::AdaptivePeriodic {
                fallback_delay_ms: 100,
                max_delay_ms: 1000,
                adaptive_factor: 2.0,
            };
            // every run changes the counter
            let shadow = shadow_with(Arc::new(CountingProbe::new(u64::MAX)), coherence);
            assert_eq!(shadow.do_update_now().await.unwrap(), Some(100));
            assert_eq!(shadow.do_update_now().await.unwrap(), Some(100));
        }

        #[tokio::test]
        async fn test_failed_run_keeps_retry_delay() {
            let shadow = shadow_with(Arc::new(FailingProbe), CoherenceSpecification::Periodic { period_ms: 40 });
            let err = shadow.do_update_now().await.unwrap_err();
            assert!(matches!(err, ReplError::Probe { .. }));
            assert_eq!(shadow.update_count(), 0);
            assert_eq!(shadow.failure_count(), 1);
            assert_eq!(shadow.delay_until_next_update(), Some(40));
            assert!(shadow.last_update().is_some());
            assert!(shadow.last_successful_update().is_none());
            assert!(shadow.mesh_base().size().await == 0);
        }

        #[tokio::test]
        async fn test_dead_shadow_does_not_update() {
            let shadow = shadow_with(Arc::new(CountingProbe::new(1)), CoherenceSpecification::OneTimeOnly);
            shadow.die();
            assert!(matches!(shadow.do_update_now().await, Err(ReplError::Shutdown)));
        }
    }

    mod manager {
        use super::*;

        #[tokio::test]
        async fn test_obtain_runs_first_update() {
            let ns = Arc::new(MemoryNameServer::new());
            let manager = manager_with(Arc::new(CountingProbe::new(1)), ns.clone());
            let shadow = manager
                .obtain_for(&source(), Some(CoherenceSpecification::OneTimeOnly))
                .await
                .unwrap();
            assert_eq!(shadow.update_count(), 1);
            assert!(!manager.is_scheduled(&source()));
            assert!(ns.get(&source()).is_some());

            // second call returns the same shadow without reading again
            let again = manager.obtain_for(&source(), None).await.unwrap();
            assert!(Arc::ptr_eq(&shadow, &again));
            assert_eq!(again.update_count(), 1);
        }

        #[tokio::test]
        async fn test_unknown_source() {
            let manager = manager_with(Arc::new(CountingProbe::new(1)), Arc::new(MemoryNameServer::new()));
            let other = NetMeshBaseIdentifier::create("http://example.com/other").unwrap();
            let err = manager.obtain_for(&other, None).await.unwrap_err();
            assert!(matches!(err, ReplError::UnknownMeshBase { .. }));
            assert!(manager.is_empty());
        }

        #[tokio::test]
        async fn test_failed_first_run_keeps_nothing() {
            let ns = Arc::new(MemoryNameServer::new());
            let manager = manager_with(Arc::new(FailingProbe), ns.clone());
            assert!(manager.obtain_for(&source(), None).await.is_err());
            assert!(manager.get(&source()).is_none());
            assert!(ns.get(&source()).is_none());
        }

        #[tokio::test(start_paused = true)]
        async fn test_periodic_updates_are_rescheduled() {
            let manager = manager_with(Arc::new(CountingProbe::new(u64::MAX)), Arc::new(MemoryNameServer::new()));
            let shadow = manager
                .obtain_for(&source(), Some(CoherenceSpecification::Periodic { period_ms: 1000 }))
                .await
                .unwrap();
            assert!(manager.is_scheduled(&source()));

            tokio::time::sleep(Duration::from_millis(3500)).await;
            assert_eq!(shadow.update_count(), 4);
            assert!(manager.is_scheduled(&source()));
        }

        #[tokio::test(start_paused = true)]
        async fn test_stop_cancels_and_start_resumes() {
            let manager = manager_with(Arc::new(CountingProbe::new(u64::MAX)), Arc::new(MemoryNameServer::new()));
            let shadow = manager
                .obtain_for(&source(), Some(CoherenceSpecification::Periodic { period_ms: 1000 }))
                .await
                .unwrap();

            manager.stop();
            assert!(!manager.is_scheduled(&source()));
            tokio::time::sleep(Duration::from_millis(5000)).await;
            assert_eq!(shadow.update_count(), 1);

            manager.start();
            tokio::time::sleep(Duration::from_millis(1500)).await;
            assert_eq!(shadow.update_count(), 2);
        }

        #[tokio::test(start_paused = true)]
        async fn test_update_now_reschedules() {
            let manager = manager_with(Arc::new(CountingProbe::new(u64::MAX)), Arc::new(MemoryNameServer::new()));
            let shadow = manager
                .obtain_for(&source(), Some(CoherenceSpecification::Periodic { period_ms: 1000 }))
                .await
                .unwrap();

            tokio::time::sleep(Duration::from_millis(600)).await;
            assert_eq!(manager.update_now(&source()).await.unwrap(), Some(1000));
            assert_eq!(shadow.update_count(), 2);

            // the old timer at 1000ms was replaced by one at 1600ms
            tokio::time::sleep(Duration::from_millis(700)).await;
            assert_eq!(shadow.update_count(), 2);
            tokio::time::sleep(Duration::from_millis(400)).await;
            assert_eq!(shadow.update_count(), 3);
        }

        #[tokio::test(start_paused = true)]
        async fn test_failed_update_now_keeps_schedule() {
            let probe = Arc::new(FlakyProbe {
                runs: AtomicU64::new(0),
                fail_on: 2,
            });
            let manager = manager_with(probe, Arc::new(MemoryNameServer::new()));
            let shadow = manager
                .obtain_for(&source(), Some(CoherenceSpecification::Periodic { period_ms: 1000 }))
                .await
                .unwrap();

            tokio::time::sleep(Duration::from_millis(600)).await;
            let err = manager.update_now(&source()).await.unwrap_err();
            assert!(matches!(err, ReplError::Probe { .. }));
            assert_eq!(shadow.failure_count(), 1);
            assert!(manager.is_scheduled(&source()));

            // the retry runs 1000ms after the failed run and periodic updates carry on
            tokio::time::sleep(Duration::from_millis(1100)).await;
            assert_eq!(shadow.update_count(), 2);
            tokio::time::sleep(Duration::from_millis(1000)).await;
            assert_eq!(shadow.update_count(), 3);
            assert!(manager.is_scheduled(&source()));
        }

        #[tokio::test]
        async fn test_die_kills_shadows() {
            let ns = Arc::new(MemoryNameServer::new());
            let manager = manager_with(Arc::new(CountingProbe::new(1)), ns.clone());
            let shadow = manager
                .obtain_for(&source(), Some(CoherenceSpecification::Periodic { period_ms: 1000 }))
                .await
                .unwrap();

            manager.die();
            assert!(manager.is_empty());
            assert!(!manager.is_scheduled(&source()));
            assert!(shadow.mesh_base().is_dead());
            assert!(ns.get(&source()).is_none());
        }

        #[tokio::test]
        async fn test_remove_one_shadow() {
            let manager = manager_with(Arc::new(CountingProbe::new(1)), Arc::new(MemoryNameServer::new()));
            manager.obtain_for(&source(), None).await.unwrap();
            let removed = manager.remove(&source()).unwrap();
            assert!(removed.mesh_base().is_dead());
            assert!(manager.get(&source()).is_none());
            assert!(manager.remove(&source()).is_none());
        }
    }
}
