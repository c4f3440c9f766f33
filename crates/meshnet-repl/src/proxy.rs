//! Proxy: the replication relationship between one local MeshBase and one partner.
//!
//! A proxy owns the ping-pong endpoint towards its partner and consumes the
//! endpoint's events on one task, so messages from a partner are processed
//! strictly one after the other. Every decision is delegated to the
//! MeshBase's `ProxyPolicy`; the proxy only performs the resulting
//! `ProxyProcessingInstructions`.

use meshnet_pingpong::{EndpointEvent, EndpointSnapshot, PingPongMessageEndpoint};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::access::{CoherenceSpecification, NetMeshObjectAccessSpecification};
use crate::change::NetChange;
use crate::error::{ReplError, Result};
use crate::externalized::ExternalizedProxy;
use crate::identifier::{NetMeshBaseIdentifier, NetMeshObjectIdentifier};
use crate::instructions::{ForwardRequest, ProxyProcessingInstructions, WaitKind, WaitingSend};
use crate::meshbase::{MeshBaseState, NetMeshBase, WeakNetMeshBase};
use crate::object::current_time_ms;
use crate::policy::{potentially_convey, InitiatingProxyPolicy, ProxyIdentity, ProxyPolicy, ReplicaView};
use crate::transport::NetMessageTransport;
use crate::xpriso::XprisoMessage;

/// Future returned by `Proxy::perform_instructions`.
pub type PerformFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

#[derive(Debug, Clone, Copy)]
struct ProxyTimes {
    created: u64,
    updated: u64,
    read: u64,
    expires: Option<u64>,
}

struct ProxyInner {
    base: WeakNetMeshBase,
    identity: ProxyIdentity,
    policy: Arc<dyn ProxyPolicy>,
    coherence: Option<CoherenceSpecification>,
    endpoint: PingPongMessageEndpoint<XprisoMessage>,
    waits: StdMutex<HashMap<u64, (WaitKind, oneshot::Sender<()>)>>,
    next_request_id: AtomicU64,
    times: StdMutex<ProxyTimes>,
    dead: AtomicBool,
}

/// The local end of a replication relationship. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("here", self.here())
            .field("partner", self.partner())
            .field("policy", &self.inner.policy.name())
            .field("dead", &self.is_dead())
            .finish()
    }
}

impl Proxy {
    /// Create a fresh proxy from `base` towards `partner`.
    pub(crate) fn create(
        base: &NetMeshBase,
        partner: NetMeshBaseIdentifier,
        coherence: Option<CoherenceSpecification>,
    ) -> Proxy {
        let now = current_time_ms();
        let times = ProxyTimes {
            created: now,
            updated: now,
            read: now,
            expires: None,
        };
        Self::build(base, partner, coherence, times, EndpointSnapshot::default())
    }

    /// Re-create a proxy that resumes exactly where `externalized` left off.
    pub(crate) fn restore(base: &NetMeshBase, externalized: ExternalizedProxy) -> Proxy {
        let times = ProxyTimes {
            created: externalized.time_created,
            updated: externalized.time_updated,
            read: externalized.time_read,
            expires: externalized.time_expires,
        };
        let snapshot = EndpointSnapshot {
            last_sent_token: externalized.last_sent_token,
            last_received_token: externalized.last_received_token,
            messages_to_be_sent: externalized.messages_to_be_sent,
            messages_sent_last: externalized.messages_last_sent,
        };
        Self::build(base, externalized.there, externalized.coherence, times, snapshot)
    }

    fn build(
        base: &NetMeshBase,
        partner: NetMeshBaseIdentifier,
        coherence: Option<CoherenceSpecification>,
        times: ProxyTimes,
        snapshot: EndpointSnapshot<XprisoMessage>,
    ) -> Proxy {
        let here = base.identifier().clone();
        let transport = Arc::new(NetMessageTransport::new(
            Arc::clone(base.name_server()),
            here.clone(),
            partner.clone(),
        ));
        let (endpoint, events) = PingPongMessageEndpoint::restore(
            format!("{here}>{partner}"),
            base.config().pingpong.clone(),
            transport,
            base.runtime().clone(),
            snapshot,
        );
        let proxy = Proxy {
            inner: Arc::new(ProxyInner {
                base: base.downgrade(),
                identity: ProxyIdentity::new(here, partner),
                policy: Arc::clone(base.policy()),
                coherence,
                endpoint,
                waits: StdMutex::new(HashMap::new()),
                next_request_id: AtomicU64::new(1),
                times: StdMutex::new(times),
                dead: AtomicBool::new(false),
            }),
        };
        base.runtime()
            .spawn(run_event_loop(Arc::downgrade(&proxy.inner), events));
        proxy
    }

    /// Our MeshBase.
    pub fn here(&self) -> &NetMeshBaseIdentifier {
        &self.inner.identity.here
    }

    /// The partner MeshBase.
    pub fn partner(&self) -> &NetMeshBaseIdentifier {
        &self.inner.identity.there
    }

    /// Both ends, as seen by the policy.
    pub fn identity(&self) -> ProxyIdentity {
        self.inner.identity.clone()
    }

    /// The policy this proxy follows.
    pub fn policy(&self) -> &Arc<dyn ProxyPolicy> {
        &self.inner.policy
    }

    /// Coherence the proxy was created with.
    pub fn coherence(&self) -> Option<&CoherenceSpecification> {
        self.inner.coherence.as_ref()
    }

    /// The endpoint towards the partner.
    pub fn endpoint(&self) -> &PingPongMessageEndpoint<XprisoMessage> {
        &self.inner.endpoint
    }

    /// Returns true once `die` has been called.
    pub fn is_dead(&self) -> bool {
        self.inner.dead.load(Ordering::SeqCst)
    }

    /// When the proxy was created (ms since epoch).
    pub fn time_created(&self) -> u64 {
        self.times().created
    }

    /// When the proxy last sent something (ms since epoch).
    pub fn time_updated(&self) -> u64 {
        self.times().updated
    }

    /// When the proxy last received something (ms since epoch).
    pub fn time_read(&self) -> u64 {
        self.times().read
    }

    /// When the proxy expires, if ever.
    pub fn time_expires(&self) -> Option<u64> {
        self.times().expires
    }

    /// Set or clear the expiry time.
    pub fn set_time_expires(&self, expires: Option<u64>) {
        self.times().expires = expires;
    }

    fn times(&self) -> MutexGuard<'_, ProxyTimes> {
        self.inner
            .times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn waits(&self) -> MutexGuard<'_, HashMap<u64, (WaitKind, oneshot::Sender<()>)>> {
        self.inner
            .waits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn base(&self) -> Result<NetMeshBase> {
        self.inner.base.upgrade().ok_or(ReplError::Shutdown)
    }

    fn initiating(&self) -> Result<&dyn InitiatingProxyPolicy> {
        self.inner
            .policy
            .as_initiating()
            .ok_or_else(|| ReplError::InitiationUnsupported {
                partner: self.partner().clone(),
            })
    }

    fn check_alive(&self) -> Result<()> {
        if self.is_dead() {
            return Err(ReplError::Shutdown);
        }
        Ok(())
    }

    /// Ask the partner for replicas and wait for them.
    pub async fn obtain_replicas(&self, specs: Vec<NetMeshObjectAccessSpecification>, timeout_ms: u64) -> Result<()> {
        self.check_alive()?;
        let instructions = self
            .initiating()?
            .calculate_for_obtain_replicas(&specs, Some(timeout_ms), &self.inner.identity);
        self.perform_instructions(instructions).await
    }

    /// Ask the partner for the locks of these replicas and wait for them.
    pub async fn try_to_obtain_locks(&self, identifiers: &[NetMeshObjectIdentifier], timeout_ms: u64) -> Result<()> {
        self.check_alive()?;
        let instructions = self
            .initiating()?
            .calculate_for_try_to_obtain_locks(identifiers, Some(timeout_ms), &self.inner.identity);
        self.perform_instructions(instructions).await
    }

    /// Hand the locks held here to the partner and wait for it to confirm.
    pub async fn try_to_push_locks(&self, identifiers: &[NetMeshObjectIdentifier], timeout_ms: u64) -> Result<()> {
        self.check_alive()?;
        let initiating = self.initiating()?;
        let base = self.base()?;
        let instructions = {
            let state = base.lock_state().await;
            initiating.calculate_for_try_to_push_locks(identifiers, Some(timeout_ms), &self.inner.identity, &*state)
        };
        self.perform_instructions(instructions).await
    }

    /// Ask the partner for home replica status of these replicas and wait for it.
    pub async fn try_to_obtain_home_replicas(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        timeout_ms: u64,
    ) -> Result<()> {
        self.check_alive()?;
        let instructions = self
            .initiating()?
            .calculate_for_try_to_obtain_home_replicas(identifiers, Some(timeout_ms), &self.inner.identity);
        self.perform_instructions(instructions).await
    }

    /// Hand home replica status held here to the partner and wait for it to confirm.
    pub async fn try_to_push_home_replicas(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        timeout_ms: u64,
    ) -> Result<()> {
        self.check_alive()?;
        let initiating = self.initiating()?;
        let base = self.base()?;
        let instructions = {
            let state = base.lock_state().await;
            initiating.calculate_for_try_to_push_home_replicas(
                identifiers,
                Some(timeout_ms),
                &self.inner.identity,
                &*state,
            )
        };
        self.perform_instructions(instructions).await
    }

    /// Tell the partner that these locks were taken back.
    pub async fn force_obtain_locks(&self, identifiers: &[NetMeshObjectIdentifier]) -> Result<()> {
        self.check_alive()?;
        let instructions = self
            .inner
            .policy
            .calculate_for_force_obtain_locks(identifiers, &self.inner.identity);
        self.perform_instructions(instructions).await
    }

    /// Ask the partner for fresh snapshots of these replicas.
    pub async fn try_resynchronize_replicas(&self, identifiers: &[NetMeshObjectIdentifier]) -> Result<()> {
        self.check_alive()?;
        let instructions = self
            .inner
            .policy
            .calculate_for_try_resynchronize_replicas(identifiers, &self.inner.identity);
        self.perform_instructions(instructions).await
    }

    /// Tell the partner we no longer want updates for these replicas.
    pub async fn cancel_replicas(&self, identifiers: &[NetMeshObjectIdentifier]) -> Result<()> {
        self.check_alive()?;
        let instructions = self
            .inner
            .policy
            .calculate_for_cancel_replicas(identifiers, &self.inner.identity);
        self.perform_instructions(instructions).await
    }

    /// End the relationship. The proxy is removed once the partner has been told.
    pub async fn initiate_cease_communications(&self) -> Result<()> {
        self.check_alive()?;
        info!(mesh_base = %self.here(), partner = %self.partner(), "ceasing communications");
        let instructions = self
            .inner
            .policy
            .calculate_for_cease_communications(&self.inner.identity);
        self.perform_instructions(instructions).await
    }

    /// What the partner needs to hear about a committed transaction, if anything.
    pub(crate) fn transaction_committed(
        &self,
        changes: &[NetChange],
        state: &MeshBaseState,
    ) -> Option<ProxyProcessingInstructions> {
        if self.is_dead() {
            return None;
        }
        self.inner
            .policy
            .calculate_for_transaction_committed(changes, &self.inner.identity, state)
    }

    async fn message_received(&self, incoming: XprisoMessage) {
        let Ok(base) = self.base() else {
            return;
        };
        self.times().read = current_time_ms();
        let is_response = incoming
            .response_id
            .map(|id| self.waits().contains_key(&id))
            .unwrap_or(false);
        let instructions = {
            let state = base.lock_state().await;
            self.inner
                .policy
                .calculate_for_incoming_message(&incoming, is_response, &self.inner.identity, &*state)
        };
        if let Err(e) = self.perform_instructions(instructions).await {
            warn!(mesh_base = %self.here(), partner = %self.partner(), error = %e, "processing incoming message failed");
        }
    }

    /// Carry out what the policy decided.
    ///
    /// Local replica changes happen in one transaction that is committed
    /// before anything is sent, so deltas onward to third MeshBases leave in
    /// the order they were applied here. Waiters for the message being
    /// answered are released last.
    pub fn perform_instructions(&self, mut instructions: ProxyProcessingInstructions) -> PerformFuture {
        let proxy = self.clone();
        Box::pin(async move {
            let base = proxy.base()?;
            let partner = proxy.partner().clone();
            debug!(
                mesh_base = %proxy.here(),
                partner = %partner,
                creates = instructions.ripple_creates.len(),
                deltas = instructions.deltas.len(),
                forwards = instructions.forwards.len(),
                "performing instructions"
            );

            proxy.perform_locally(&base, &instructions).await?;

            for third in std::mem::take(&mut instructions.resynchronize_instructions) {
                match base.obtain_proxy_for(&third.partner, None) {
                    Ok(other) => {
                        if let Err(e) = other.try_resynchronize_replicas(&third.identifiers).await {
                            warn!(mesh_base = %proxy.here(), partner = %third.partner, error = %e, "resynchronize request failed");
                        }
                    }
                    Err(e) => warn!(mesh_base = %proxy.here(), partner = %third.partner, error = %e, "no proxy for resynchronize"),
                }
            }
            for third in std::mem::take(&mut instructions.cancel_instructions) {
                match base.obtain_proxy_for(&third.partner, None) {
                    Ok(other) => {
                        if let Err(e) = other.cancel_replicas(&third.identifiers).await {
                            warn!(mesh_base = %proxy.here(), partner = %third.partner, error = %e, "cancel request failed");
                        }
                    }
                    Err(e) => warn!(mesh_base = %proxy.here(), partner = %third.partner, error = %e, "no proxy for cancel"),
                }
            }

            let forwards = std::mem::take(&mut instructions.forwards);
            if !forwards.is_empty() {
                let mut outgoing = instructions.send.take().unwrap_or_else(|| {
                    let mut outgoing = proxy.inner.identity.outgoing_message();
                    outgoing.response_id = instructions.incoming.as_ref().and_then(|m| m.request_id);
                    outgoing
                });
                for forward in forwards {
                    proxy.perform_forward(&base, forward, &mut outgoing).await;
                }
                instructions.set_send_if_needed(outgoing);
            }

            let mut result = Ok(());
            if let Some(outgoing) = instructions.send.take() {
                proxy.times().updated = current_time_ms();
                result = proxy.inner.endpoint.enqueue_message_for_send(outgoing).await.map_err(ReplError::from);
            }
            if result.is_ok() {
                if let Some(waiting) = instructions.send_and_wait.take() {
                    result = proxy.send_and_wait(waiting).await;
                }
            }
            if instructions.start_communicating {
                proxy.inner.endpoint.start_communicating().await;
            }

            if let Some(response_id) = instructions.incoming.as_ref().and_then(|m| m.response_id) {
                proxy.release_waiter(response_id);
            }

            if instructions.cease_communications && instructions.incoming.is_some() {
                info!(mesh_base = %proxy.here(), partner = %partner, "partner ceased communications");
                let base = base.clone();
                base.runtime()
                    .clone()
                    .spawn(async move { base.remove_proxy(&partner).await });
            }
            result
        })
    }

    async fn perform_locally(&self, base: &NetMeshBase, instructions: &ProxyProcessingInstructions) -> Result<()> {
        let has_local_work = !(instructions.register_replications.is_empty()
            && instructions.ripple_creates.is_empty()
            && instructions.ripple_resynchronizes.is_empty()
            && instructions.deltas.is_empty()
            && instructions.pushed_locks.is_empty()
            && instructions.pushed_homes.is_empty()
            && instructions.surrender_locks.is_empty()
            && instructions.surrender_homes.is_empty()
            && instructions.cancels.is_empty());
        if !has_local_work {
            return Ok(());
        }
        let partner = self.partner();
        let mut tx = base.create_transaction_for(partner).await;

        for identifier in &instructions.register_replications {
            self.check_ripple(identifier, "register replication", tx.register_replication(identifier, partner));
        }
        for ripple in &instructions.ripple_creates {
            self.check_ripple(ripple.identifier(), "ripple create", tx.ripple_create(ripple));
        }
        for ripple in &instructions.ripple_resynchronizes {
            self.check_ripple(ripple.identifier(), "ripple resynchronize", tx.ripple_resynchronize(ripple));
        }
        for delta in &instructions.deltas {
            self.check_ripple(&delta.source, "apply delta", tx.apply_delta(delta));
        }
        for identifier in &instructions.pushed_locks {
            self.check_ripple(identifier, "push lock", tx.push_lock(identifier, partner));
        }
        for identifier in &instructions.pushed_homes {
            self.check_ripple(identifier, "push home replica", tx.push_home_replica(identifier, partner));
        }
        for identifier in &instructions.surrender_locks {
            self.check_ripple(identifier, "surrender lock", tx.surrender_lock(identifier, partner));
        }
        for identifier in &instructions.surrender_homes {
            self.check_ripple(identifier, "surrender home replica", tx.surrender_home_replica(identifier, partner));
        }
        for identifier in &instructions.cancels {
            self.check_ripple(identifier, "cancel replica", tx.unregister_replication(identifier, partner));
        }
        tx.commit().await
    }

    fn check_ripple(
        &self,
        identifier: &NetMeshObjectIdentifier,
        what: &'static str,
        result: std::result::Result<(), crate::error::ChangeError>,
    ) {
        if let Err(e) = result {
            error!(
                mesh_base = %self.here(),
                partner = %self.partner(),
                object = %identifier,
                operation = what,
                error = %e,
                "replica consistency violation"
            );
        }
    }

    /// Obtain from a third MeshBase what the partner asked for, then pass it on in `outgoing`.
    async fn perform_forward(&self, base: &NetMeshBase, forward: ForwardRequest, outgoing: &mut XprisoMessage) {
        let timeout_ms = self.inner.policy.calculate_timeout_ms(None);
        let via = forward.via().clone();
        let obtained = match base.obtain_proxy_for(&via, None) {
            Ok(other) => match &forward {
                ForwardRequest::Replicas { specs, .. } => other.obtain_replicas(specs.clone(), timeout_ms).await,
                ForwardRequest::Locks { identifiers, .. } => other.try_to_obtain_locks(identifiers, timeout_ms).await,
                ForwardRequest::Homes { identifiers, .. } => {
                    other.try_to_obtain_home_replicas(identifiers, timeout_ms).await
                }
            },
            Err(e) => Err(e),
        };
        if let Err(e) = obtained {
            warn!(mesh_base = %self.here(), partner = %self.partner(), via = %via, error = %e, "forwarded request failed");
        }

        let partner = self.partner();
        let mut tx = base.create_transaction_for(partner).await;
        match forward {
            ForwardRequest::Replicas { specs, .. } => {
                let mut register = Vec::new();
                for spec in &specs {
                    let view = tx.view();
                    let found = view.find(spec.object()).or_else(|| view.find_equivalent(spec.object()));
                    if let Some(obj) = found {
                        if potentially_convey(obj, outgoing, &self.inner.identity, self.inner.policy.points_replicas_to_itself()) {
                            register.push(obj.identifier().clone());
                        }
                    }
                }
                for identifier in register {
                    self.check_ripple(&identifier, "register replication", tx.register_replication(&identifier, partner));
                }
            }
            ForwardRequest::Locks { identifiers, .. } => {
                for identifier in identifiers {
                    if !tx.find(&identifier).map(|obj| obj.has_lock()).unwrap_or(false) {
                        continue;
                    }
                    if tx.surrender_lock(&identifier, partner).is_ok() {
                        outgoing.add_push_lock_object(identifier);
                    }
                }
            }
            ForwardRequest::Homes { identifiers, .. } => {
                for identifier in identifiers {
                    if !tx.find(&identifier).map(|obj| obj.is_home_replica()).unwrap_or(false) {
                        continue;
                    }
                    if tx.surrender_home_replica(&identifier, partner).is_ok() {
                        outgoing.add_push_home_replica(identifier);
                    }
                }
            }
        }
        if let Err(e) = tx.commit().await {
            warn!(mesh_base = %self.here(), partner = %partner, error = %e, "commit after forwarded request failed");
        }
    }

    async fn send_and_wait(&self, waiting: WaitingSend) -> Result<()> {
        let WaitingSend {
            mut message,
            kind,
            timeout_ms,
        } = waiting;
        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::SeqCst);
        message.request_id = Some(request_id);
        let (tx, rx) = oneshot::channel();
        self.waits().insert(request_id, (kind, tx));

        self.times().updated = current_time_ms();
        if let Err(e) = self.inner.endpoint.enqueue_message_for_send(message).await {
            self.waits().remove(&request_id);
            return Err(e.into());
        }
        self.inner.endpoint.start_communicating().await;

        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ReplError::Shutdown),
            Err(_) => {
                self.waits().remove(&request_id);
                debug!(mesh_base = %self.here(), partner = %self.partner(), request_id = request_id, kind = ?kind, "request timed out");
                Err(ReplError::RemoteQueryTimeout {
                    partner: self.partner().clone(),
                    timeout_ms,
                })
            }
        }
    }

    fn release_waiter(&self, response_id: u64) {
        let waiter = self.waits().remove(&response_id);
        if let Some((kind, sender)) = waiter {
            debug!(mesh_base = %self.here(), partner = %self.partner(), request_id = response_id, kind = ?kind, "response arrived");
            let _ = sender.send(());
        }
    }

    /// Stop the proxy. A permanent death also tells the endpoint to refuse any further tokens.
    ///
    /// Callers still waiting for a response get `ReplError::Shutdown`.
    pub fn die(&self, is_permanent: bool) {
        if self.inner.dead.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(mesh_base = %self.here(), partner = %self.partner(), permanent = is_permanent, "proxy dying");
        if is_permanent {
            self.inner.endpoint.graceful_die();
        } else {
            self.inner.endpoint.stop_communicating();
        }
        self.waits().clear();
    }

    /// Persistent form of this proxy, including messages not yet confirmed by the partner.
    pub async fn as_externalized(&self) -> ExternalizedProxy {
        let snapshot = self.inner.endpoint.snapshot().await;
        let times = *self.times();
        ExternalizedProxy {
            time_created: times.created,
            time_updated: times.updated,
            time_read: times.read,
            time_expires: times.expires,
            here: self.here().clone(),
            there: self.partner().clone(),
            coherence: self.inner.coherence.clone(),
            last_sent_token: snapshot.last_sent_token,
            last_received_token: snapshot.last_received_token,
            messages_to_be_sent: snapshot.messages_to_be_sent,
            messages_last_sent: snapshot.messages_sent_last,
        }
    }
}

async fn run_event_loop(inner: Weak<ProxyInner>, mut events: mpsc::UnboundedReceiver<EndpointEvent<XprisoMessage>>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let proxy = Proxy { inner };
        if proxy.is_dead() {
            break;
        }
        match event {
            EndpointEvent::MessageReceived(msg) => proxy.message_received(msg).await,
            EndpointEvent::MessageSent(msg) if msg.cease_communications => {
                info!(mesh_base = %proxy.here(), partner = %proxy.partner(), "cease sent, removing proxy");
                if let Ok(base) = proxy.base() {
                    let partner = proxy.partner().clone();
                    base.runtime()
                        .clone()
                        .spawn(async move { base.remove_proxy(&partner).await });
                }
            }
            EndpointEvent::MessageSendingFailed(batch) => {
                debug!(mesh_base = %proxy.here(), partner = %proxy.partner(), messages = batch.len(), "send failed, will retry");
            }
            EndpointEvent::Disabled { messages, reason } => {
                warn!(
                    mesh_base = %proxy.here(),
                    partner = %proxy.partner(),
                    messages = messages.len(),
                    reason = %reason,
                    "endpoint disabled"
                );
            }
            _ => {}
        }
    }
}
