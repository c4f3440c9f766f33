//! Ping-pong message endpoint.
//!
//! Two endpoints pass a single, monotonically increasing token back and forth.
//! Whoever holds the token attaches every queued message to the next token it
//! sends. Three timers drive the exchange:
//!
//! - `respond`: after a token arrives, wait this long before sending the next one.
//! - `resend`: after a transport failure, wait this long before trying again.
//! - `recover`: after sending, wait this long for the partner before resending.
//!
//! Duplicates are detected by token, so a resent batch is never delivered to
//! the owner twice.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PingPongConfig;
use crate::error::{EndpointError, Result};
use crate::event::EndpointEvent;
use crate::transport::MessageTransport;

/// Persistent state of an endpoint, sufficient to resume after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSnapshot<T> {
    /// Token most recently sent, if any.
    pub last_sent_token: Option<u64>,
    /// Token most recently received, if any.
    pub last_received_token: Option<u64>,
    /// Messages queued for the next new token.
    pub messages_to_be_sent: Vec<T>,
    /// Exactly the batch carried by `last_sent_token`.
    pub messages_sent_last: Vec<T>,
}

impl<T> Default for EndpointSnapshot<T> {
    fn default() -> Self {
        Self {
            last_sent_token: None,
            last_received_token: None,
            messages_to_be_sent: Vec::new(),
            messages_sent_last: Vec::new(),
        }
    }
}

/// Which batch goes out with the chosen token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Payload {
    /// Drain the queue.
    Queued,
    /// Repeat the previous batch exactly.
    LastSent,
}

/// Why a token was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChoiceKind {
    First,
    Respond,
    Resend,
    Collision,
    OutOfSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TokenChoice {
    pub token: u64,
    pub payload: Payload,
    pub kind: ChoiceKind,
}

/// Decide which token to send next.
///
/// A new token is `last_received + 1`; a resend repeats `last_sent`. When both
/// sides sent the same token before hearing from each other, the collision
/// winner moves on with a fresh token carrying only newly queued messages and
/// the loser repeats its own token, which the winner drops as a duplicate. A
/// batch already sent is never put under a different token, since the partner
/// only recognizes repeats of the same token.
pub(crate) fn choose_token(
    last_sent: Option<u64>,
    last_received: Option<u64>,
    wins_collision: bool,
) -> TokenChoice {
    let choice = |token, payload, kind| TokenChoice {
        token,
        payload,
        kind,
    };
    match (last_sent, last_received) {
        (None, None) => choice(1, Payload::Queued, ChoiceKind::First),
        (Some(sent), None) => choice(sent, Payload::LastSent, ChoiceKind::Resend),
        (None, Some(received)) => choice(received + 1, Payload::Queued, ChoiceKind::Respond),
        (Some(sent), Some(received)) if received == sent + 1 => {
            choice(received + 1, Payload::Queued, ChoiceKind::Respond)
        }
        (Some(sent), Some(received)) if received + 1 == sent => {
            choice(sent, Payload::LastSent, ChoiceKind::Resend)
        }
        (Some(sent), Some(received)) if received == sent => {
            if wins_collision {
                choice(sent + 1, Payload::Queued, ChoiceKind::Collision)
            } else {
                choice(sent, Payload::LastSent, ChoiceKind::Collision)
            }
        }
        (Some(sent), Some(received)) => {
            choice(sent.max(received) + 1, Payload::Queued, ChoiceKind::OutOfSync)
        }
    }
}

struct TokenState<T> {
    last_sent: Option<u64>,
    last_received: Option<u64>,
    messages_to_be_sent: Vec<T>,
    messages_sent_last: Vec<T>,
}

struct Inner<T: Send + 'static> {
    name: String,
    config: PingPongConfig,
    state: Mutex<TokenState<T>>,
    timer: StdMutex<Option<JoinHandle<()>>>,
    transport: Arc<dyn MessageTransport<T>>,
    events: mpsc::UnboundedSender<EndpointEvent<T>>,
    dead: AtomicBool,
    runtime: Handle,
}

/// One end of a ping-pong channel. Cheap to clone; clones share state.
pub struct PingPongMessageEndpoint<T: Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> Clone for PingPongMessageEndpoint<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for PingPongMessageEndpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PingPongMessageEndpoint")
            .field("name", &self.inner.name)
            .field("dead", &self.inner.dead.load(Ordering::SeqCst))
            .finish()
    }
}

/// Non-owning handle to an endpoint, used by transports to reach their partner.
pub struct WeakEndpoint<T: Send + 'static> {
    inner: Weak<Inner<T>>,
}

impl<T: Send + 'static> Clone for WeakEndpoint<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> WeakEndpoint<T> {
    /// Obtain the endpoint if it still exists.
    pub fn upgrade(&self) -> Option<PingPongMessageEndpoint<T>> {
        self.inner
            .upgrade()
            .map(|inner| PingPongMessageEndpoint { inner })
    }
}

impl<T> PingPongMessageEndpoint<T>
where
    T: Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Create a fresh endpoint. Timers run on `runtime`; events go to the returned receiver.
    pub fn create(
        name: impl Into<String>,
        config: PingPongConfig,
        transport: Arc<dyn MessageTransport<T>>,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<EndpointEvent<T>>) {
        Self::restore(name, config, transport, runtime, EndpointSnapshot::default())
    }

    /// Re-create an endpoint that resumes exactly from `snapshot`.
    pub fn restore(
        name: impl Into<String>,
        config: PingPongConfig,
        transport: Arc<dyn MessageTransport<T>>,
        runtime: Handle,
        snapshot: EndpointSnapshot<T>,
    ) -> (Self, mpsc::UnboundedReceiver<EndpointEvent<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                state: Mutex::new(TokenState {
                    last_sent: snapshot.last_sent_token,
                    last_received: snapshot.last_received_token,
                    messages_to_be_sent: snapshot.messages_to_be_sent,
                    messages_sent_last: snapshot.messages_sent_last,
                }),
                timer: StdMutex::new(None),
                transport,
                events: tx,
                dead: AtomicBool::new(false),
                runtime,
            }),
        };
        (endpoint, rx)
    }

    /// Name of this endpoint, used in log output.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Timer configuration of this endpoint.
    pub fn config(&self) -> &PingPongConfig {
        &self.inner.config
    }

    /// Obtain a non-owning handle.
    pub fn downgrade(&self) -> WeakEndpoint<T> {
        WeakEndpoint {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns true once `graceful_die` has been called.
    pub fn is_dead(&self) -> bool {
        self.inner.dead.load(Ordering::SeqCst)
    }

    /// Queue a message; it goes out with the next new token.
    pub async fn enqueue_message_for_send(&self, msg: T) -> Result<()> {
        if self.is_dead() {
            return Err(EndpointError::Dead);
        }
        debug!(endpoint = %self.inner.name, message = ?msg, "enqueue message for send");
        self.inner
            .state
            .lock()
            .await
            .messages_to_be_sent
            .push(msg.clone());
        self.emit(EndpointEvent::MessageEnqueued(msg));
        Ok(())
    }

    /// Send a token now unless a timer is already pending.
    pub async fn start_communicating(&self) {
        if self.is_dead() || self.has_pending_timer() {
            return;
        }
        self.do_action("first").await;
    }

    /// Cancel the pending timer, if any. Safe to call repeatedly.
    pub fn stop_communicating(&self) {
        self.cancel_timer();
    }

    /// Shut the endpoint down permanently.
    pub fn graceful_die(&self) {
        if !self.inner.dead.swap(true, Ordering::SeqCst) {
            info!(endpoint = %self.inner.name, "endpoint dying");
        }
        self.cancel_timer();
    }

    /// Returns true if a respond, resend or recover timer is still waiting to fire.
    pub fn has_pending_timer(&self) -> bool {
        self.timer_slot()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Deliver a token from the partner.
    ///
    /// A token equal to the last one received is a duplicate: its content is
    /// dropped, but a response is still scheduled so a lost reply gets resent.
    pub async fn incoming_message(&self, token: u64, content: Vec<T>) -> Result<()> {
        if self.is_dead() {
            return Err(EndpointError::Dead);
        }
        {
            let mut state = self.inner.state.lock().await;
            if state.last_received == Some(token) {
                warn!(
                    endpoint = %self.inner.name,
                    token = token,
                    messages = content.len(),
                    "ignoring duplicate incoming token"
                );
            } else {
                if content.is_empty() {
                    debug!(endpoint = %self.inner.name, token = token, "incoming token");
                } else {
                    info!(endpoint = %self.inner.name, token = token, messages = content.len(), "incoming token");
                }
                self.cancel_timer();
                state.last_received = Some(token);
                self.emit(EndpointEvent::TokenReceived(token));
                for msg in content {
                    self.emit(EndpointEvent::MessageReceived(msg));
                }
            }
        }
        self.schedule("respond", self.inner.config.delta_respond_ms);
        Ok(())
    }

    /// Capture the persistent state of this endpoint.
    pub async fn snapshot(&self) -> EndpointSnapshot<T> {
        let state = self.inner.state.lock().await;
        EndpointSnapshot {
            last_sent_token: state.last_sent,
            last_received_token: state.last_received,
            messages_to_be_sent: state.messages_to_be_sent.clone(),
            messages_sent_last: state.messages_sent_last.clone(),
        }
    }

    /// Messages waiting for the next new token.
    pub async fn messages_to_be_sent(&self) -> Vec<T> {
        self.inner.state.lock().await.messages_to_be_sent.clone()
    }

    /// The batch carried by the last token sent.
    pub async fn messages_sent_last(&self) -> Vec<T> {
        self.inner.state.lock().await.messages_sent_last.clone()
    }

    /// Token most recently sent.
    pub async fn last_sent_token(&self) -> Option<u64> {
        self.inner.state.lock().await.last_sent
    }

    /// Token most recently received.
    pub async fn last_received_token(&self) -> Option<u64> {
        self.inner.state.lock().await.last_received
    }

    async fn do_action(&self, tag: &'static str) {
        if self.is_dead() {
            return;
        }
        let (token, batch) = {
            let mut state = self.inner.state.lock().await;
            let choice = choose_token(
                state.last_sent,
                state.last_received,
                self.inner.transport.wins_collision(),
            );
            match choice.kind {
                ChoiceKind::Collision => warn!(
                    endpoint = %self.inner.name,
                    token = choice.token,
                    "token collision with partner"
                ),
                ChoiceKind::OutOfSync => error!(
                    endpoint = %self.inner.name,
                    last_sent = ?state.last_sent,
                    last_received = ?state.last_received,
                    "tokens out of sync, skipping ahead"
                ),
                _ => {}
            }
            let batch = match choice.payload {
                Payload::Queued => std::mem::take(&mut state.messages_to_be_sent),
                Payload::LastSent => state.messages_sent_last.clone(),
            };
            state.last_sent = Some(choice.token);
            state.messages_sent_last = batch.clone();
            (choice.token, batch)
        };

        debug!(endpoint = %self.inner.name, tag = tag, token = token, messages = batch.len(), "sending token");
        self.schedule("recover", self.inner.config.delta_recover_ms);

        match self.inner.transport.send_message(token, batch.clone()).await {
            Ok(()) => {
                self.emit(EndpointEvent::TokenSent(token));
                for msg in batch {
                    self.emit(EndpointEvent::MessageSent(msg));
                }
            }
            Err(e) if e.is_disabling() => {
                info!(endpoint = %self.inner.name, token = token, error = %e, "partner endpoint is dead");
                self.cancel_timer();
                self.emit(EndpointEvent::Disabled {
                    messages: batch,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                info!(endpoint = %self.inner.name, token = token, error = %e, "failed to send token");
                self.cancel_timer();
                self.schedule("resend", self.inner.config.delta_resend_ms);
                self.emit(EndpointEvent::MessageSendingFailed(batch));
            }
        }
    }

    fn schedule(&self, tag: &'static str, base_ms: u64) {
        if self.is_dead() {
            return;
        }
        let delay = self.inner.config.jittered(base_ms);
        debug!(endpoint = %self.inner.name, tag = tag, delay_ms = delay.as_millis() as u64, "schedule");

        let weak = Arc::downgrade(&self.inner);
        let runtime = self.inner.runtime.clone();
        let task = self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                let endpoint = PingPongMessageEndpoint { inner };
                // Detached so that cancelling the timer never interrupts a send.
                runtime.spawn(async move { endpoint.do_action(tag).await });
            }
        });
        if let Some(previous) = self.timer_slot().replace(task) {
            previous.abort();
        }
    }

    fn cancel_timer(&self) {
        if let Some(handle) = self.timer_slot().take() {
            handle.abort();
        }
    }

    fn timer_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: EndpointEvent<T>) {
        // The owner may have stopped listening.
        let _ = self.inner.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct RecordingTransport {
        sent: StdMutex<Vec<(u64, Vec<String>)>>,
        failures: AtomicUsize,
        dead: AtomicBool,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: StdMutex::new(Vec::new()),
                failures: AtomicUsize::new(0),
                dead: AtomicBool::new(false),
            })
        }

        fn sent(&self) -> Vec<(u64, Vec<String>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageTransport<String> for RecordingTransport {
        async fn send_message(&self, token: u64, content: Vec<String>) -> Result<()> {
            if self.dead.load(Ordering::SeqCst) {
                return Err(EndpointError::Dead);
            }
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(EndpointError::SendFailed {
                    msg: "unreachable".to_string(),
                });
            }
            self.sent.lock().unwrap().push((token, content));
            Ok(())
        }

        fn wins_collision(&self) -> bool {
            true
        }
    }

    fn slow_config() -> PingPongConfig {
        PingPongConfig {
            random_variation: 0.0,
            ..PingPongConfig::new(60_000, 60_000, 60_000)
        }
    }

    mod token_choice {
        use super::*;

        #[test]
        fn test_first_token_is_one() {
            let c = choose_token(None, None, true);
            assert_eq!(c.token, 1);
            assert_eq!(c.payload, Payload::Queued);
            assert_eq!(c.kind, ChoiceKind::First);
        }

        #[test]
        fn test_unanswered_first_token_is_resent() {
            let c = choose_token(Some(1), None, false);
            assert_eq!(c.token, 1);
            assert_eq!(c.payload, Payload::LastSent);
        }

        #[test]
        fn test_respond_to_first_token() {
            let c = choose_token(None, Some(1), false);
            assert_eq!(c.token, 2);
            assert_eq!(c.payload, Payload::Queued);
        }

        #[test]
        fn test_regular_response() {
            let c = choose_token(Some(4), Some(5), false);
            assert_eq!(c.token, 6);
            assert_eq!(c.kind, ChoiceKind::Respond);
        }

        #[test]
        fn test_resend_while_waiting() {
            let c = choose_token(Some(6), Some(5), false);
            assert_eq!(c.token, 6);
            assert_eq!(c.payload, Payload::LastSent);
            assert_eq!(c.kind, ChoiceKind::Resend);
        }

        #[test]
        fn test_collision_winner_moves_on() {
            let c = choose_token(Some(1), Some(1), true);
            assert_eq!(c.token, 2);
            assert_eq!(c.payload, Payload::Queued);
        }

        #[test]
        fn test_collision_loser_repeats() {
            let c = choose_token(Some(1), Some(1), false);
            assert_eq!(c.token, 1);
            assert_eq!(c.payload, Payload::LastSent);
        }

        #[test]
        fn test_out_of_sync_skips_ahead() {
            let c = choose_token(Some(3), Some(9), true);
            assert_eq!(c.token, 10);
            assert_eq!(c.payload, Payload::Queued);
            assert_eq!(c.kind, ChoiceKind::OutOfSync);
        }
    }

    mod sending {
        use super::*;

        #[tokio::test]
        async fn test_start_sends_queued_messages() {
            let transport = RecordingTransport::new();
            let (ep, mut events) =
                PingPongMessageEndpoint::create("a", slow_config(), transport.clone(), Handle::current());
            ep.enqueue_message_for_send("hello".to_string()).await.unwrap();
            ep.start_communicating().await;

            assert_eq!(transport.sent(), vec![(1, vec!["hello".to_string()])]);
            assert_eq!(ep.last_sent_token().await, Some(1));
            assert!(ep.messages_to_be_sent().await.is_empty());
            assert_eq!(ep.messages_sent_last().await, vec!["hello".to_string()]);
            assert!(ep.has_pending_timer());

            assert_eq!(events.recv().await, Some(EndpointEvent::MessageEnqueued("hello".to_string())));
            assert_eq!(events.recv().await, Some(EndpointEvent::TokenSent(1)));
            assert_eq!(events.recv().await, Some(EndpointEvent::MessageSent("hello".to_string())));
        }

        #[tokio::test]
        async fn test_start_is_noop_while_timer_pending() {
            let transport = RecordingTransport::new();
            let (ep, _events) =
                PingPongMessageEndpoint::create("a", slow_config(), transport.clone(), Handle::current());
            ep.start_communicating().await;
            ep.start_communicating().await;
            assert_eq!(transport.sent().len(), 1);
        }

        #[tokio::test]
        async fn test_send_failure_keeps_batch_and_schedules_resend() {
            let transport = RecordingTransport::new();
            transport.failures.store(1, Ordering::SeqCst);
            let config = PingPongConfig {
                random_variation: 0.0,
                ..PingPongConfig::new(60_000, 10, 60_000)
            };
            let (ep, mut events) =
                PingPongMessageEndpoint::create("a", config, transport.clone(), Handle::current());
            ep.enqueue_message_for_send("m".to_string()).await.unwrap();
            ep.start_communicating().await;

            assert_eq!(events.recv().await, Some(EndpointEvent::MessageEnqueued("m".to_string())));
            assert_eq!(
                events.recv().await,
                Some(EndpointEvent::MessageSendingFailed(vec!["m".to_string()]))
            );
            let sent = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap();
            assert_eq!(sent, Some(EndpointEvent::TokenSent(1)));
            assert_eq!(transport.sent(), vec![(1, vec!["m".to_string()])]);
        }

        #[tokio::test]
        async fn test_dead_partner_disables() {
            let transport = RecordingTransport::new();
            transport.dead.store(true, Ordering::SeqCst);
            let (ep, mut events) =
                PingPongMessageEndpoint::create("a", slow_config(), transport, Handle::current());
            ep.start_communicating().await;
            match events.recv().await {
                Some(EndpointEvent::Disabled { messages, .. }) => assert!(messages.is_empty()),
                other => panic!("unexpected event {:?}", other),
            }
            assert!(!ep.has_pending_timer());
        }
    }

    mod receiving {
        use super::*;

        #[tokio::test]
        async fn test_duplicate_token_is_delivered_once() {
            let transport = RecordingTransport::new();
            let (ep, mut events) =
                PingPongMessageEndpoint::create("b", slow_config(), transport, Handle::current());
            ep.incoming_message(1, vec!["x".to_string()]).await.unwrap();
            ep.incoming_message(1, vec!["x".to_string()]).await.unwrap();
            ep.graceful_die();
            drop(ep);

            let mut received = Vec::new();
            while let Some(event) = events.recv().await {
                received.push(event);
            }
            assert_eq!(
                received,
                vec![
                    EndpointEvent::TokenReceived(1),
                    EndpointEvent::MessageReceived("x".to_string()),
                ]
            );
        }

        #[tokio::test]
        async fn test_respond_timer_sends_next_token() {
            let transport = RecordingTransport::new();
            let config = PingPongConfig {
                random_variation: 0.0,
                ..PingPongConfig::new(5, 60_000, 60_000)
            };
            let (ep, mut events) =
                PingPongMessageEndpoint::create("b", config, transport.clone(), Handle::current());
            ep.enqueue_message_for_send("reply".to_string()).await.unwrap();
            ep.incoming_message(1, vec![]).await.unwrap();

            loop {
                let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                    .await
                    .unwrap();
                if event == Some(EndpointEvent::TokenSent(2)) {
                    break;
                }
            }
            assert_eq!(transport.sent(), vec![(2, vec!["reply".to_string()])]);
        }

        #[tokio::test]
        async fn test_collision_winner_never_resends_batch_under_new_token() {
            let transport = RecordingTransport::new();
            let config = PingPongConfig {
                random_variation: 0.0,
                ..PingPongConfig::new(5, 60_000, 60_000)
            };
            let (a, mut a_events) =
                PingPongMessageEndpoint::create("a", config, transport.clone(), Handle::current());
            a.enqueue_message_for_send("a".to_string()).await.unwrap();
            a.start_communicating().await;
            // both sides sent token 1 before hearing from each other
            a.incoming_message(1, vec!["b".to_string()]).await.unwrap();
            loop {
                let event = tokio::time::timeout(Duration::from_secs(5), a_events.recv())
                    .await
                    .unwrap();
                if event == Some(EndpointEvent::TokenSent(2)) {
                    break;
                }
            }
            a.graceful_die();
            assert_eq!(
                transport.sent(),
                vec![(1, vec!["a".to_string()]), (2, vec![])]
            );

            let (b, mut b_events) =
                PingPongMessageEndpoint::create("b", slow_config(), RecordingTransport::new(), Handle::current());
            for (token, batch) in transport.sent() {
                b.incoming_message(token, batch).await.unwrap();
            }
            b.graceful_die();
            drop(b);

            let mut received = Vec::new();
            while let Some(event) = b_events.recv().await {
                if let EndpointEvent::MessageReceived(msg) = event {
                    received.push(msg);
                }
            }
            assert_eq!(received, vec!["a".to_string()]);
        }

        #[tokio::test]
        async fn test_dead_endpoint_rejects() {
            let transport = RecordingTransport::new();
            let (ep, _events) =
                PingPongMessageEndpoint::create("b", slow_config(), transport, Handle::current());
            ep.graceful_die();
            ep.graceful_die();
            assert!(ep.is_dead());
            assert_eq!(ep.incoming_message(1, vec![]).await, Err(EndpointError::Dead));
            assert_eq!(
                ep.enqueue_message_for_send("late".to_string()).await,
                Err(EndpointError::Dead)
            );
        }
    }

    mod persistence {
        use super::*;

        #[tokio::test]
        async fn test_restore_resumes_tokens_and_queues() {
            let transport = RecordingTransport::new();
            let snapshot = EndpointSnapshot {
                last_sent_token: Some(6),
                last_received_token: Some(5),
                messages_to_be_sent: vec!["queued".to_string()],
                messages_sent_last: vec!["inflight".to_string()],
            };
            let (ep, _events) = PingPongMessageEndpoint::restore(
                "a",
                slow_config(),
                transport.clone(),
                Handle::current(),
                snapshot.clone(),
            );
            assert_eq!(ep.snapshot().await, snapshot);

            ep.start_communicating().await;
            assert_eq!(transport.sent(), vec![(6, vec!["inflight".to_string()])]);
            assert_eq!(ep.messages_to_be_sent().await, vec!["queued".to_string()]);
        }

        #[test]
        fn test_snapshot_serializes() {
            let snapshot: EndpointSnapshot<String> = EndpointSnapshot {
                last_sent_token: Some(2),
                ..Default::default()
            };
            let json = serde_json::to_string(&snapshot).unwrap();
            let back: EndpointSnapshot<String> = serde_json::from_str(&json).unwrap();
            assert_eq!(back, snapshot);
        }
    }
}
