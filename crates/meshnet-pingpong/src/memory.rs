//! In-process transport pair for tests and single-process deployments.
//!
//! Each side's transport hands tokens straight to the partner endpoint's
//! `incoming_message`. Tokens can be dropped or failed on purpose to exercise
//! the recover and resend paths.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::PingPongConfig;
use crate::endpoint::{PingPongMessageEndpoint, WeakEndpoint};
use crate::error::{EndpointError, Result};
use crate::event::EndpointEvent;
use crate::transport::MessageTransport;

/// Transport that delivers to a partner endpoint in the same process.
pub struct MemoryTransport<T: Send + 'static> {
    name: String,
    partner: Mutex<Option<WeakEndpoint<T>>>,
    wins_collision: bool,
    fail_next: AtomicU32,
    drop_next: AtomicU32,
    delivered: AtomicU64,
}

impl<T: Send + 'static> fmt::Debug for MemoryTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("name", &self.name)
            .field("wins_collision", &self.wins_collision)
            .finish()
    }
}

impl<T> MemoryTransport<T>
where
    T: Clone + fmt::Debug + Send + Sync + 'static,
{
    fn new(name: &str, wins_collision: bool) -> Self {
        Self {
            name: name.to_string(),
            partner: Mutex::new(None),
            wins_collision,
            fail_next: AtomicU32::new(0),
            drop_next: AtomicU32::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    fn set_partner(&self, partner: WeakEndpoint<T>) {
        *self
            .partner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(partner);
    }

    fn partner(&self) -> Option<WeakEndpoint<T>> {
        self.partner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Make the next `n` sends fail with `SendFailed`.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Silently lose the next `n` tokens.
    pub fn drop_next(&self, n: u32) {
        self.drop_next.store(n, Ordering::SeqCst);
    }

    /// Number of tokens handed to the partner so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl<T> MessageTransport<T> for MemoryTransport<T>
where
    T: Clone + fmt::Debug + Send + Sync + 'static,
{
    async fn send_message(&self, token: u64, content: Vec<T>) -> Result<()> {
        if take_one(&self.fail_next) {
            return Err(EndpointError::SendFailed {
                msg: format!("{}: injected failure", self.name),
            });
        }
        if take_one(&self.drop_next) {
            debug!(transport = %self.name, token = token, "dropping token");
            return Ok(());
        }
        let partner = self
            .partner()
            .and_then(|weak| weak.upgrade())
            .ok_or_else(|| EndpointError::NoPartner {
                name: self.name.clone(),
            })?;
        partner.incoming_message(token, content).await?;
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wins_collision(&self) -> bool {
        self.wins_collision
    }
}

/// One side of an in-process endpoint pair.
pub struct MemoryEndpoint<T: Send + 'static> {
    /// The endpoint itself.
    pub endpoint: PingPongMessageEndpoint<T>,
    /// Events emitted by the endpoint.
    pub events: mpsc::UnboundedReceiver<EndpointEvent<T>>,
    /// The transport, for fault injection.
    pub transport: Arc<MemoryTransport<T>>,
}

impl<T> MemoryEndpoint<T>
where
    T: Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Create two endpoints wired to each other. The first one wins token collisions.
    pub fn create_pair(
        name_a: &str,
        name_b: &str,
        config: PingPongConfig,
        runtime: Handle,
    ) -> Result<(Self, Self)> {
        if name_a == name_b {
            return Err(EndpointError::SelfPartner {
                name: name_a.to_string(),
            });
        }
        let transport_a = Arc::new(MemoryTransport::new(name_a, true));
        let transport_b = Arc::new(MemoryTransport::new(name_b, false));

        let (endpoint_a, events_a) = PingPongMessageEndpoint::create(
            name_a,
            config.clone(),
            transport_a.clone(),
            runtime.clone(),
        );
        let (endpoint_b, events_b) =
            PingPongMessageEndpoint::create(name_b, config, transport_b.clone(), runtime);

        transport_a.set_partner(endpoint_b.downgrade());
        transport_b.set_partner(endpoint_a.downgrade());

        Ok((
            Self {
                endpoint: endpoint_a,
                events: events_a,
                transport: transport_a,
            },
            Self {
                endpoint: endpoint_b,
                events: events_b,
                transport: transport_b,
            },
        ))
    }

    /// Wait for the next `MessageReceived` event, skipping everything else.
    pub async fn next_received(&mut self) -> Option<T> {
        while let Some(event) = self.events.recv().await {
            if let EndpointEvent::MessageReceived(msg) = event {
                return Some(msg);
            }
        }
        None
    }
}
