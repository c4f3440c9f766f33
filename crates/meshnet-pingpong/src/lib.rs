#![warn(missing_docs)]

//! MeshNet ping-pong messaging: a two-party, token-alternating message endpoint
//! with jittered respond/resend/recover timers.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod memory;
pub mod transport;

pub use config::PingPongConfig;
pub use endpoint::{EndpointSnapshot, PingPongMessageEndpoint, WeakEndpoint};
pub use error::{EndpointError, Result};
pub use event::EndpointEvent;
pub use memory::{MemoryEndpoint, MemoryTransport};
pub use transport::MessageTransport;
