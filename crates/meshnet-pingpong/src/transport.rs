//! Pluggable transport seam underneath a ping-pong endpoint.

use async_trait::async_trait;

use crate::error::Result;

/// Delivers one token and its batch to the partner endpoint.
#[async_trait]
pub trait MessageTransport<T: Send + 'static>: Send + Sync {
    /// Send `token` carrying `content` to the partner.
    ///
    /// `EndpointError::Dead` disables the sending endpoint; any other error
    /// schedules a resend.
    async fn send_message(&self, token: u64, content: Vec<T>) -> Result<()>;

    /// Whether this side keeps going when both sides sent the same token concurrently.
    ///
    /// The two transports of one channel must return opposite values.
    fn wins_collision(&self) -> bool;
}
