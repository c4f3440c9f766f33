//! Events emitted by a ping-pong endpoint to its owner.

/// Something that happened on a message endpoint.
///
/// Events are delivered in order on one channel, so a consumer sees the
/// `TokenReceived` for a batch before the `MessageReceived` events it carried.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointEvent<T> {
    /// A message was queued for the next outgoing token.
    MessageEnqueued(T),
    /// A token went out successfully.
    TokenSent(u64),
    /// A new (non-duplicate) token arrived.
    TokenReceived(u64),
    /// A message was transmitted as part of a token.
    MessageSent(T),
    /// A message arrived as part of a new token.
    MessageReceived(T),
    /// A send attempt failed; the batch stays queued for resend.
    MessageSendingFailed(Vec<T>),
    /// The endpoint can no longer communicate.
    Disabled {
        /// Messages that were in the failed batch.
        messages: Vec<T>,
        /// Why the endpoint was disabled.
        reason: String,
    },
}
