//! Error types for the ping-pong message endpoint.

use thiserror::Error;

/// Errors raised while sending or receiving through a message endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// The transport could not deliver the token; the endpoint will resend.
    #[error("message send failed: {msg}")]
    SendFailed {
        /// Error message describing the failure.
        msg: String,
    },

    /// The endpoint (or its partner) has been shut down permanently.
    #[error("message endpoint is dead")]
    Dead,

    /// No partner endpoint could be resolved for this endpoint.
    #[error("no partner endpoint for {name}")]
    NoPartner {
        /// Name of the endpoint without a partner.
        name: String,
    },

    /// An endpoint was asked to talk to itself.
    #[error("endpoint {name} cannot be its own partner")]
    SelfPartner {
        /// Name of the offending endpoint.
        name: String,
    },
}

impl EndpointError {
    /// Returns true if this error permanently disables the endpoint.
    pub fn is_disabling(&self) -> bool {
        matches!(self, EndpointError::Dead | EndpointError::SelfPartner { .. })
    }
}

/// Result type for endpoint operations.
pub type Result<T> = std::result::Result<T, EndpointError>;
