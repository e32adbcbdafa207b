//! Error types shared by remote and event-stream backends.

use thiserror::Error;

/// Failure of a remote request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The request never produced a response (DNS, TLS, connection reset, timeout).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("unexpected status: {code}")]
    Status {
        /// HTTP-style status code.
        code: u16,
    },

    /// The response body could not be decoded.
    #[error("response decode failed: {0}")]
    Decode(String),
}

impl NetworkError {
    /// True when the service reported that the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NetworkError::Status { code: 404 })
    }
}

/// Failure of the realtime event subscription.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventStreamError {
    /// The subscription could not be established.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// The established subscription failed while delivering events.
    #[error("event delivery failed: {0}")]
    Delivery(String),
}
