use std::time::Duration;

use thiserror::Error;

/// Errors raised by the protocol layer.
///
/// Every error is local to the operation that produced it. Nothing is retried;
/// a caller that wants to retry must negotiate a fresh session, which also
/// consumes a fresh sequence number.
#[derive(Debug, Error)]
pub enum MilightError {
    /// Malformed colour, percentage or kelvin input.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// The action cannot be expressed for the requested scope.
    #[error("Unsupported operation: {action} is not available on {scope}")]
    UnsupportedOperation {
        action: &'static str,
        scope: &'static str,
    },

    /// The checksum needs at least 11 bytes.
    #[error("Malformed packet: {0} bytes, checksum needs at least 11")]
    MalformedPacket(usize),

    #[error("No reply from {peer} within {timeout:?}")]
    Timeout { peer: String, timeout: Duration },

    /// Short or garbled session reply.
    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Transport error: {0}")]
    TransportError(#[from] std::io::Error),
}

impl MilightError {
    /// Whether a cached session for the device should be thrown away after this error.
    pub fn invalidates_session(&self) -> bool {
        matches!(
            self,
            MilightError::Timeout { .. }
                | MilightError::HandshakeError(_)
                | MilightError::TransportError(_)
        )
    }
}

pub type Result<T, E = MilightError> = std::result::Result<T, E>;
