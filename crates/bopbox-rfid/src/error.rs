//! Errors raised by the PN532 engine.

use bopbox_hardware::HardwareError;
use thiserror::Error;

/// Result type alias for PN532 operations.
pub type Result<T> = std::result::Result<T, Pn532Error>;

/// Failures of a PN532 exchange.
///
/// "No card in the field" and NACK are ordinary outcomes and never show
/// up here.
#[derive(Debug, Error)]
pub enum Pn532Error {
    /// ACK or response frame missing at the deadline.
    #[error("PN532 command timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Short write: {written} of {expected} bytes")]
    WriteFailed { expected: usize, written: usize },

    /// The engine was closed while the command was queued or in flight.
    #[error("PN532 command cancelled")]
    Cancelled,

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    /// Frame could not be built or parsed.
    #[error("Protocol error: {0}")]
    Protocol(#[from] bopbox_core::Error),

    /// A valid frame whose payload does not decode.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl Pn532Error {
    pub(crate) fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout {
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }
}
