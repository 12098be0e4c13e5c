//! Errors raised by the AT command engine.

use bopbox_hardware::HardwareError;
use thiserror::Error;

/// Result type alias for AT operations.
pub type Result<T> = std::result::Result<T, AtError>;

/// Failures of an AT exchange.
///
/// A modem answering `ERROR` or `FAIL` is not an error: the driver
/// operations report it as `Ok(false)`.
#[derive(Debug, Error)]
pub enum AtError {
    /// No terminal marker arrived before the deadline.
    #[error("AT command timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The link accepted fewer bytes than the command line holds.
    #[error("Short write: {written} of {expected} bytes")]
    WriteFailed { expected: usize, written: usize },

    /// `AT+CIPSEND` payload above the modem's limit.
    #[error("Payload too large: {length} bytes, max {max}")]
    PayloadTooLarge { length: usize, max: usize },

    /// The engine was closed while the command was queued or in flight.
    #[error("AT command cancelled")]
    Cancelled,

    /// Serial link failure.
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
}

impl AtError {
    pub(crate) fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout {
            duration_ms: duration.as_millis() as u64,
        }
    }
}
