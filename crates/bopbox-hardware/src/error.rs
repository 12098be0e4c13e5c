//! Serial link failures.

/// Result type alias for link operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// A link that cannot move bytes.
///
/// Drivers never retry on these; they surface them to the caller of the
/// command in flight.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The port went away (USB adapter unplugged, mock handle disconnected).
    #[error("Link disconnected: {link}")]
    Disconnected { link: String },

    /// Rejected before the port was opened.
    #[error("Invalid link configuration: {message}")]
    Configuration { message: String },

    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn disconnected(link: impl Into<String>) -> Self {
        Self::Disconnected { link: link.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_message() {
        let error = HardwareError::disconnected("/dev/ttyUSB0");
        assert_eq!(error.to_string(), "Link disconnected: /dev/ttyUSB0");
    }

    #[test]
    fn test_configuration_message() {
        let error = HardwareError::configuration("baud rate must be non-zero");
        assert_eq!(
            error.to_string(),
            "Invalid link configuration: baud rate must be non-zero"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let error: HardwareError = io.into();
        assert!(matches!(error, HardwareError::Io(_)));
        assert!(error.to_string().contains("gone"));
    }
}
