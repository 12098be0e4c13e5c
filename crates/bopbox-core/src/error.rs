use thiserror::Error;

/// Protocol violations and domain validation failures.
///
/// Frame-level variants are raised by the PN532 frame parser; the parser
/// always returns to its idle state before surfacing one of them, so a
/// caller never needs to repair parser state after seeing an error.
#[derive(Error, Debug)]
pub enum Error {
    // Frame errors
    #[error("Bad length checksum: length {length:#04x}, checksum {checksum:#04x}")]
    BadLengthChecksum { length: u8, checksum: u8 },

    #[error("Bad data checksum: sum {sum:#04x} is not zero")]
    BadDataChecksum { sum: u8 },

    #[error("Bad direction byte: {0:#04x}")]
    BadDirection(u8),

    #[error("Frame too large: declared {length} bytes, max {max}")]
    FrameTooLarge { length: usize, max: usize },

    #[error("Empty frame")]
    EmptyFrame,

    // Domain errors
    #[error("Invalid connection id: {0}")]
    InvalidConnectionId(u8),

    #[error("Invalid UID: {0}")]
    InvalidUid(String),

    /// Rejected runtime configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
