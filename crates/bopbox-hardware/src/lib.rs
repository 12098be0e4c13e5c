//! Serial link layer for the bopbox peripherals.
//!
//! Both peripherals (the ESP-01S WiFi modem and the PN532 NFC controller)
//! hang off a UART. This crate provides the [`SerialLink`] trait the
//! drivers are written against, plus two implementations:
//!
//! - [`SerialPortLink`] (feature `serial`, on by default): a real port opened
//!   through the `serialport` crate.
//! - [`mock::MockSerialLink`]: an in-memory link with a control handle, used
//!   by every driver test.
//!
//! # Example
//!
//! ```
//! use bopbox_hardware::SerialLink;
//! use bopbox_hardware::mock::MockSerialLink;
//!
//! let (mut link, handle) = MockSerialLink::new();
//! handle.push_rx(b"ready\r\n");
//!
//! link.write(b"AT\r\n").unwrap();
//! assert_eq!(link.read_available().unwrap(), b"ready\r\n".to_vec());
//! ```
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`][error::Result] which uses the
//! [`HardwareError`] error type.

pub mod error;
pub mod mock;
#[cfg(feature = "serial")]
pub mod serial;
pub mod traits;

// Re-export commonly used types for convenience
pub use error::{HardwareError, Result};
#[cfg(feature = "serial")]
pub use serial::SerialPortLink;
pub use traits::SerialLink;
