//! PN532 NFC reader support for bopbox.
//!
//! [`Pn532`] runs one command at a time over a serial link, correlating
//! the chip's ACK and response frames with the command that caused them.
//! [`NfcService`] polls it for ISO14443A cards and turns presence changes
//! into [`NfcEvent`]s.
//!
//! # Example
//!
//! ```no_run
//! use bopbox_hardware::SerialPortLink;
//! use bopbox_rfid::Pn532;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let reader = Arc::new(Pn532::new(SerialPortLink::open("/dev/ttyUSB1", 115_200)?));
//!
//! let cancel = CancellationToken::new();
//! let poller = {
//!     let reader = Arc::clone(&reader);
//!     let cancel = cancel.clone();
//!     tokio::spawn(async move { reader.run(cancel).await })
//! };
//!
//! if let Some(uid) = reader.get_passive_target().await? {
//!     println!("card {uid}");
//! }
//!
//! cancel.cancel();
//! poller.await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod pn532;
pub mod service;

pub use error::{Pn532Error, Result};
pub use pn532::{FrameErrorCallback, Pn532, Retries};
pub use service::{NfcConfig, NfcEvent, NfcService};
