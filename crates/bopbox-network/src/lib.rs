//! ESP-01S WiFi modem support for bopbox.
//!
//! The modem speaks AT commands over a UART and reports TCP server activity
//! with unsolicited result codes on the same line. This crate layers:
//!
//! - [`AtEngine`]: one command in flight, response correlation by prefix
//!   and terminal marker, timeouts, cancellation
//! - [`TcpTracker`]: `CONNECT` / `CLOSED` / `+IPD` notifications turned into
//!   [`TcpEvent`]s for a [`TcpEventHandler`]
//! - [`Esp01s`]: the modem operations as `Result<bool>` methods
//! - [`NetworkService`]: access point join plus a tiny HTTP server
//!
//! # Example
//!
//! ```no_run
//! use bopbox_hardware::SerialPortLink;
//! use bopbox_network::Esp01s;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let link = SerialPortLink::open("/dev/ttyUSB0", 115_200)?;
//! let modem = Arc::new(Esp01s::new(link));
//!
//! let cancel = CancellationToken::new();
//! let poller = {
//!     let modem = Arc::clone(&modem);
//!     let cancel = cancel.clone();
//!     tokio::spawn(async move { modem.run(cancel).await })
//! };
//!
//! if modem.test().await? {
//!     modem.connect_access_point("home", "secret").await?;
//! }
//!
//! cancel.cancel();
//! poller.await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod esp01s;
pub mod http;
pub mod service;
pub mod tracker;

pub use engine::AtEngine;
pub use error::{AtError, Result};
pub use esp01s::Esp01s;
pub use http::{HttpHandler, HttpRequest, HttpResponse};
pub use service::{NetworkConfig, NetworkService};
pub use tracker::{TcpEvent, TcpEventHandler, TcpTracker};
