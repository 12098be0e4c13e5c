//! Shared building blocks for the bopbox firmware crates.
//!
//! Holds the protocol-violation error type, the wire constants for both
//! peripheral protocols, and the small domain newtypes passed between the
//! driver and service layers.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
