//! Mock link implementations for testing and development.
//!
//! This module provides a simulated serial link that can be scripted
//! programmatically without requiring physical hardware.

pub mod serial;

// Re-export commonly used types
pub use serial::{MockSerialHandle, MockSerialLink};
