//! PN532 binary frame protocol.
//!
//! See [`bopbox_core::constants`] for the frame layout.

pub mod checksum;
pub mod frame;
pub mod parser;

pub use frame::{Frame, build_command_frame, encode_frame};
pub use parser::{DrainFrames, FrameParser, ParserState};
