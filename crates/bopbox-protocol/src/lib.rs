//! Pure wire codecs for the two bopbox peripherals.
//!
//! Nothing in this crate performs I/O. The [`at`] module builds AT command
//! lines and recognises the markers that complete a response; the [`pn532`]
//! module builds PN532 command frames and reassembles device frames from an
//! arbitrarily chunked byte stream.

pub mod at;
pub mod pn532;

pub use at::{
    Terminator, build_parameter_list, escape_parameter, find_subslice, find_terminator,
    response_prefix, unescape_parameter,
};
pub use pn532::{DrainFrames, Frame, FrameParser, ParserState, build_command_frame, encode_frame};
