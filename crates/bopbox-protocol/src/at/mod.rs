//! Espressif AT command text protocol.

pub mod codec;
pub mod response;

pub use codec::{build_parameter_list, escape_parameter, response_prefix, unescape_parameter};
pub use response::{Terminator, find_subslice, find_terminator};
