//! Recognising the markers that complete an AT response.

use bopbox_core::constants::{AT_RESPONSE_ERROR, AT_RESPONSE_FAIL, AT_RESPONSE_OK};

/// One of the three markers that end a command's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// `OK\r\n`
    Ok,
    /// `ERROR\r\n`
    Error,
    /// `FAIL\r\n`
    Fail,
}

impl Terminator {
    pub const ALL: [Terminator; 3] = [Terminator::Ok, Terminator::Error, Terminator::Fail];

    /// Longest marker minus one: how many trailing bytes of a chunk must be
    /// kept to spot a marker split across two reads.
    pub const OVERLAP: usize = 6;

    /// Wire bytes of the marker.
    pub fn marker(self) -> &'static [u8] {
        match self {
            Terminator::Ok => AT_RESPONSE_OK,
            Terminator::Error => AT_RESPONSE_ERROR,
            Terminator::Fail => AT_RESPONSE_FAIL,
        }
    }

    pub fn is_success(self) -> bool {
        self == Terminator::Ok
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
///
/// An empty needle matches at 0.
pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// The earliest terminal marker in `bytes`, if any.
///
/// # Examples
///
/// ```
/// use bopbox_protocol::{Terminator, find_terminator};
///
/// assert_eq!(find_terminator(b"AT\r\r\n\r\nOK\r\n"), Some(Terminator::Ok));
/// assert_eq!(find_terminator(b"+CWJAP:1\r\n\r\nFAIL\r\n"), Some(Terminator::Fail));
/// assert_eq!(find_terminator(b"busy p...\r\n"), None);
/// ```
pub fn find_terminator(bytes: &[u8]) -> Option<Terminator> {
    Terminator::ALL
        .into_iter()
        .filter_map(|t| find_subslice(bytes, t.marker()).map(|pos| (pos, t)))
        .min_by_key(|&(pos, _)| pos)
        .map(|(_, t)| t)
}
