//! Incremental parser for PN532 frames.
//!
//! The PN532 answers every command with an ACK frame followed by a data
//! frame, and a serial read may return any slice of that stream: half an
//! ACK, an ACK and the start of the data frame, a single byte. The parser
//! keeps its state across [`FrameParser::feed`] calls and walks the input
//! one byte at a time.
//!
//! # State Machine
//!
//! ```text
//!        00          FF           LEN          LCS ok      LEN bytes
//! Idle ─────> Start1 ─────> Len ─────> Lcs ─────────> Body ─────────> Dcs
//!  ^           │ 00: stay               │ ACK/NACK                    │ DCS ok
//!  │           │ other: Idle            └──────────────┐              v
//!  │                                                   └─────────> Postamble
//!  └──────────────────── frame or error ─────────────────────────────┘
//! ```
//!
//! A bad length checksum, bad data checksum, oversized or empty body, or a
//! wrong direction byte produces an error and sends the parser back to
//! `Idle`. Nothing is ever emitted before the postamble byte.

use super::checksum::sum;
use super::frame::Frame;
use bopbox_core::{
    Error, Result,
    constants::{
        PN532_DEVICE_TO_HOST, PN532_MAX_BODY_LEN, PN532_START_CODE_1, PN532_START_CODE_2,
    },
};
use std::collections::VecDeque;

/// LEN/LCS pair of an ACK frame.
const ACK_LEN_LCS: (u8, u8) = (0x00, 0xFF);

/// LEN/LCS pair of a NACK frame.
const NACK_LEN_LCS: (u8, u8) = (0xFF, 0x00);

/// TFI + command byte.
const MIN_BODY_LEN: usize = 2;

const INITIAL_QUEUE_CAPACITY: usize = 4;

/// Position in the frame currently being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for the first start code.
    Idle,
    /// Seen `00`, waiting for `FF`.
    Start1,
    /// Waiting for the LEN byte.
    Len,
    /// Waiting for the LCS byte.
    Lcs,
    /// Accumulating LEN body bytes.
    Body,
    /// Waiting for the DCS byte.
    Dcs,
    /// Waiting for the postamble byte.
    Postamble,
}

/// What the postamble byte completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Ack,
    Nack,
    Data,
}

/// Stateful PN532 frame parser.
///
/// Completed frames and parse errors are queued in arrival order and taken
/// with [`next_frame`](FrameParser::next_frame) or
/// [`drain_frames`](FrameParser::drain_frames).
///
/// # Example
///
/// ```
/// use bopbox_protocol::{Frame, FrameParser, ParserState};
///
/// let mut parser = FrameParser::new();
///
/// // ACK split across two reads
/// parser.feed(&[0x00, 0x00, 0xFF]);
/// assert!(parser.next_frame().is_none());
///
/// parser.feed(&[0x00, 0xFF, 0x00]);
/// assert_eq!(parser.next_frame().unwrap().unwrap(), Frame::Ack);
/// assert_eq!(parser.state(), ParserState::Idle);
/// ```
#[derive(Debug)]
pub struct FrameParser {
    state: ParserState,
    len: u8,
    pending: Pending,
    body: Vec<u8>,
    frames: VecDeque<Result<Frame>>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
            len: 0,
            pending: Pending::Data,
            body: Vec::with_capacity(PN532_MAX_BODY_LEN),
            frames: VecDeque::with_capacity(INITIAL_QUEUE_CAPACITY),
        }
    }

    /// Run `bytes` through the state machine, queueing every frame or
    /// error completed along the way.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if let Some(result) = self.push(b) {
                self.frames.push_back(result);
            }
        }
    }

    /// Advance the state machine by one byte.
    ///
    /// Returns a frame when `b` was its postamble, or an error when `b`
    /// invalidated the frame in progress. The parser is back in `Idle` after
    /// either.
    pub fn push(&mut self, b: u8) -> Option<Result<Frame>> {
        match self.state {
            ParserState::Idle => {
                if b == PN532_START_CODE_1 {
                    self.state = ParserState::Start1;
                }
                None
            }
            ParserState::Start1 => {
                if b == PN532_START_CODE_2 {
                    self.state = ParserState::Len;
                } else if b != PN532_START_CODE_1 {
                    self.state = ParserState::Idle;
                }
                None
            }
            ParserState::Len => {
                self.len = b;
                self.state = ParserState::Lcs;
                None
            }
            ParserState::Lcs => self.on_length_checksum(b),
            ParserState::Body => {
                self.body.push(b);
                if self.body.len() == self.len as usize {
                    self.state = ParserState::Dcs;
                }
                None
            }
            ParserState::Dcs => {
                let total = sum(&self.body).wrapping_add(b);
                if total != 0 {
                    return Some(self.fail(Error::BadDataChecksum { sum: total }));
                }
                self.state = ParserState::Postamble;
                None
            }
            // The postamble value itself is not checked
            ParserState::Postamble => Some(self.complete()),
        }
    }

    fn on_length_checksum(&mut self, lcs: u8) -> Option<Result<Frame>> {
        match (self.len, lcs) {
            ACK_LEN_LCS => {
                self.pending = Pending::Ack;
                self.state = ParserState::Postamble;
                return None;
            }
            NACK_LEN_LCS => {
                self.pending = Pending::Nack;
                self.state = ParserState::Postamble;
                return None;
            }
            _ => {}
        }

        if self.len.wrapping_add(lcs) != 0 {
            return Some(self.fail(Error::BadLengthChecksum {
                length: self.len,
                checksum: lcs,
            }));
        }

        let len = self.len as usize;
        if len > PN532_MAX_BODY_LEN {
            return Some(self.fail(Error::FrameTooLarge {
                length: len,
                max: PN532_MAX_BODY_LEN,
            }));
        }
        if len < MIN_BODY_LEN {
            return Some(self.fail(Error::EmptyFrame));
        }

        self.pending = Pending::Data;
        self.body.clear();
        self.state = ParserState::Body;
        None
    }

    fn complete(&mut self) -> Result<Frame> {
        let result = match self.pending {
            Pending::Ack => Ok(Frame::Ack),
            Pending::Nack => Ok(Frame::Nack),
            Pending::Data => match self.body.as_slice() {
                [PN532_DEVICE_TO_HOST, command, payload @ ..] => Ok(Frame::Data {
                    command: *command,
                    payload: payload.to_vec(),
                }),
                [direction, ..] => Err(Error::BadDirection(*direction)),
                [] => Err(Error::EmptyFrame),
            },
        };
        self.reset();
        result
    }

    fn fail(&mut self, error: Error) -> Result<Frame> {
        self.reset();
        Err(error)
    }

    fn reset(&mut self) {
        self.state = ParserState::Idle;
        self.len = 0;
        self.pending = Pending::Data;
        self.body.clear();
    }

    /// Take the oldest completed frame or parse error.
    pub fn next_frame(&mut self) -> Option<Result<Frame>> {
        self.frames.pop_front()
    }

    /// Number of queued frames and errors.
    pub fn frames_available(&self) -> usize {
        self.frames.len()
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Drop any partial frame and everything queued.
    pub fn clear(&mut self) {
        self.reset();
        self.frames.clear();
    }

    /// Iterate over, and remove, everything queued so far.
    pub fn drain_frames(&mut self) -> DrainFrames<'_> {
        DrainFrames { parser: self }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`FrameParser::drain_frames`].
pub struct DrainFrames<'a> {
    parser: &'a mut FrameParser,
}

impl Iterator for DrainFrames<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.parser.next_frame()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.parser.frames_available();
        (len, Some(len))
    }
}

impl ExactSizeIterator for DrainFrames<'_> {}
