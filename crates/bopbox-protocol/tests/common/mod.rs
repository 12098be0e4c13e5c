//! Shared helpers for the protocol integration tests.

#![allow(dead_code)]

use bopbox_core::constants::PN532_DEVICE_TO_HOST;
use bopbox_protocol::{Frame, FrameParser, encode_frame};

/// InListPassiveTarget response carrying one ISO14443A target.
pub const PASSIVE_TARGET_PAYLOAD: [u8; 10] = [0x01, 0x00, 0x00, 0x44, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF];

/// GetFirmwareVersion response of a PN532 v1.6.
pub const FIRMWARE_PAYLOAD: [u8; 4] = [0x32, 0x01, 0x06, 0x07];

/// Device-side data frame bytes.
pub fn device_frame(command: u8, payload: &[u8]) -> Vec<u8> {
    encode_frame(PN532_DEVICE_TO_HOST, command, payload).unwrap()
}

/// Feed `bytes` split at the given chunk sizes (cycled) and collect every
/// successfully parsed frame, panicking on a parse error.
pub fn parse_chunked(bytes: &[u8], chunk_sizes: &[usize]) -> Vec<Frame> {
    let mut parser = FrameParser::new();
    let mut frames = Vec::new();
    let mut offset = 0;

    for &size in chunk_sizes.iter().cycle() {
        if offset >= bytes.len() {
            break;
        }
        let end = (offset + size.max(1)).min(bytes.len());
        parser.feed(&bytes[offset..end]);
        offset = end;

        for result in parser.drain_frames() {
            frames.push(result.unwrap());
        }
    }
    frames
}
