//! PN532 frame reassembly across arbitrary read boundaries.

mod common;

use bopbox_core::constants::PN532_ACK_FRAME;
use bopbox_protocol::{Frame, FrameParser, ParserState};
use proptest::prelude::*;

fn command_exchange() -> Vec<u8> {
    let mut bytes = PN532_ACK_FRAME.to_vec();
    bytes.extend(common::device_frame(0x4B, &common::PASSIVE_TARGET_PAYLOAD));
    bytes.extend(PN532_ACK_FRAME);
    bytes.extend(common::device_frame(0x03, &common::FIRMWARE_PAYLOAD));
    bytes
}

fn expected_frames() -> Vec<Frame> {
    vec![
        Frame::Ack,
        Frame::Data {
            command: 0x4B,
            payload: common::PASSIVE_TARGET_PAYLOAD.to_vec(),
        },
        Frame::Ack,
        Frame::Data {
            command: 0x03,
            payload: common::FIRMWARE_PAYLOAD.to_vec(),
        },
    ]
}

#[test]
fn test_whole_stream_in_one_chunk() {
    let bytes = command_exchange();
    assert_eq!(common::parse_chunked(&bytes, &[bytes.len()]), expected_frames());
}

#[test]
fn test_single_byte_chunks() {
    assert_eq!(common::parse_chunked(&command_exchange(), &[1]), expected_frames());
}

#[test]
fn test_error_does_not_swallow_following_frames() {
    let mut corrupted = common::device_frame(0x03, &common::FIRMWARE_PAYLOAD);
    corrupted[4] = corrupted[4].wrapping_add(1); // LCS

    let mut bytes = corrupted;
    bytes.extend(PN532_ACK_FRAME);

    let mut parser = FrameParser::new();
    parser.feed(&bytes);

    let results: Vec<_> = parser.drain_frames().collect();
    assert!(results[0].is_err());
    assert_eq!(results.last().unwrap().as_ref().unwrap(), &Frame::Ack);
    assert_eq!(parser.state(), ParserState::Idle);
}

proptest! {
    #[test]
    fn prop_chunking_never_changes_frames(
        chunk_sizes in proptest::collection::vec(1usize..16, 1..8)
    ) {
        let frames = common::parse_chunked(&command_exchange(), &chunk_sizes);
        prop_assert_eq!(frames, expected_frames());
    }
}
