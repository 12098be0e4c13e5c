//! Shared fixtures for the PN532 integration tests.

#![allow(dead_code)]

use bopbox_core::constants::{PN532_ACK_FRAME, PN532_DEVICE_TO_HOST, PN532_NACK_FRAME};
use bopbox_hardware::mock::{MockSerialHandle, MockSerialLink};
use bopbox_protocol::{build_command_frame, encode_frame};
use bopbox_rfid::Pn532;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub type MockReader = Pn532<MockSerialLink>;

/// InListPassiveTarget response carrying one ISO14443A target.
pub const PASSIVE_TARGET_PAYLOAD: [u8; 10] =
    [0x01, 0x00, 0x00, 0x44, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF];

/// InListPassiveTarget response with no target in the field.
pub const NO_TARGET_PAYLOAD: [u8; 1] = [0x00];

/// GetFirmwareVersion response of a PN532 v1.6.
pub const FIRMWARE_PAYLOAD: [u8; 4] = [0x32, 0x01, 0x06, 0x07];

pub const PASSIVE_TARGET_PARAMS: [u8; 2] = [0x01, 0x00];

pub fn reader() -> (MockReader, MockSerialHandle) {
    let (link, handle) = MockSerialLink::new();
    (Pn532::new(link).with_timeout(Duration::from_secs(1)), handle)
}

pub fn ack() -> Vec<u8> {
    PN532_ACK_FRAME.to_vec()
}

pub fn nack() -> Vec<u8> {
    PN532_NACK_FRAME.to_vec()
}

/// Device-side data frame answering `command`.
pub fn response_frame(command: u8, payload: &[u8]) -> Vec<u8> {
    encode_frame(PN532_DEVICE_TO_HOST, command + 1, payload).unwrap()
}

pub fn command_frame(command: u8, data: &[u8]) -> Vec<u8> {
    build_command_frame(command, data).unwrap()
}

/// Answer every `command` with ACK, then a data frame carrying `payload`.
pub fn respond(handle: &MockSerialHandle, command: u8, data: &[u8], payload: &[u8]) {
    handle.reply_to(
        &command_frame(command, data),
        vec![ack(), response_frame(command, payload)],
    );
}

/// Run `op` while the reader's receive loop polls.
pub async fn with_poll<F: Future>(reader: &MockReader, op: F) -> F::Output {
    let cancel = CancellationToken::new();
    let (out, ()) = tokio::join!(
        async {
            let out = op.await;
            cancel.cancel();
            out
        },
        reader.run(cancel.clone()),
    );
    out
}
