//! Shared fixtures for the modem integration tests.

#![allow(dead_code)]

use bopbox_core::ConnectionId;
use bopbox_hardware::mock::{MockSerialHandle, MockSerialLink};
use bopbox_network::{Esp01s, TcpEventHandler};
use bytes::Bytes;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub type MockModem = Esp01s<MockSerialLink>;

pub fn modem() -> (MockModem, MockSerialHandle) {
    let (link, handle) = MockSerialLink::new();
    (Esp01s::new(link), handle)
}

/// Modem reporting TCP events to a fresh [`Recorder`].
pub fn recording_modem() -> (MockModem, MockSerialHandle, Arc<Recorder>) {
    let (link, handle) = MockSerialLink::new();
    let recorder = Arc::new(Recorder::default());
    let modem = Esp01s::new(link).with_event_handler(recorder.clone());
    (modem, handle, recorder)
}

/// Run `op` while the modem's receive loop polls, stopping the loop after.
pub async fn with_poll<F: Future>(modem: &MockModem, op: F) -> F::Output {
    let cancel = CancellationToken::new();
    let (out, ()) = tokio::join!(
        async {
            let out = op.await;
            cancel.cancel();
            out
        },
        modem.run(cancel.clone()),
    );
    out
}

/// The usual modem answer: command echo, blank line, `OK`.
pub fn echo_ok(command: &[u8]) -> Vec<Vec<u8>> {
    vec![[command, b"\r\n\r\n".as_slice()].concat(), b"OK\r\n".to_vec()]
}

pub fn id(n: u8) -> ConnectionId {
    ConnectionId::new(n).unwrap()
}

/// Records every TCP callback as a line of text.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl TcpEventHandler for Recorder {
    fn on_connection_opened(&self, id: ConnectionId) {
        self.calls.lock().unwrap().push(format!("open {id}"));
    }

    fn on_connection_closed(&self, id: ConnectionId) {
        self.calls.lock().unwrap().push(format!("close {id}"));
    }

    fn on_connection_data(&self, id: ConnectionId, payload: Bytes) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("data {id} {}", String::from_utf8_lossy(&payload)));
    }
}
