//! Scripted serial link for driver tests.
//!
//! [`MockSerialLink`] is handed to the driver under test, while the paired
//! [`MockSerialHandle`] stays with the test to feed inbound chunks, inspect
//! what the driver wrote, and script replies that appear only after a
//! matching write. The latter matters for command engines that discard
//! anything received before their command goes out.

use crate::{HardwareError, Result, traits::SerialLink};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Mock serial link for testing and development.
///
/// Each inbound chunk pushed through the handle is returned by exactly one
/// [`read_available`](SerialLink::read_available) call, so tests control
/// chunk boundaries precisely.
///
/// # Examples
///
/// ```
/// use bopbox_hardware::SerialLink;
/// use bopbox_hardware::mock::MockSerialLink;
///
/// let (mut link, handle) = MockSerialLink::new();
///
/// // Reply to the test command once it has been written
/// handle.reply_to(b"AT\r\n", vec![b"AT\r\n".to_vec(), b"OK\r\n".to_vec()]);
///
/// link.write(b"AT\r\n").unwrap();
/// assert_eq!(link.read_available().unwrap(), b"AT\r\n".to_vec());
/// assert_eq!(link.read_available().unwrap(), b"OK\r\n".to_vec());
/// assert!(link.read_available().unwrap().is_empty());
/// ```
#[derive(Debug)]
pub struct MockSerialLink {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialLink {
    /// Create a new mock link and the handle controlling it.
    pub fn new() -> (Self, MockSerialHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));

        let link = Self {
            state: Arc::clone(&state),
        };
        let handle = MockSerialHandle { state };

        (link, handle)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }
}

impl SerialLink for MockSerialLink {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.state();
        if state.disconnected {
            return Err(HardwareError::disconnected("mock serial link"));
        }

        let accepted = match state.write_limit {
            Some(limit) => data.len().min(limit),
            None => data.len(),
        };
        let written = data[..accepted].to_vec();

        // Scripted replies fire on the bytes that actually went out
        if let Some(pos) = state
            .replies
            .iter()
            .position(|reply| written.starts_with(&reply.trigger))
        {
            let chunks = if state.replies[pos].once {
                state.replies.remove(pos).chunks
            } else {
                state.replies[pos].chunks.clone()
            };
            state.rx.extend(chunks);
        }

        state.written.push(written);
        Ok(accepted)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let state = self.state();
        if state.disconnected {
            return Err(HardwareError::disconnected("mock serial link"));
        }
        Ok(state.rx.iter().map(Vec::len).sum())
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        let mut state = self.state();
        if state.disconnected {
            return Err(HardwareError::disconnected("mock serial link"));
        }
        Ok(state.rx.pop_front().unwrap_or_default())
    }
}

/// Handle for controlling a mock serial link.
///
/// Cloning the handle shares the same underlying link state.
#[derive(Debug, Clone)]
pub struct MockSerialHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialHandle {
    /// Queue one inbound chunk.
    pub fn push_rx(&self, chunk: &[u8]) {
        lock(&self.state).rx.push_back(chunk.to_vec());
    }

    /// Queue every byte as its own chunk.
    pub fn push_rx_bytewise(&self, bytes: &[u8]) {
        let mut state = lock(&self.state);
        for &b in bytes {
            state.rx.push_back(vec![b]);
        }
    }

    /// Queue `chunks` every time a write starts with `trigger`.
    pub fn reply_to(&self, trigger: &[u8], chunks: Vec<Vec<u8>>) {
        self.add_reply(trigger, chunks, false);
    }

    /// Queue `chunks` the first time a write starts with `trigger`.
    pub fn reply_once(&self, trigger: &[u8], chunks: Vec<Vec<u8>>) {
        self.add_reply(trigger, chunks, true);
    }

    fn add_reply(&self, trigger: &[u8], chunks: Vec<Vec<u8>>, once: bool) {
        lock(&self.state).replies.push(ScriptedReply {
            trigger: trigger.to_vec(),
            chunks,
            once,
        });
    }

    /// Cap the number of bytes each write accepts, simulating a full
    /// transmit buffer. `None` removes the cap.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        lock(&self.state).write_limit = limit;
    }

    /// Make every subsequent operation fail as if the port vanished.
    pub fn disconnect(&self) {
        lock(&self.state).disconnected = true;
    }

    /// Every write the driver made, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        lock(&self.state).written.clone()
    }

    /// Writes that start with `prefix`.
    pub fn written_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        lock(&self.state)
            .written
            .iter()
            .filter(|w| w.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Number of inbound chunks not yet read by the driver.
    pub fn pending_rx(&self) -> usize {
        lock(&self.state).rx.len()
    }
}

#[derive(Debug, Default)]
struct MockState {
    rx: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    replies: Vec<ScriptedReply>,
    write_limit: Option<usize>,
    disconnected: bool,
}

#[derive(Debug, Clone)]
struct ScriptedReply {
    trigger: Vec<u8>,
    chunks: Vec<Vec<u8>>,
    once: bool,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_serial_chunks_preserved() {
        let (mut link, handle) = MockSerialLink::new();

        handle.push_rx(b"0,CON");
        handle.push_rx(b"NECT\r\n");

        assert_eq!(link.bytes_available().unwrap(), 11);
        assert_eq!(link.read_available().unwrap(), b"0,CON".to_vec());
        assert_eq!(link.read_available().unwrap(), b"NECT\r\n".to_vec());
        assert_eq!(link.bytes_available().unwrap(), 0);
        assert!(link.read_available().unwrap().is_empty());
    }

    #[test]
    fn test_mock_serial_bytewise() {
        let (mut link, handle) = MockSerialLink::new();

        handle.push_rx_bytewise(&[0x00, 0x00, 0xFF]);
        assert_eq!(handle.pending_rx(), 3);

        assert_eq!(link.read_available().unwrap(), vec![0x00]);
        assert_eq!(handle.pending_rx(), 2);
    }

    #[test]
    fn test_mock_serial_reply_to_repeats() {
        let (mut link, handle) = MockSerialLink::new();
        handle.reply_to(b"AT", vec![b"OK\r\n".to_vec()]);

        link.write(b"AT\r\n").unwrap();
        link.write(b"AT\r\n").unwrap();
        assert_eq!(handle.pending_rx(), 2);
    }

    #[test]
    fn test_mock_serial_reply_once() {
        let (mut link, handle) = MockSerialLink::new();
        handle.reply_once(b"AT", vec![b"OK\r\n".to_vec()]);

        link.write(b"AT\r\n").unwrap();
        link.write(b"AT\r\n").unwrap();
        assert_eq!(handle.pending_rx(), 1);
    }

    #[test]
    fn test_mock_serial_no_reply_before_write() {
        let (mut link, handle) = MockSerialLink::new();
        handle.reply_to(b"AT+CWQAP", vec![b"OK\r\n".to_vec()]);

        assert!(link.read_available().unwrap().is_empty());
        link.write(b"AT\r\n").unwrap();
        assert!(link.read_available().unwrap().is_empty());
    }

    #[test]
    fn test_mock_serial_write_limit() {
        let (mut link, handle) = MockSerialLink::new();
        handle.set_write_limit(Some(2));

        assert_eq!(link.write(b"AT\r\n").unwrap(), 2);
        assert_eq!(handle.written(), vec![b"AT".to_vec()]);

        handle.set_write_limit(None);
        assert_eq!(link.write(b"AT\r\n").unwrap(), 4);
    }

    #[test]
    fn test_mock_serial_disconnect() {
        let (mut link, handle) = MockSerialLink::new();
        handle.disconnect();

        assert!(matches!(
            link.write(b"AT\r\n"),
            Err(HardwareError::Disconnected { .. })
        ));
        assert!(link.read_available().is_err());
    }

    #[test]
    fn test_mock_serial_written_with_prefix() {
        let (mut link, handle) = MockSerialLink::new();

        link.write(&[0x55, 0x55, 0x00]).unwrap();
        link.write(&[0x00, 0x00, 0xFF, 0x02]).unwrap();

        assert_eq!(handle.written_with_prefix(&[0x00, 0x00, 0xFF]).len(), 1);
    }
}
