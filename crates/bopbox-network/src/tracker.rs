//! TCP server notifications from the modem.
//!
//! In multi-connection server mode the ESP-01S interleaves three kinds of
//! unsolicited result codes with ordinary command responses:
//!
//! ```text
//! 0,CONNECT\r\n
//! +IPD,0,18:GET / HTTP/1.1\r\n...
//! 0,CLOSED\r\n
//! ```
//!
//! The connection id is always a single ASCII digit `0`-`4`.

use bopbox_core::{
    ConnectionId, ConnectionSet,
    constants::{URC_CLOSED, URC_CONNECT, URC_IPD},
};
use bopbox_protocol::find_subslice;
use bytes::Bytes;
use tracing::{debug, trace};

/// Receiver of TCP server events.
///
/// Called synchronously from the receive poll, so implementations must not
/// block. Every method defaults to doing nothing.
pub trait TcpEventHandler: Send + Sync {
    fn on_connection_opened(&self, _id: ConnectionId) {}

    fn on_connection_closed(&self, _id: ConnectionId) {}

    fn on_connection_data(&self, _id: ConnectionId, _payload: Bytes) {}
}

/// A state change derived from one received chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpEvent {
    Opened(ConnectionId),
    Closed(ConnectionId),
    Data { id: ConnectionId, payload: Bytes },
}

impl TcpEvent {
    /// Hand the event to the matching handler method.
    pub fn dispatch(self, handler: &dyn TcpEventHandler) {
        match self {
            TcpEvent::Opened(id) => handler.on_connection_opened(id),
            TcpEvent::Closed(id) => handler.on_connection_closed(id),
            TcpEvent::Data { id, payload } => handler.on_connection_data(id, payload),
        }
    }
}

/// Tracks which connections are open and turns URCs into [`TcpEvent`]s.
///
/// # Examples
///
/// ```
/// use bopbox_network::{TcpEvent, TcpTracker};
///
/// let mut tracker = TcpTracker::new();
///
/// let events = tracker.process(b"2,CONNECT\r\n");
/// assert!(matches!(events[0], TcpEvent::Opened(id) if id.as_u8() == 2));
///
/// let events = tracker.process(b"+IPD,2,5:hello");
/// assert!(matches!(&events[0], TcpEvent::Data { payload, .. } if &payload[..] == b"hello"));
/// ```
#[derive(Debug, Default)]
pub struct TcpTracker {
    open: ConnectionSet,
}

#[derive(Debug, Clone, Copy)]
enum Marker {
    Connect,
    Closed,
    Ipd,
}

impl TcpTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections currently believed open.
    pub fn open_connections(&self) -> ConnectionSet {
        self.open
    }

    pub fn is_open(&self, id: ConnectionId) -> bool {
        self.open.contains(id)
    }

    /// Forget every connection, e.g. after the server was stopped.
    pub fn reset(&mut self) {
        self.open.clear();
    }

    /// Scan one received chunk for URCs.
    ///
    /// Every `CONNECT` and `CLOSED` marker in the chunk is handled, plus the
    /// first `+IPD`, in the order they appear. Repeated `CONNECT` for an open
    /// id and `CLOSED` for an unknown id produce no event.
    ///
    /// An `+IPD` for a connection that was never reported open is dropped.
    /// This also drops data whose `CONNECT` was split across two reads.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<TcpEvent> {
        let mut markers = Vec::new();
        collect_markers(chunk, URC_CONNECT, Marker::Connect, &mut markers);
        collect_markers(chunk, URC_CLOSED, Marker::Closed, &mut markers);
        if let Some(pos) = find_subslice(chunk, URC_IPD) {
            markers.push((pos, Marker::Ipd));
        }
        markers.sort_by_key(|&(pos, _)| pos);

        markers
            .into_iter()
            .filter_map(|(pos, marker)| match marker {
                Marker::Connect => self.on_connect(chunk, pos),
                Marker::Closed => self.on_closed(chunk, pos),
                Marker::Ipd => self.on_ipd(chunk, pos),
            })
            .collect()
    }

    fn on_connect(&mut self, chunk: &[u8], pos: usize) -> Option<TcpEvent> {
        let id = id_before(chunk, pos)?;
        if !self.open.insert(id) {
            trace!(%id, "Duplicate CONNECT ignored");
            return None;
        }
        debug!(%id, "TCP connection opened");
        Some(TcpEvent::Opened(id))
    }

    fn on_closed(&mut self, chunk: &[u8], pos: usize) -> Option<TcpEvent> {
        let id = id_before(chunk, pos)?;
        if !self.open.remove(id) {
            trace!(%id, "CLOSED for unknown connection ignored");
            return None;
        }
        debug!(%id, "TCP connection closed");
        Some(TcpEvent::Closed(id))
    }

    fn on_ipd(&mut self, chunk: &[u8], pos: usize) -> Option<TcpEvent> {
        let after_marker = pos + URC_IPD.len();
        let id = ConnectionId::from_ascii_digit(*chunk.get(after_marker)?)?;

        if !self.open.contains(id) {
            debug!(%id, "+IPD for untracked connection dropped");
            return None;
        }

        let colon = after_marker + chunk[after_marker..].iter().position(|&b| b == b':')?;
        let payload = &chunk[colon + 1..];
        if payload.is_empty() {
            return None;
        }

        trace!(%id, bytes = payload.len(), "TCP data received");
        Some(TcpEvent::Data {
            id,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

fn collect_markers(chunk: &[u8], needle: &[u8], marker: Marker, out: &mut Vec<(usize, Marker)>) {
    let mut offset = 0;
    while let Some(pos) = find_subslice(&chunk[offset..], needle) {
        out.push((offset + pos, marker));
        offset += pos + needle.len();
    }
}

/// The single-digit id immediately before a `,CONNECT` / `,CLOSED` marker.
fn id_before(chunk: &[u8], marker_pos: usize) -> Option<ConnectionId> {
    let digit = *chunk.get(marker_pos.checked_sub(1)?)?;
    ConnectionId::from_ascii_digit(digit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn id(n: u8) -> ConnectionId {
        ConnectionId::new(n).unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
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

    #[test]
    fn test_connect_then_close() {
        let mut tracker = TcpTracker::new();

        assert_eq!(tracker.process(b"2,CONNECT\r\n"), vec![TcpEvent::Opened(id(2))]);
        assert_eq!(tracker.process(b"4,CONNECT\r\n"), vec![TcpEvent::Opened(id(4))]);
        assert_eq!(
            tracker.open_connections().iter().collect::<Vec<_>>(),
            vec![id(2), id(4)]
        );

        assert_eq!(tracker.process(b"2,CLOSED\r\n"), vec![TcpEvent::Closed(id(2))]);
        assert_eq!(
            tracker.open_connections().iter().collect::<Vec<_>>(),
            vec![id(4)]
        );
    }

    #[test]
    fn test_duplicate_connect_is_idempotent() {
        let mut tracker = TcpTracker::new();
        tracker.process(b"1,CONNECT\r\n");

        assert!(tracker.process(b"1,CONNECT\r\n").is_empty());
        assert_eq!(tracker.open_connections().len(), 1);
    }

    #[test]
    fn test_close_unknown_ignored() {
        let mut tracker = TcpTracker::new();
        assert!(tracker.process(b"3,CLOSED\r\n").is_empty());
    }

    #[test]
    fn test_ipd_untracked_dropped() {
        let mut tracker = TcpTracker::new();
        let recorder = Recorder::default();

        for event in tracker.process(b"+IPD,0,5:hello") {
            event.dispatch(&recorder);
        }
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_ipd_payload_after_first_colon() {
        let mut tracker = TcpTracker::new();
        tracker.process(b"0,CONNECT\r\n");

        let events = tracker.process(b"\r\n+IPD,0,22:GET / HTTP/1.1\r\nHost: x\r\n");
        assert_eq!(
            events,
            vec![TcpEvent::Data {
                id: id(0),
                payload: Bytes::from_static(b"GET / HTTP/1.1\r\nHost: x\r\n"),
            }]
        );
    }

    #[test]
    fn test_ipd_empty_payload_ignored() {
        let mut tracker = TcpTracker::new();
        tracker.process(b"0,CONNECT\r\n");
        assert!(tracker.process(b"+IPD,0,0:").is_empty());
    }

    #[test]
    fn test_ipd_out_of_range_id_ignored() {
        let mut tracker = TcpTracker::new();
        assert!(tracker.process(b"+IPD,7,1:x").is_empty());
        assert!(tracker.process(b"+IPD,").is_empty());
    }

    #[test]
    fn test_connect_and_data_in_one_chunk() {
        let mut tracker = TcpTracker::new();
        let recorder = Recorder::default();

        for event in tracker.process(b"0,CONNECT\r\n\r\n+IPD,0,3:abc") {
            event.dispatch(&recorder);
        }

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["open 0".to_string(), "data 0 abc".to_string()]
        );
    }

    #[test]
    fn test_multiple_markers_in_order() {
        let mut tracker = TcpTracker::new();
        tracker.process(b"1,CONNECT\r\n");

        let events = tracker.process(b"1,CLOSED\r\n3,CONNECT\r\n4,CONNECT\r\n");
        assert_eq!(
            events,
            vec![
                TcpEvent::Closed(id(1)),
                TcpEvent::Opened(id(3)),
                TcpEvent::Opened(id(4)),
            ]
        );
    }

    #[test]
    fn test_marker_at_chunk_start_has_no_id() {
        let mut tracker = TcpTracker::new();
        assert!(tracker.process(b",CONNECT\r\n").is_empty());
    }

    #[test]
    fn test_reset() {
        let mut tracker = TcpTracker::new();
        tracker.process(b"0,CONNECT\r\n1,CONNECT\r\n");
        tracker.reset();
        assert!(tracker.open_connections().is_empty());
        assert!(!tracker.is_open(id(0)));
    }
}
