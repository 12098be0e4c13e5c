//! AT command engine.
//!
//! One command is in flight per modem. [`AtEngine::send_command`] takes the
//! command lock, arms a pending response, writes the command line and then
//! sleeps until the receive poll sees a terminal marker or the deadline
//! passes. The receive poll runs in its own task ([`AtEngine::run`]) and is
//! the only reader of the link.
//!
//! ```text
//!   caller                    engine                       poll task
//!     │ send_command(AT+CWQAP)  │                               │
//!     │────────────────────────>│ lock, arm(+CWQAP)             │
//!     │                         │ write "AT+CWQAP\r\n" ─────> modem
//!     │                         │                               │ "+CWQAP..."  append
//!     │                         │                               │ "OK\r\n"     append, complete
//!     │<────────────────────────│ take buffer, unlock  <────────│
//! ```
//!
//! Chunks that carry neither the response prefix nor a terminal marker are
//! not added to the response. Every chunk, in flight or not, also goes to
//! the [`TcpTracker`].

use crate::error::{AtError, Result};
use crate::tracker::{TcpEventHandler, TcpTracker};
use bopbox_core::{
    ConnectionSet,
    constants::{AT_DEFAULT_TIMEOUT, AT_LINE_END, AT_SEND_PROMPT, RECEIVE_POLL_INTERVAL},
};
use bopbox_hardware::SerialLink;
use bopbox_protocol::{Terminator, find_subslice, response_prefix};
use bytes::{Bytes, BytesMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const INITIAL_RESPONSE_CAPACITY: usize = 256;

/// What ends the pending exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// `OK`, `ERROR` or `FAIL`.
    Terminator,
    /// The `>` data prompt, or `ERROR` / `FAIL`.
    Prompt,
}

/// How a pending exchange completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    Terminator(Terminator),
    Prompt,
}

/// Response being collected for the in-flight command.
#[derive(Debug)]
struct PendingResponse {
    prefix: Vec<u8>,
    expect: Expect,
    buffer: BytesMut,
    /// Last bytes seen, so a marker split across reads is still found.
    tail: Vec<u8>,
    /// How many trailing bytes of `tail` were not appended to `buffer`.
    tail_unbuffered: usize,
    overlap: usize,
    done: Option<oneshot::Sender<Completion>>,
}

impl PendingResponse {
    fn new(prefix: Vec<u8>, expect: Expect, done: oneshot::Sender<Completion>) -> Self {
        let overlap = Terminator::OVERLAP.max(prefix.len().saturating_sub(1));
        Self {
            prefix,
            expect,
            buffer: BytesMut::with_capacity(INITIAL_RESPONSE_CAPACITY),
            tail: Vec::with_capacity(overlap),
            tail_unbuffered: 0,
            overlap,
            done: Some(done),
        }
    }

    fn accept(&mut self, chunk: &[u8]) {
        if self.done.is_none() {
            return;
        }

        let seen = self.tail.len();
        let mut window = Vec::with_capacity(seen + chunk.len());
        window.extend_from_slice(&self.tail);
        window.extend_from_slice(chunk);

        let completion = self.completion(&window, seen);
        let first_match = [
            completion.map(|(pos, _)| pos),
            find_new(&window, &self.prefix, seen),
        ]
        .into_iter()
        .flatten()
        .min();

        let unbuffered = match first_match {
            Some(pos) => {
                // Pull in the part of a split marker that arrived last read
                let from = pos.max(seen - self.tail_unbuffered).min(seen);
                self.buffer.extend_from_slice(&window[from..]);
                0
            }
            None => self.tail_unbuffered + chunk.len(),
        };

        let keep = window.len().min(self.overlap);
        self.tail = window[window.len() - keep..].to_vec();
        self.tail_unbuffered = unbuffered.min(keep);

        if let (Some((_, completion)), Some(done)) = (completion, self.done.take()) {
            // The waiter may already have given up
            let _ = done.send(completion);
        }
    }

    /// Earliest marker that ends the exchange and was not fully seen before.
    fn completion(&self, window: &[u8], seen: usize) -> Option<(usize, Completion)> {
        let terminators = Terminator::ALL.into_iter().filter(|t| match self.expect {
            Expect::Terminator => true,
            Expect::Prompt => !t.is_success(),
        });

        let mut found: Vec<(usize, Completion)> = terminators
            .filter_map(|t| {
                find_new(window, t.marker(), seen).map(|pos| (pos, Completion::Terminator(t)))
            })
            .collect();
        if self.expect == Expect::Prompt {
            let prompt = find_new(window, AT_SEND_PROMPT, seen);
            found.extend(prompt.map(|pos| (pos, Completion::Prompt)));
        }

        found.into_iter().min_by_key(|&(pos, _)| pos)
    }
}

/// Position of `needle` in `window`, ignoring matches that lie entirely
/// within the first `seen` bytes.
fn find_new(window: &[u8], needle: &[u8], seen: usize) -> Option<usize> {
    let start = (seen + 1).saturating_sub(needle.len()).min(window.len());
    find_subslice(&window[start..], needle).map(|pos| pos + start)
}

/// Clears the pending response when the waiting future completes or is
/// dropped.
struct PendingGuard<'a>(&'a Mutex<Option<PendingResponse>>);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.0).take();
    }
}

/// Exclusive command/response engine over one modem link.
///
/// Shared between the poll task and command issuers behind an `Arc`; every
/// method takes `&self`.
pub struct AtEngine<L> {
    link: Mutex<L>,
    command_lock: tokio::sync::Mutex<()>,
    pending: Mutex<Option<PendingResponse>>,
    tracker: Mutex<TcpTracker>,
    handler: Option<Arc<dyn TcpEventHandler>>,
    cancel: CancellationToken,
    default_timeout: Duration,
}

impl<L: SerialLink> AtEngine<L> {
    pub fn new(link: L) -> Self {
        Self {
            link: Mutex::new(link),
            command_lock: tokio::sync::Mutex::new(()),
            pending: Mutex::new(None),
            tracker: Mutex::new(TcpTracker::new()),
            handler: None,
            cancel: CancellationToken::new(),
            default_timeout: AT_DEFAULT_TIMEOUT,
        }
    }

    /// Receive TCP server events from the poll.
    pub fn with_event_handler(mut self, handler: Arc<dyn TcpEventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Connections the tracker currently believes open.
    pub fn open_connections(&self) -> ConnectionSet {
        lock(&self.tracker).open_connections()
    }

    /// Forget all tracked connections.
    pub fn reset_connections(&self) {
        lock(&self.tracker).reset();
    }

    /// Send `command` and return every response chunk up to and including
    /// the terminal marker.
    ///
    /// `\r\n` is appended to the command. Callers queue on the command lock
    /// while another command is in flight.
    ///
    /// # Errors
    ///
    /// - `AtError::Timeout` if no terminal marker arrives within `timeout`
    /// - `AtError::WriteFailed` if the link took only part of the line
    /// - `AtError::Cancelled` if the engine is closed meanwhile
    pub async fn send_command(&self, command: &[u8], timeout: Duration) -> Result<Bytes> {
        let _permit = self.acquire().await?;
        let deadline = Instant::now() + timeout;

        let prefix = response_prefix(command);
        let (_, response) = self
            .exchange(&command_line(command), prefix, Expect::Terminator, deadline, timeout)
            .await?;
        Ok(response)
    }

    /// Two-phase data send: `command` must make the modem print its `>`
    /// prompt, after which `payload` is written raw.
    ///
    /// Returns `None` if the modem refused the command with `ERROR` or
    /// `FAIL`, otherwise the response to the payload. Both phases share one
    /// deadline.
    pub async fn send_with_payload(
        &self,
        command: &[u8],
        payload: &[u8],
        response_marker: &[u8],
        timeout: Duration,
    ) -> Result<Option<Bytes>> {
        let _permit = self.acquire().await?;
        let deadline = Instant::now() + timeout;

        let prefix = response_prefix(command);
        let (completion, _) = self
            .exchange(&command_line(command), prefix, Expect::Prompt, deadline, timeout)
            .await?;
        if completion != Completion::Prompt {
            debug!(?completion, "Data prompt refused");
            return Ok(None);
        }

        let (_, response) = self
            .exchange(
                payload,
                response_marker.to_vec(),
                Expect::Terminator,
                deadline,
                timeout,
            )
            .await?;
        Ok(Some(response))
    }

    /// Read whatever the link has buffered and route it.
    ///
    /// Returns the number of bytes read.
    pub fn poll(&self) -> Result<usize> {
        let chunk = lock(&self.link).read_available()?;
        if chunk.is_empty() {
            return Ok(0);
        }
        trace!(bytes = chunk.len(), "Modem chunk received");

        let events = lock(&self.tracker).process(&chunk);
        if let Some(handler) = &self.handler {
            for event in events {
                event.dispatch(handler.as_ref());
            }
        }

        if let Some(pending) = lock(&self.pending).as_mut() {
            pending.accept(&chunk);
        }

        Ok(chunk.len())
    }

    /// Poll the link until `cancel` fires.
    ///
    /// Link errors are logged and polling continues after the usual idle
    /// interval.
    pub async fn run(&self, cancel: CancellationToken) {
        debug!("AT receive loop started");

        loop {
            let idle = match self.poll() {
                Ok(0) => true,
                Ok(_) => false,
                Err(e) => {
                    warn!(error = %e, "Modem poll failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RECEIVE_POLL_INTERVAL) => {}
                }
            } else if cancel.is_cancelled() {
                break;
            } else {
                tokio::task::yield_now().await;
            }
        }

        debug!("AT receive loop stopped");
    }

    /// Fail every queued and in-flight command with `AtError::Cancelled`.
    ///
    /// The engine stays closed.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn acquire(&self) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        if self.cancel.is_cancelled() {
            return Err(AtError::Cancelled);
        }
        tokio::select! {
            permit = self.command_lock.lock() => Ok(permit),
            _ = self.cancel.cancelled() => Err(AtError::Cancelled),
        }
    }

    async fn exchange(
        &self,
        bytes: &[u8],
        prefix: Vec<u8>,
        expect: Expect,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<(Completion, Bytes)> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.pending) = Some(PendingResponse::new(prefix, expect, tx));
        let _guard = PendingGuard(&self.pending);

        self.write_all(bytes)?;

        let completion = tokio::select! {
            _ = self.cancel.cancelled() => return Err(AtError::Cancelled),
            result = tokio::time::timeout_at(deadline, rx) => match result {
                Ok(Ok(completion)) => completion,
                Ok(Err(_)) => return Err(AtError::Cancelled),
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "AT command timed out");
                    return Err(AtError::timeout(timeout));
                }
            },
        };

        let response = lock(&self.pending)
            .take()
            .map(|pending| pending.buffer.freeze())
            .unwrap_or_default();
        trace!(?completion, bytes = response.len(), "AT exchange complete");

        Ok((completion, response))
    }

    fn write_all(&self, bytes: &[u8]) -> Result<()> {
        let written = lock(&self.link).write(bytes)?;
        if written < bytes.len() {
            warn!(expected = bytes.len(), written, "Short write to modem");
            return Err(AtError::WriteFailed {
                expected: bytes.len(),
                written,
            });
        }
        Ok(())
    }
}

fn command_line(command: &[u8]) -> Vec<u8> {
    [command, AT_LINE_END].concat()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
