//! WiFi network service: joins the access point and serves HTTP.
//!
//! ```text
//! ┌───────────┐  +IPD   ┌──────────────┐  (id, request)   ┌───────────┐
//! │ poll task │────────>│ RequestQueue │───── mpsc ──────>│ responder │
//! └───────────┘         └──────────────┘                  └─────┬─────┘
//!       ^                                                       │ CIPSEND
//!       │                          modem                        │ CIPCLOSE
//!       └───────────────────────────────────────────────────────┘
//! ```
//!
//! The queue side runs inside the receive poll and never blocks: a full
//! queue or a second request on a busy connection is dropped.

use crate::error::Result;
use crate::esp01s::Esp01s;
use crate::http::{HttpHandler, HttpRequest};
use crate::tracker::TcpEventHandler;
use bopbox_core::{
    ConnectionId, ConnectionSet, IpdMessageMode, MultiplexingMode, WifiMode,
    constants::{AT_DEFAULT_TIMEOUT, AT_MAX_SEND_LEN},
};
use bopbox_hardware::SerialLink;
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Network service settings.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Timeout for every AT command except the access point join.
    pub command_timeout: Duration,
    /// Mode set before joining.
    pub wifi_mode: WifiMode,
    /// Parsed requests waiting for the responder.
    pub request_queue_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            command_timeout: AT_DEFAULT_TIMEOUT,
            wifi_mode: WifiMode::Station,
            request_queue_capacity: 8,
        }
    }
}

type QueuedRequest = (ConnectionId, HttpRequest);

/// TCP event handler that turns `+IPD` payloads into queued requests.
struct RequestQueue {
    tx: mpsc::Sender<QueuedRequest>,
    in_flight: Arc<Mutex<ConnectionSet>>,
}

impl TcpEventHandler for RequestQueue {
    fn on_connection_opened(&self, id: ConnectionId) {
        debug!(%id, "HTTP client connected");
    }

    fn on_connection_closed(&self, id: ConnectionId) {
        debug!(%id, "HTTP client disconnected");
    }

    fn on_connection_data(&self, id: ConnectionId, payload: Bytes) {
        let Some(request) = HttpRequest::parse(&payload) else {
            debug!(%id, bytes = payload.len(), "Ignoring non-HTTP payload");
            return;
        };

        if !lock(&self.in_flight).insert(id) {
            debug!(%id, "Request already in flight, dropping");
            return;
        }

        debug!(%id, method = %request.method, path = %request.path, "HTTP request queued");
        if let Err(e) = self.tx.try_send((id, request)) {
            warn!(%id, error = %e, "Request queue unavailable, dropping");
            lock(&self.in_flight).remove(id);
        }
    }
}

/// Owns the modem and the HTTP responder.
pub struct NetworkService<L> {
    modem: Esp01s<L>,
    router: Arc<dyn HttpHandler>,
    requests: tokio::sync::Mutex<mpsc::Receiver<QueuedRequest>>,
    in_flight: Arc<Mutex<ConnectionSet>>,
    wifi_mode: WifiMode,
}

impl<L: SerialLink> NetworkService<L> {
    pub fn new(link: L, config: NetworkConfig, router: Arc<dyn HttpHandler>) -> Self {
        let (tx, rx) = mpsc::channel(config.request_queue_capacity.max(1));
        let in_flight = Arc::new(Mutex::new(ConnectionSet::new()));

        let queue = Arc::new(RequestQueue {
            tx,
            in_flight: Arc::clone(&in_flight),
        });
        let modem = Esp01s::new(link)
            .with_event_handler(queue)
            .with_command_timeout(config.command_timeout);

        Self {
            modem,
            router,
            requests: tokio::sync::Mutex::new(rx),
            in_flight,
            wifi_mode: config.wifi_mode,
        }
    }

    pub fn modem(&self) -> &Esp01s<L> {
        &self.modem
    }

    /// Check the modem, set the configured WiFi mode and join `ssid`.
    ///
    /// Stops at the first step the modem refuses and returns `false`.
    pub async fn connect(&self, ssid: &str, password: &str) -> Result<bool> {
        let mode = self.wifi_mode;
        if !self.modem.test().await? {
            error!("Modem did not answer AT");
            return Ok(false);
        }
        if !self.modem.set_wifi_mode(mode).await? {
            error!(?mode, "Modem refused WiFi mode");
            return Ok(false);
        }
        if !self.modem.connect_access_point(ssid, password).await? {
            error!(ssid, "Could not join access point");
            return Ok(false);
        }
        Ok(true)
    }

    /// Enable multiplexing and listen on `port`.
    pub async fn start_http_server(&self, port: u16) -> Result<bool> {
        if !self
            .modem
            .set_ipd_message_mode(IpdMessageMode::Short)
            .await?
        {
            warn!("Modem refused +IPD mode");
        }
        if !self
            .modem
            .set_connection_multiplexing(MultiplexingMode::Multiple)
            .await?
        {
            error!("Modem refused connection multiplexing");
            return Ok(false);
        }
        if !self.modem.start_tcp_server(port).await? {
            error!(port, "Modem refused to start TCP server");
            return Ok(false);
        }

        info!(port, "HTTP server listening");
        Ok(true)
    }

    /// Drive the receive poll and the responder until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Network service started");
        tokio::join!(
            self.modem.run(cancel.clone()),
            self.respond_loop(cancel.clone())
        );
        info!("Network service stopped");
    }

    /// Stop the server and leave the access point, then cancel anything
    /// still waiting on the modem.
    ///
    /// Runs its own receive poll, so it works after [`run`](Self::run)
    /// has returned.
    pub async fn shutdown(&self) {
        let poll = CancellationToken::new();

        let steps = async {
            match self.modem.stop_tcp_server().await {
                Ok(true) => debug!("TCP server stopped"),
                Ok(false) => warn!("Modem refused to stop TCP server"),
                Err(e) => warn!(error = %e, "Stopping TCP server failed"),
            }
            match self.modem.disconnect_access_point().await {
                Ok(true) => debug!("Left access point"),
                Ok(false) => warn!("Modem refused to leave access point"),
                Err(e) => warn!(error = %e, "Leaving access point failed"),
            }
            poll.cancel();
        };
        tokio::join!(steps, self.modem.run(poll.clone()));

        self.modem.close();
    }

    async fn respond_loop(&self, cancel: CancellationToken) {
        let mut requests = self.requests.lock().await;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = requests.recv() => next,
            };
            let Some((id, request)) = next else { break };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.respond(id, &request) => {}
            }
            lock(&self.in_flight).remove(id);
        }
    }

    async fn respond(&self, id: ConnectionId, request: &HttpRequest) {
        let response = self.router.handle(request);
        info!(%id, method = %request.method, path = %request.path, status = response.status, "HTTP request");

        let bytes = response.to_bytes();
        for chunk in bytes.chunks(AT_MAX_SEND_LEN) {
            match self.modem.send_tcp_data(id, chunk).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(%id, "Modem refused response data");
                    break;
                }
                Err(e) => {
                    warn!(%id, error = %e, "Sending response failed");
                    break;
                }
            }
        }

        match self.modem.close_tcp_connection(id).await {
            Ok(true) => {}
            Ok(false) => debug!(%id, "Connection already closed"),
            Err(e) => warn!(%id, error = %e, "Closing connection failed"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
