//! Wires the peripherals together and supervises their tasks.

use crate::config::Config;
use anyhow::{Context, Result};
use bopbox_core::Uid;
use bopbox_hardware::{SerialLink, SerialPortLink};
use bopbox_network::{HttpHandler, HttpRequest, HttpResponse, NetworkService};
use bopbox_rfid::{NfcEvent, NfcService};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Most recent tag seen by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub uid: Uid,
    pub detected_at: DateTime<Utc>,
    /// Still in the field.
    pub present: bool,
}

/// State shared between the NFC event consumer and the HTTP router.
#[derive(Debug, Default)]
pub struct DeviceState {
    last_tag: Mutex<Option<TagRecord>>,
}

impl DeviceState {
    pub fn last_tag(&self) -> Option<TagRecord> {
        lock(&self.last_tag).clone()
    }

    pub fn apply(&self, event: NfcEvent) {
        let mut last = lock(&self.last_tag);
        match event {
            NfcEvent::TagDetected { uid, detected_at } => {
                *last = Some(TagRecord {
                    uid,
                    detected_at,
                    present: true,
                });
            }
            NfcEvent::TagRemoved { uid } => {
                if let Some(record) = last.as_mut().filter(|record| record.uid == uid) {
                    record.present = false;
                }
            }
        }
    }
}

/// `GET /` status text, `GET /tag` last UID, 404 for everything else.
pub fn router(state: Arc<DeviceState>) -> Arc<dyn HttpHandler> {
    Arc::new(move |request: &HttpRequest| -> HttpResponse {
        if request.method != "GET" {
            return HttpResponse::not_found();
        }

        match request.path.as_str() {
            "/" => {
                let tag = match state.last_tag() {
                    Some(record) if record.present => format!("present ({})", record.uid),
                    Some(record) => format!("removed ({})", record.uid),
                    None => "none".to_string(),
                };
                HttpResponse::text(format!(
                    "bopbox {}\ntag: {tag}\n",
                    env!("CARGO_PKG_VERSION")
                ))
            }
            "/tag" => match state.last_tag() {
                Some(record) => HttpResponse::text(format!(
                    "{}\n{}\n",
                    record.uid,
                    record.detected_at.to_rfc3339()
                )),
                None => HttpResponse::not_found(),
            },
            _ => HttpResponse::not_found(),
        }
    })
}

/// Copy NFC events into `state` until the channel closes or `cancel` fires.
pub async fn track_tags(
    mut events: mpsc::Receiver<NfcEvent>,
    state: Arc<DeviceState>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else { break };

        debug!(?event, "NFC event");
        state.apply(event);
    }
}

/// Join the access point and start the HTTP server while the receive loop
/// runs. Setup stops at the first refused step.
pub async fn run_network<L: SerialLink>(
    service: Arc<NetworkService<L>>,
    config: Config,
    cancel: CancellationToken,
) -> Result<()> {
    let setup = async {
        if let Some(ssid) = config.wifi.ssid.as_deref() {
            let password = config.wifi.password.as_deref().unwrap_or_default();
            if !service.connect(ssid, password).await? {
                return Ok(());
            }
        } else {
            warn!("No WiFi SSID configured, relying on the modem's stored network");
        }

        if config.http_server.enabled && !service.start_http_server(config.http_server.port).await? {
            warn!(port = config.http_server.port, "HTTP server did not start");
        }
        Ok::<_, bopbox_network::AtError>(())
    };

    let ((), setup) = tokio::join!(service.run(cancel.clone()), async {
        tokio::select! {
            _ = cancel.cancelled() => Ok(()),
            result = setup => result,
        }
    });

    setup.context("network setup failed")
}

/// Open the configured peripherals, run until Ctrl-C, then shut down.
pub async fn run(config: Config) -> Result<()> {
    let state = Arc::new(DeviceState::default());
    let cancel = CancellationToken::new();
    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    let network = if config.wifi.ssid.is_some() || config.http_server.enabled {
        let port = &config.serial.modem;
        let link = SerialPortLink::open(&port.path, port.baud_rate)
            .with_context(|| format!("failed to open modem port {}", port.path))?;
        let service = Arc::new(NetworkService::new(
            link,
            config.network(),
            router(Arc::clone(&state)),
        ));

        tasks.spawn(run_network(
            Arc::clone(&service),
            config.clone(),
            cancel.child_token(),
        ));
        Some(service)
    } else {
        info!("Network disabled");
        None
    };

    let nfc = if config.nfc.enabled {
        let port = &config.serial.nfc;
        let link = SerialPortLink::open(&port.path, port.baud_rate)
            .with_context(|| format!("failed to open NFC port {}", port.path))?;
        let (service, events) = NfcService::new(link, config.nfc());
        let service = Arc::new(service);

        {
            let service = Arc::clone(&service);
            let cancel = cancel.child_token();
            tasks.spawn(async move {
                service.run(cancel).await;
                Ok(())
            });
        }
        {
            let state = Arc::clone(&state);
            let cancel = cancel.child_token();
            tasks.spawn(async move {
                track_tags(events, state, cancel).await;
                Ok(())
            });
        }
        Some(service)
    } else {
        info!("NFC disabled");
        None
    };

    info!("bopbox running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("Shutting down");
    cancel.cancel();
    supervise(&mut tasks).await;

    if let Some(service) = network {
        service.shutdown().await;
    }
    if let Some(service) = nfc {
        service.shutdown();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for every task, logging the ones that did not end cleanly.
async fn supervise(tasks: &mut JoinSet<Result<()>>) {
    let mut failures = 0;

    while let Some(result) = tasks.join_next().await {
        match classify(result) {
            TaskTermination::Success | TaskTermination::Cancelled => {}
            TaskTermination::Error(e) => {
                failures += 1;
                error!(error = %format!("{e:#}"), "Task failed");
            }
            TaskTermination::Panic => {
                failures += 1;
                error!("Task panicked");
            }
        }
    }

    if failures > 0 {
        warn!(failures, "Tasks ended abnormally");
    }
}

fn classify(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> TaskTermination {
    match result {
        Ok(Ok(())) => TaskTermination::Success,
        Ok(Err(e)) => TaskTermination::Error(e),
        Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
        Err(_) => TaskTermination::Panic,
    }
}

#[derive(Debug)]
enum TaskTermination {
    Success,
    Error(anyhow::Error),
    /// Aborted, expected during shutdown.
    Cancelled,
    Panic,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
