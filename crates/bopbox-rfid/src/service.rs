//! NFC tag detection service.
//!
//! Polls the PN532 for a card every `poll_interval` and reports changes:
//! one [`NfcEvent::TagDetected`] when a new card enters the field and one
//! [`NfcEvent::TagRemoved`] when it leaves. A card resting on the reader
//! produces no further events.

use crate::error::{Pn532Error, Result};
use crate::pn532::{Pn532, Retries};
use bopbox_core::{SamMode, Uid};
use bopbox_hardware::SerialLink;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// NFC service settings.
#[derive(Debug, Clone)]
pub struct NfcConfig {
    /// Pause between two passive target polls.
    pub poll_interval: Duration,
    /// Deadline of each PN532 command.
    pub command_timeout: Duration,
    pub sam_mode: SamMode,
    pub retries: Retries,
    pub event_capacity: usize,
}

impl Default for NfcConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            command_timeout: Duration::from_secs(5),
            sam_mode: SamMode::Normal,
            retries: Retries::default(),
            event_capacity: 16,
        }
    }
}

/// Tag presence changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NfcEvent {
    TagDetected { uid: Uid, detected_at: DateTime<Utc> },
    TagRemoved { uid: Uid },
}

/// Owns the PN532 and publishes [`NfcEvent`]s.
pub struct NfcService<L> {
    reader: Pn532<L>,
    config: NfcConfig,
    events: mpsc::Sender<NfcEvent>,
}

impl<L: SerialLink> NfcService<L> {
    /// Create the service and the receiving end of its event channel.
    pub fn new(link: L, config: NfcConfig) -> (Self, mpsc::Receiver<NfcEvent>) {
        let (events, rx) = mpsc::channel(config.event_capacity.max(1));
        let reader = Pn532::new(link).with_timeout(config.command_timeout);

        (
            Self {
                reader,
                config,
                events,
            },
            rx,
        )
    }

    pub fn reader(&self) -> &Pn532<L> {
        &self.reader
    }

    /// Wake the chip and configure it for card polling.
    ///
    /// Needs the receive loop ([`run`](Self::run)) or another poller to be
    /// running.
    pub async fn startup(&self) -> Result<()> {
        info!("NFC startup");

        self.reader.wake_up().await?;
        if !self.reader.sam_config(self.config.sam_mode).await? {
            warn!("PN532 rejected SAM configuration");
        }
        if !self.reader.set_retries(self.config.retries).await? {
            warn!("PN532 rejected retry configuration");
        }
        match self.reader.get_firmware_version().await? {
            Some(version) => info!(%version, "PN532 ready"),
            None => warn!("PN532 did not report its firmware version"),
        }

        Ok(())
    }

    /// Receive loop plus startup and detection, until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("NFC service started");
        tokio::join!(
            self.reader.run(cancel.clone()),
            self.startup_and_detect(cancel.clone())
        );
        info!("NFC service stopped");
    }

    /// Cancel anything still waiting on the PN532.
    pub fn shutdown(&self) {
        self.reader.close();
    }

    /// Retry startup every `poll_interval` until the chip takes it, then
    /// poll for tags.
    async fn startup_and_detect(&self, cancel: CancellationToken) {
        loop {
            let started = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.startup() => result,
            };
            match started {
                Ok(()) => break,
                Err(Pn532Error::Cancelled) => return,
                Err(e) => {
                    let retry_in_ms = self.config.poll_interval.as_millis() as u64;
                    warn!(error = %e, retry_in_ms, "NFC startup failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        self.detect_loop(cancel).await;
    }

    async fn detect_loop(&self, cancel: CancellationToken) {
        let mut current: Option<Uid> = None;

        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.reader.get_passive_target() => polled,
            };

            match polled {
                Ok(Some(uid)) => {
                    if current.as_ref() != Some(&uid) {
                        if let Some(previous) = current.replace(uid.clone()) {
                            self.publish(NfcEvent::TagRemoved { uid: previous }).await;
                        }
                        info!(%uid, "Tag detected");
                        self.publish(NfcEvent::TagDetected {
                            uid,
                            detected_at: Utc::now(),
                        })
                        .await;
                    }
                }
                Ok(None) => {
                    if let Some(previous) = current.take() {
                        info!(uid = %previous, "Tag removed");
                        self.publish(NfcEvent::TagRemoved { uid: previous }).await;
                    }
                }
                Err(Pn532Error::Cancelled) => break,
                Err(e) => {
                    warn!(error = %e, "Tag poll failed");
                    if let Some(previous) = current.take() {
                        self.publish(NfcEvent::TagRemoved { uid: previous }).await;
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn publish(&self, event: NfcEvent) {
        if self.events.send(event).await.is_err() {
            debug!("NFC event receiver dropped");
        }
    }
}
