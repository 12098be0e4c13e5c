//! PN532 command engine.
//!
//! A command is one round trip of three frames:
//!
//! ```text
//!   host                                   PN532
//!    │ 55 55 00 .. 00          (wake-up)     │
//!    │ 00 00 FF LEN LCS D4 CMD .. DCS 00 ──> │
//!    │ <──────────────────── 00 00 FF 00 FF 00   ACK
//!    │ <──── 00 00 FF LEN LCS D5 CMD+1 .. DCS 00 DATA
//! ```
//!
//! The receive poll ([`Pn532::run`]) feeds every byte through one
//! [`FrameParser`] and queues the complete frames; the caller holding the
//! command lock pulls them from the queue. Both waits share one deadline
//! measured from the start of the call.

use crate::error::{Pn532Error, Result};
use bopbox_core::{
    FirmwareVersion, SamMode, Uid,
    constants::{
        PN532_BRTY_ISO14443A, PN532_CMD_GET_FIRMWARE_VERSION, PN532_CMD_IN_LIST_PASSIVE_TARGET,
        PN532_CMD_RF_CONFIGURATION, PN532_CMD_SAM_CONFIGURATION, PN532_DEFAULT_TIMEOUT,
        PN532_RF_CFG_MAX_RETRIES, PN532_SAM_TIMEOUT, PN532_WAKE_UP, PN532_WAKE_UP_DELAY,
        RECEIVE_POLL_INTERVAL,
    },
};
use bopbox_hardware::SerialLink;
use bopbox_protocol::{Frame, FrameParser, build_command_frame};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Called with every frame the parser rejects.
pub type FrameErrorCallback = Arc<dyn Fn(&bopbox_core::Error) + Send + Sync>;

/// Byte offsets in the InListPassiveTarget response.
const TARGET_COUNT_OFFSET: usize = 0;
const UID_LENGTH_OFFSET: usize = 5;
const UID_OFFSET: usize = 6;

/// Retry counts for RFConfiguration item 0x05.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retries {
    /// ATR_REQ attempts.
    pub atr: u8,
    /// PSL_REQ attempts.
    pub psl: u8,
    /// Passive activation attempts, 0xFF retries forever.
    pub passive: u8,
}

impl Default for Retries {
    fn default() -> Self {
        Self {
            atr: 0xFF,
            psl: 0x01,
            passive: 0x01,
        }
    }
}

/// PN532 NFC controller on a serial link.
pub struct Pn532<L> {
    link: Mutex<L>,
    command_lock: tokio::sync::Mutex<()>,
    parser: Mutex<FrameParser>,
    frames: Mutex<VecDeque<Frame>>,
    frame_ready: Notify,
    on_frame_error: Option<FrameErrorCallback>,
    cancel: CancellationToken,
    timeout: Duration,
}

impl<L: SerialLink> Pn532<L> {
    pub fn new(link: L) -> Self {
        Self {
            link: Mutex::new(link),
            command_lock: tokio::sync::Mutex::new(()),
            parser: Mutex::new(FrameParser::new()),
            frames: Mutex::new(VecDeque::new()),
            frame_ready: Notify::new(),
            on_frame_error: None,
            cancel: CancellationToken::new(),
            timeout: PN532_DEFAULT_TIMEOUT,
        }
    }

    /// Deadline for the ACK and response of each command.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Report frames rejected by the parser.
    pub fn with_frame_error_callback(mut self, callback: FrameErrorCallback) -> Self {
        self.on_frame_error = Some(callback);
        self
    }

    /// Send the wake-up preamble and give the chip time to leave low-power
    /// mode. Nothing is expected back.
    pub async fn wake_up(&self) -> Result<()> {
        let _permit = self.acquire().await?;
        self.wake().await
    }

    /// Run `command` and return the response frame.
    ///
    /// Returns [`Frame::Nack`] if the chip rejected the command frame, and
    /// otherwise the first data frame after the ACK. Frames of another kind
    /// that arrive meanwhile are discarded.
    ///
    /// # Errors
    ///
    /// - `Pn532Error::Timeout` if the ACK or the response is late
    /// - `Pn532Error::WriteFailed` on a short write
    /// - `Pn532Error::Cancelled` if the engine is closed meanwhile
    pub async fn send_command(&self, command: u8, data: &[u8]) -> Result<Frame> {
        let _permit = self.acquire().await?;
        let deadline = Instant::now() + self.timeout;

        // Leftovers belong to an earlier, abandoned command
        let stale = {
            let mut frames = lock(&self.frames);
            let n = frames.len();
            frames.clear();
            n
        };
        if stale > 0 {
            debug!(stale, "Discarded stale PN532 frames");
        }

        self.wake().await?;
        let frame = build_command_frame(command, data)?;
        self.write_all(&frame)?;
        trace!(command, "PN532 command sent");

        let ack = self
            .wait_for(deadline, |f| f.is_ack() || f.is_nack())
            .await?;
        if ack.is_nack() {
            warn!(peripheral = "pn532", command, "PN532 answered NACK");
            return Ok(Frame::Nack);
        }

        let response = self.wait_for(deadline, Frame::is_data).await?;
        trace!(%response, "PN532 response received");
        Ok(response)
    }

    /// GetFirmwareVersion payload as sent by the chip, `None` on NACK.
    pub async fn get_firmware_version_raw(&self) -> Result<Option<Vec<u8>>> {
        match self
            .send_command(PN532_CMD_GET_FIRMWARE_VERSION, &[])
            .await?
        {
            Frame::Data { payload, .. } => Ok(Some(payload)),
            _ => Ok(None),
        }
    }

    /// Decoded GetFirmwareVersion, `None` on NACK.
    pub async fn get_firmware_version(&self) -> Result<Option<FirmwareVersion>> {
        let Some(payload) = self.get_firmware_version_raw().await? else {
            return Ok(None);
        };
        let bytes: [u8; 4] = payload
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                Pn532Error::malformed(format!("firmware version has {} bytes", payload.len()))
            })?;
        Ok(Some(FirmwareVersion::from_bytes(bytes)))
    }

    /// Look for one ISO14443A card and return its UID.
    ///
    /// `None` means no card answered (or the chip sent NACK).
    pub async fn get_passive_target(&self) -> Result<Option<Uid>> {
        let frame = self
            .send_command(
                PN532_CMD_IN_LIST_PASSIVE_TARGET,
                &[0x01, PN532_BRTY_ISO14443A],
            )
            .await?;
        let Frame::Data { payload, .. } = frame else {
            return Ok(None);
        };
        parse_passive_target(&payload)
    }

    /// SAMConfiguration with a 1 s virtual card timeout and IRQ enabled.
    ///
    /// `false` if the chip answered NACK.
    pub async fn sam_config(&self, mode: SamMode) -> Result<bool> {
        let frame = self
            .send_command(
                PN532_CMD_SAM_CONFIGURATION,
                &[mode.to_u8(), PN532_SAM_TIMEOUT, 0x01],
            )
            .await?;
        Ok(frame.is_data())
    }

    /// RFConfiguration MaxRetries.
    pub async fn set_retries(&self, retries: Retries) -> Result<bool> {
        let frame = self
            .send_command(
                PN532_CMD_RF_CONFIGURATION,
                &[
                    PN532_RF_CFG_MAX_RETRIES,
                    retries.atr,
                    retries.psl,
                    retries.passive,
                ],
            )
            .await?;
        Ok(frame.is_data())
    }

    /// Read whatever the link has buffered and parse it.
    ///
    /// Parse errors are logged and reported to the frame error callback;
    /// they never fail the poll. Returns the number of bytes read.
    pub fn poll(&self) -> Result<usize> {
        let chunk = lock(&self.link).read_available()?;
        if chunk.is_empty() {
            return Ok(0);
        }
        trace!(bytes = chunk.len(), "PN532 chunk received");

        let results: Vec<_> = {
            let mut parser = lock(&self.parser);
            parser.feed(&chunk);
            parser.drain_frames().collect()
        };

        let mut queued = 0;
        for result in results {
            match result {
                Ok(frame) => {
                    lock(&self.frames).push_back(frame);
                    queued += 1;
                }
                Err(e) => {
                    warn!(peripheral = "pn532", error = %e, "Dropped malformed frame");
                    if let Some(callback) = &self.on_frame_error {
                        callback(&e);
                    }
                }
            }
        }
        if queued > 0 {
            self.frame_ready.notify_one();
        }

        Ok(chunk.len())
    }

    /// Poll the link until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        debug!("PN532 receive loop started");

        loop {
            let idle = match self.poll() {
                Ok(0) => true,
                Ok(_) => false,
                Err(e) => {
                    warn!(peripheral = "pn532", error = %e, "PN532 poll failed");
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

        debug!("PN532 receive loop stopped");
    }

    /// Fail every queued and in-flight command with `Pn532Error::Cancelled`.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    async fn acquire(&self) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        if self.cancel.is_cancelled() {
            return Err(Pn532Error::Cancelled);
        }
        tokio::select! {
            permit = self.command_lock.lock() => Ok(permit),
            _ = self.cancel.cancelled() => Err(Pn532Error::Cancelled),
        }
    }

    async fn wake(&self) -> Result<()> {
        self.write_all(&PN532_WAKE_UP)?;
        tokio::time::sleep(PN532_WAKE_UP_DELAY).await;
        Ok(())
    }

    /// Next queued frame matching `wanted`, dropping the ones before it.
    async fn wait_for(
        &self,
        deadline: Instant,
        wanted: impl Fn(&Frame) -> bool,
    ) -> Result<Frame> {
        loop {
            if let Some(frame) = self.take_matching(&wanted) {
                return Ok(frame);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Pn532Error::Cancelled),
                notified = tokio::time::timeout_at(deadline, self.frame_ready.notified()) => {
                    if notified.is_err() {
                        let timeout_ms = self.timeout.as_millis() as u64;
                        warn!(peripheral = "pn532", timeout_ms, "PN532 command timed out");
                        return Err(Pn532Error::timeout(self.timeout));
                    }
                }
            }
        }
    }

    fn take_matching(&self, wanted: &impl Fn(&Frame) -> bool) -> Option<Frame> {
        let mut frames = lock(&self.frames);
        while let Some(frame) = frames.pop_front() {
            if wanted(&frame) {
                return Some(frame);
            }
            debug!(%frame, "Discarded unexpected PN532 frame");
        }
        None
    }

    fn write_all(&self, bytes: &[u8]) -> Result<()> {
        let written = lock(&self.link).write(bytes)?;
        if written < bytes.len() {
            return Err(Pn532Error::WriteFailed {
                expected: bytes.len(),
                written,
            });
        }
        Ok(())
    }
}

/// UID of the first target in an InListPassiveTarget response.
///
/// ```text
/// NbTg Tg SENS_RES(2) SEL_RES NFCIDLength NFCID...
///  01  01   00 44       00        04      DE AD BE EF
/// ```
fn parse_passive_target(payload: &[u8]) -> Result<Option<Uid>> {
    match payload.get(TARGET_COUNT_OFFSET) {
        None | Some(0) => return Ok(None),
        Some(_) => {}
    }

    let uid_len = *payload
        .get(UID_LENGTH_OFFSET)
        .ok_or_else(|| Pn532Error::malformed("target response too short"))?
        as usize;
    let uid = payload
        .get(UID_OFFSET..UID_OFFSET + uid_len)
        .ok_or_else(|| {
            Pn532Error::malformed(format!(
                "UID length {uid_len} exceeds {} payload bytes",
                payload.len()
            ))
        })?;

    Uid::new(uid)
        .map(Some)
        .map_err(|e| Pn532Error::malformed(e.to_string()))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[0x01, 0x00, 0x00, 0x44, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF], Some(vec![0xDE, 0xAD, 0xBE, 0xEF]))]
    #[case(&[0x01, 0x01, 0x00, 0x44, 0x00, 0x07, 1, 2, 3, 4, 5, 6, 7], Some(vec![1, 2, 3, 4, 5, 6, 7]))]
    #[case(&[0x00], None)]
    #[case(&[], None)]
    fn test_parse_passive_target(#[case] payload: &[u8], #[case] expected: Option<Vec<u8>>) {
        let uid = parse_passive_target(payload).unwrap();
        assert_eq!(uid.map(|u| u.as_bytes().to_vec()), expected);
    }

    #[rstest]
    #[case(&[0x01, 0x00, 0x00])]
    #[case(&[0x01, 0x00, 0x00, 0x44, 0x00, 0x04, 0xDE])]
    #[case(&[0x01, 0x00, 0x00, 0x44, 0x00, 0x00])]
    fn test_parse_passive_target_malformed(#[case] payload: &[u8]) {
        assert!(matches!(
            parse_passive_target(payload),
            Err(Pn532Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_default_retries() {
        let retries = Retries::default();
        assert_eq!((retries.atr, retries.psl, retries.passive), (0xFF, 0x01, 0x01));
    }
}
