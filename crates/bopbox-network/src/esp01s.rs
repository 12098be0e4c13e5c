//! ESP-01S driver.
//!
//! Every operation builds one AT command, sends it through the
//! [`AtEngine`] and reports the modem's verdict as a `bool`: `true` only if
//! the response carries `OK\r\n`. Timeouts and link failures are errors.

use crate::engine::AtEngine;
use crate::error::{AtError, Result};
use crate::tracker::TcpEventHandler;
use bopbox_core::{
    ConnectionId, IpdMessageMode, MultiplexingMode, WifiMode,
    constants::{
        AT_CMD_TCP_CLOSE, AT_CMD_TCP_SEND, AT_CMD_TCP_SERVER, AT_CMD_TCP_SET_IPD_MODE,
        AT_CMD_TCP_SET_MULTIPLEXING, AT_CMD_TEST, AT_CMD_WIFI_CONNECT_AP,
        AT_CMD_WIFI_DISCONNECT_AP, AT_CMD_WIFI_SET_MODE, AT_CONNECT_AP_TIMEOUT, AT_MAX_SEND_LEN,
        AT_RESPONSE_OK, AT_RESPONSE_SEND_OK,
    },
};
use bopbox_hardware::SerialLink;
use bopbox_protocol::{build_parameter_list, find_subslice};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// ESP-01S WiFi modem in station mode with a multi-connection TCP server.
pub struct Esp01s<L> {
    engine: AtEngine<L>,
}

impl<L: SerialLink> Esp01s<L> {
    pub fn new(link: L) -> Self {
        Self {
            engine: AtEngine::new(link),
        }
    }

    pub fn with_event_handler(self, handler: Arc<dyn TcpEventHandler>) -> Self {
        Self {
            engine: self.engine.with_event_handler(handler),
        }
    }

    /// Timeout for every command except the access point join.
    pub fn with_command_timeout(self, timeout: Duration) -> Self {
        Self {
            engine: self.engine.with_default_timeout(timeout),
        }
    }

    pub fn engine(&self) -> &AtEngine<L> {
        &self.engine
    }

    /// `AT`: is the modem there and answering.
    pub async fn test(&self) -> Result<bool> {
        self.execute(AT_CMD_TEST.to_vec(), self.engine.default_timeout())
            .await
    }

    pub async fn set_wifi_mode(&self, mode: WifiMode) -> Result<bool> {
        self.execute(
            numeric_command(AT_CMD_WIFI_SET_MODE, mode.to_u8()),
            self.engine.default_timeout(),
        )
        .await
    }

    /// Join an access point. Allows up to 30 s for the modem to associate.
    pub async fn connect_access_point(&self, ssid: &str, password: &str) -> Result<bool> {
        let params = build_parameter_list(&[ssid.as_bytes(), password.as_bytes()], &[]);
        let command = [AT_CMD_WIFI_CONNECT_AP, params.as_slice()].concat();

        let joined = self.execute(command, AT_CONNECT_AP_TIMEOUT).await?;
        if joined {
            info!(peripheral = "esp01s", ssid, "Joined access point");
        } else {
            warn!(peripheral = "esp01s", ssid, "Access point join refused");
        }
        Ok(joined)
    }

    pub async fn disconnect_access_point(&self) -> Result<bool> {
        self.execute(
            AT_CMD_WIFI_DISCONNECT_AP.to_vec(),
            self.engine.default_timeout(),
        )
        .await
    }

    /// `AT+CIPDINFO`: whether `+IPD` carries the remote address.
    pub async fn set_ipd_message_mode(&self, mode: IpdMessageMode) -> Result<bool> {
        self.execute(
            numeric_command(AT_CMD_TCP_SET_IPD_MODE, mode.to_u8()),
            self.engine.default_timeout(),
        )
        .await
    }

    pub async fn set_connection_multiplexing(&self, mode: MultiplexingMode) -> Result<bool> {
        self.execute(
            numeric_command(AT_CMD_TCP_SET_MULTIPLEXING, mode.to_u8()),
            self.engine.default_timeout(),
        )
        .await
    }

    /// Start listening on `port`. Requires multiplexing to be on.
    pub async fn start_tcp_server(&self, port: u16) -> Result<bool> {
        let port = port.to_string();
        let params = build_parameter_list(&[b"1".as_slice(), port.as_bytes()], &[]);
        self.execute(
            [AT_CMD_TCP_SERVER, params.as_slice()].concat(),
            self.engine.default_timeout(),
        )
        .await
    }

    /// Stop the server. Open connections are dropped by the modem.
    pub async fn stop_tcp_server(&self) -> Result<bool> {
        let stopped = self
            .execute(
                numeric_command(AT_CMD_TCP_SERVER, 0),
                self.engine.default_timeout(),
            )
            .await?;
        if stopped {
            self.engine.reset_connections();
        }
        Ok(stopped)
    }

    pub async fn close_tcp_connection(&self, id: ConnectionId) -> Result<bool> {
        self.execute(
            numeric_command(AT_CMD_TCP_CLOSE, id.as_u8()),
            self.engine.default_timeout(),
        )
        .await
    }

    /// Send `data` on an open connection with `AT+CIPSEND`.
    ///
    /// Returns `false` if the modem refused the send (unknown link, server
    /// down) or never confirmed it with `SEND OK`.
    ///
    /// # Errors
    ///
    /// `AtError::PayloadTooLarge` for more than 2048 bytes, before anything
    /// is written.
    pub async fn send_tcp_data(&self, id: ConnectionId, data: &[u8]) -> Result<bool> {
        if data.len() > AT_MAX_SEND_LEN {
            return Err(AtError::PayloadTooLarge {
                length: data.len(),
                max: AT_MAX_SEND_LEN,
            });
        }

        let id_param = id.as_u8().to_string();
        let len_param = data.len().to_string();
        let params = build_parameter_list(&[id_param.as_bytes(), len_param.as_bytes()], &[]);
        let command = [AT_CMD_TCP_SEND, params.as_slice()].concat();

        let response = self
            .engine
            .send_with_payload(
                &command,
                data,
                AT_RESPONSE_SEND_OK,
                self.engine.default_timeout(),
            )
            .await?;

        let sent = response.is_some_and(|r| find_subslice(&r, AT_RESPONSE_SEND_OK).is_some());
        debug!(peripheral = "esp01s", %id, bytes = data.len(), sent, "TCP send finished");
        Ok(sent)
    }

    /// One receive poll; see [`AtEngine::poll`].
    pub fn poll(&self) -> Result<usize> {
        self.engine.poll()
    }

    /// Receive loop until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        self.engine.run(cancel).await;
    }

    /// Cancel queued and in-flight commands.
    pub fn close(&self) {
        self.engine.close();
    }

    async fn execute(&self, command: Vec<u8>, timeout: Duration) -> Result<bool> {
        let response = self.engine.send_command(&command, timeout).await?;
        let ok = find_subslice(&response, AT_RESPONSE_OK).is_some();
        if !ok {
            let text = String::from_utf8_lossy(&response);
            debug!(peripheral = "esp01s", response = %text.trim(), "Modem did not answer OK");
        }
        Ok(ok)
    }
}

fn numeric_command(command: &[u8], value: u8) -> Vec<u8> {
    [command, value.to_string().as_bytes()].concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_command() {
        assert_eq!(numeric_command(b"AT+CWMODE=", 1), b"AT+CWMODE=1".to_vec());
        assert_eq!(numeric_command(b"AT+CIPCLOSE=", 4), b"AT+CIPCLOSE=4".to_vec());
    }
}
