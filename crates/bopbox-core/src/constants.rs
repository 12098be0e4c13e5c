//! Wire-level constants for the two peripheral protocols.
//!
//! bopbox talks to two devices over UART:
//!
//! - an ESP-01S WiFi modem speaking the Espressif AT command set, and
//! - a PN532 NFC controller speaking its checksummed binary frame protocol.
//!
//! # AT command line
//!
//! ```text
//! AT+CWJAP="my ssid",secret\r\n
//! ```
//!
//! Responses end in one of `OK\r\n`, `ERROR\r\n` or `FAIL\r\n`. The modem
//! also emits unsolicited result codes (URCs) for TCP server activity:
//!
//! ```text
//! 0,CONNECT\r\n
//! +IPD,0,18:GET / HTTP/1.1\r\n...
//! 0,CLOSED\r\n
//! ```
//!
//! # PN532 frame
//!
//! ```text
//! 00 00 FF LEN LCS TFI CMD [DATA...] DCS 00
//! ```
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `LEN` | Number of bytes in TFI + CMD + DATA |
//! | `LCS` | `(-LEN) mod 256` |
//! | `TFI` | `0xD4` host to PN532, `0xD5` PN532 to host |
//! | `DCS` | `(-(TFI + CMD + sum(DATA))) mod 256` |
//!
//! Modifying these values breaks compatibility with the peripherals.

use std::time::Duration;

// ============================================================================
// AT Command Set
// ============================================================================

/// Line terminator appended to every AT command.
pub const AT_LINE_END: &[u8] = b"\r\n";

/// Fixed prefix of every extended AT command (`AT+XYZ`).
pub const AT_COMMAND_PREFIX: &[u8] = b"AT+";

/// Basic test command. Its response prefix is the command itself.
pub const AT_CMD_TEST: &[u8] = b"AT";

pub const AT_CMD_WIFI_SET_MODE: &[u8] = b"AT+CWMODE=";
pub const AT_CMD_WIFI_CONNECT_AP: &[u8] = b"AT+CWJAP=";
pub const AT_CMD_WIFI_DISCONNECT_AP: &[u8] = b"AT+CWQAP";
pub const AT_CMD_TCP_SET_MULTIPLEXING: &[u8] = b"AT+CIPMUX=";
pub const AT_CMD_TCP_SERVER: &[u8] = b"AT+CIPSERVER=";
pub const AT_CMD_TCP_SET_IPD_MODE: &[u8] = b"AT+CIPDINFO=";
pub const AT_CMD_TCP_SEND: &[u8] = b"AT+CIPSEND=";
pub const AT_CMD_TCP_CLOSE: &[u8] = b"AT+CIPCLOSE=";

/// Successful completion marker.
pub const AT_RESPONSE_OK: &[u8] = b"OK\r\n";

/// Command rejected by the modem.
pub const AT_RESPONSE_ERROR: &[u8] = b"ERROR\r\n";

/// Command accepted but the operation failed (e.g. wrong AP password).
pub const AT_RESPONSE_FAIL: &[u8] = b"FAIL\r\n";

/// All markers that complete an in-flight command.
pub const AT_TERMINATORS: [&[u8]; 3] = [AT_RESPONSE_OK, AT_RESPONSE_ERROR, AT_RESPONSE_FAIL];

/// Prompt the modem prints when it is ready for `AT+CIPSEND` payload bytes.
pub const AT_SEND_PROMPT: &[u8] = b">";

/// Marker confirming a `AT+CIPSEND` payload was transmitted.
pub const AT_RESPONSE_SEND_OK: &[u8] = b"SEND OK";

/// Largest payload a single `AT+CIPSEND` may carry.
pub const AT_MAX_SEND_LEN: usize = 2048;

/// Default timeout for AT commands.
pub const AT_DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Joining an access point involves DHCP and can take much longer.
pub const AT_CONNECT_AP_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// TCP URCs
// ============================================================================

pub const URC_CONNECT: &[u8] = b",CONNECT\r\n";
pub const URC_CLOSED: &[u8] = b",CLOSED\r\n";
pub const URC_IPD: &[u8] = b"+IPD,";

/// Highest connection id the modem hands out in multi-connection mode.
///
/// The ESP-01S supports five simultaneous links, ids `0..=4`, always sent
/// as a single ASCII digit.
pub const MAX_CONNECTION_ID: u8 = 4;

// ============================================================================
// PN532 Frames
// ============================================================================

pub const PN532_PREAMBLE: u8 = 0x00;
pub const PN532_START_CODE_1: u8 = 0x00;
pub const PN532_START_CODE_2: u8 = 0xFF;
pub const PN532_POSTAMBLE: u8 = 0x00;

/// TFI for frames sent by the host.
pub const PN532_HOST_TO_DEVICE: u8 = 0xD4;

/// TFI for frames sent by the PN532.
pub const PN532_DEVICE_TO_HOST: u8 = 0xD5;

pub const PN532_ACK_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00];
pub const PN532_NACK_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00];

/// Largest frame body (TFI + CMD + DATA) the parser accepts.
pub const PN532_MAX_BODY_LEN: usize = 64;

/// Fixed overhead of a normal information frame around its body:
/// preamble, two start codes, LEN, LCS, DCS, postamble.
pub const PN532_FRAME_OVERHEAD: usize = 7;

/// Wake-up sequence for HSU mode: two `0x55` then fourteen zero bytes.
pub const PN532_WAKE_UP: [u8; 16] = [
    0x55, 0x55, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Settle time after sending the wake-up sequence.
pub const PN532_WAKE_UP_DELAY: Duration = Duration::from_millis(1);

pub const PN532_CMD_GET_FIRMWARE_VERSION: u8 = 0x02;
pub const PN532_CMD_SAM_CONFIGURATION: u8 = 0x14;
pub const PN532_CMD_RF_CONFIGURATION: u8 = 0x32;
pub const PN532_CMD_IN_LIST_PASSIVE_TARGET: u8 = 0x4A;

/// RFConfiguration item selecting the retry counters.
pub const PN532_RF_CFG_MAX_RETRIES: u8 = 0x05;

/// SAMConfiguration timeout byte, in units of 50 ms (0x14 = 1 s).
pub const PN532_SAM_TIMEOUT: u8 = 0x14;

/// Poll for ISO14443A targets at 106 kbps.
pub const PN532_BRTY_ISO14443A: u8 = 0x00;

/// Default timeout for PN532 commands, covering both ACK and response.
pub const PN532_DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// NFC Tags
// ============================================================================

pub const MIN_UID_LENGTH: usize = 1;

/// ISO14443A UIDs are 4, 7 or 10 bytes.
pub const MAX_UID_LENGTH: usize = 10;

// ============================================================================
// Serial Links
// ============================================================================

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Interval between receive polls when the link is idle.
pub const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(10);
