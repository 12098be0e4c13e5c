use crate::{
    Result,
    constants::{MAX_CONNECTION_ID, MAX_UID_LENGTH, MIN_UID_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// TCP connection id handed out by the modem (0-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(u8);

impl ConnectionId {
    /// Create a connection id with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidConnectionId` if the id is above 4.
    pub fn new(id: u8) -> Result<Self> {
        if id > MAX_CONNECTION_ID {
            return Err(Error::InvalidConnectionId(id));
        }
        Ok(ConnectionId(id))
    }

    /// Parse the single ASCII digit the modem uses on the wire.
    ///
    /// Returns `None` for anything but `'0'..='4'`.
    #[must_use]
    pub fn from_ascii_digit(digit: u8) -> Option<Self> {
        match digit {
            b'0'..=b'9' => Self::new(digit - b'0').ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for ConnectionId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        ConnectionId::new(id)
    }
}

/// Set of open TCP connections, stored as a bitmask.
///
/// Bit `n` is set while connection `n` is open. Membership, insertion and
/// removal are O(1) and the set never allocates.
///
/// # Examples
///
/// ```
/// use bopbox_core::{ConnectionId, ConnectionSet};
///
/// let mut open = ConnectionSet::new();
/// open.insert(ConnectionId::new(2).unwrap());
/// open.insert(ConnectionId::new(4).unwrap());
///
/// let ids: Vec<u8> = open.iter().map(|id| id.as_u8()).collect();
/// assert_eq!(ids, vec![2, 4]);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSet {
    mask: u8,
}

impl ConnectionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a connection as open. Returns `false` if it already was.
    pub fn insert(&mut self, id: ConnectionId) -> bool {
        let bit = 1 << id.0;
        let inserted = self.mask & bit == 0;
        self.mask |= bit;
        inserted
    }

    /// Mark a connection as closed. Returns `false` if it was not open.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        let bit = 1 << id.0;
        let removed = self.mask & bit != 0;
        self.mask &= !bit;
        removed
    }

    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.mask & (1 << id.0) != 0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mask.count_ones() as usize
    }

    /// Iterate open ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        let mask = self.mask;
        (0..=MAX_CONNECTION_ID)
            .filter(move |id| mask & (1 << id) != 0)
            .map(ConnectionId)
    }

    pub fn clear(&mut self) {
        self.mask = 0;
    }
}

/// NFC tag unique identifier (1-10 bytes).
///
/// Displays as colon-separated uppercase hex, e.g. `DE:AD:BE:EF`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid(Vec<u8>);

impl Uid {
    /// Create a UID with length validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidUid` if the slice is empty or longer than 10 bytes.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        let len = bytes.len();
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&len) {
            return Err(Error::InvalidUid(format!(
                "UID must be {MIN_UID_LENGTH}-{MAX_UID_LENGTH} bytes, got {len}"
            )));
        }
        Ok(Uid(bytes.to_vec()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for Uid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// PN532 firmware identification returned by GetFirmwareVersion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// IC version, 0x32 for the PN532.
    pub ic: u8,
    pub version: u8,
    pub revision: u8,
    /// Bitfield of supported card families.
    pub support: u8,
}

impl FirmwareVersion {
    /// Decode the 4-byte GetFirmwareVersion payload.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            ic: bytes[0],
            version: bytes[1],
            revision: bytes[2],
            support: bytes[3],
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "PN5{:02X} v{}.{} (support {:#04x})",
            self.ic, self.version, self.revision, self.support
        )
    }
}

/// WiFi operating mode of the modem (`AT+CWMODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WifiMode {
    /// Radio off.
    Off = 0,
    /// Client of an access point.
    #[default]
    Station = 1,
    /// Acts as an access point.
    AccessPoint = 2,
    /// Station and access point at the same time.
    Both = 3,
}

impl WifiMode {
    #[must_use]
    pub fn to_u8(&self) -> u8 {
        *self as u8
    }
}

/// TCP connection multiplexing (`AT+CIPMUX`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MultiplexingMode {
    Single = 0,
    /// Required before starting a TCP server.
    #[default]
    Multiple = 1,
}

impl MultiplexingMode {
    #[must_use]
    pub fn to_u8(&self) -> u8 {
        *self as u8
    }
}

/// Format of `+IPD` notifications (`AT+CIPDINFO`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum IpdMessageMode {
    /// `+IPD,<id>,<len>:<data>`
    #[default]
    Short = 0,
    /// `+IPD,<id>,<len>,<remote ip>,<remote port>:<data>`
    Extended = 1,
}

impl IpdMessageMode {
    #[must_use]
    pub fn to_u8(&self) -> u8 {
        *self as u8
    }
}

/// SAM usage mode for SAMConfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum SamMode {
    /// No SAM in use.
    #[default]
    Normal = 0x01,
    VirtualCard = 0x02,
    WiredCard = 0x03,
    DualCard = 0x04,
}

impl SamMode {
    #[must_use]
    pub fn to_u8(&self) -> u8 {
        *self as u8
    }
}
