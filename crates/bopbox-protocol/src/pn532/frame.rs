//! PN532 frame representation and encoding.

use super::checksum::{dcs, lcs};
use bopbox_core::{
    Error, Result,
    constants::{
        PN532_FRAME_OVERHEAD, PN532_HOST_TO_DEVICE, PN532_POSTAMBLE, PN532_PREAMBLE,
        PN532_START_CODE_1, PN532_START_CODE_2,
    },
};
use std::fmt;

/// Largest body a normal information frame can declare in its LEN byte.
const MAX_ENCODED_BODY_LEN: usize = u8::MAX as usize;

/// A parsed PN532 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The PN532 received the previous command.
    Ack,
    /// The PN532 rejected the previous frame and expects a resend.
    Nack,
    /// Result of a command.
    Data {
        /// Response code echoed by the PN532 (command code + 1).
        command: u8,
        payload: Vec<u8>,
    },
}

impl Frame {
    pub fn is_ack(&self) -> bool {
        matches!(self, Frame::Ack)
    }

    pub fn is_nack(&self) -> bool {
        matches!(self, Frame::Nack)
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Frame::Data { .. })
    }

    /// Payload of a data frame, empty for ACK and NACK.
    pub fn payload(&self) -> &[u8] {
        match self {
            Frame::Data { payload, .. } => payload,
            _ => &[],
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Ack => f.write_str("ACK"),
            Frame::Nack => f.write_str("NACK"),
            Frame::Data { command, payload } => {
                write!(f, "DATA {command:#04x} [")?;
                for (i, b) in payload.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{b:02X}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Encode a normal information frame with the given direction byte.
///
/// ```text
/// 00 00 FF LEN LCS TFI CMD [DATA...] DCS 00
/// ```
///
/// # Errors
///
/// Returns `Error::FrameTooLarge` if `TFI + CMD + DATA` exceeds 255 bytes.
pub fn encode_frame(direction: u8, command: u8, data: &[u8]) -> Result<Vec<u8>> {
    let body_len = data.len() + 2;
    if body_len > MAX_ENCODED_BODY_LEN {
        return Err(Error::FrameTooLarge {
            length: body_len,
            max: MAX_ENCODED_BODY_LEN,
        });
    }
    let len = body_len as u8;

    let mut frame = Vec::with_capacity(body_len + PN532_FRAME_OVERHEAD);
    frame.extend_from_slice(&[PN532_PREAMBLE, PN532_START_CODE_1, PN532_START_CODE_2]);
    frame.push(len);
    frame.push(lcs(len));

    let body_start = frame.len();
    frame.push(direction);
    frame.push(command);
    frame.extend_from_slice(data);

    let checksum = dcs(&frame[body_start..]);
    frame.push(checksum);
    frame.push(PN532_POSTAMBLE);

    Ok(frame)
}

/// Encode a host-to-PN532 command frame.
///
/// # Examples
///
/// ```
/// use bopbox_protocol::build_command_frame;
///
/// let frame = build_command_frame(0x02, &[]).unwrap();
/// assert_eq!(frame, vec![0x00, 0x00, 0xFF, 0x02, 0xFE, 0xD4, 0x02, 0x2A, 0x00]);
/// ```
///
/// # Errors
///
/// Returns `Error::FrameTooLarge` if `data` is longer than 253 bytes.
pub fn build_command_frame(command: u8, data: &[u8]) -> Result<Vec<u8>> {
    encode_frame(PN532_HOST_TO_DEVICE, command, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_get_firmware_version() {
        let frame = build_command_frame(0x02, &[]).unwrap();
        assert_eq!(
            frame,
            vec![0x00, 0x00, 0xFF, 0x02, 0xFE, 0xD4, 0x02, 0x2A, 0x00]
        );
    }

    #[test]
    fn test_build_in_list_passive_target() {
        let frame = build_command_frame(0x4A, &[0x01, 0x00]).unwrap();
        // DCS = -(0xD4 + 0x4A + 0x01) = 0xE1
        assert_eq!(
            frame,
            vec![0x00, 0x00, 0xFF, 0x04, 0xFC, 0xD4, 0x4A, 0x01, 0x00, 0xE1, 0x00]
        );
    }

    #[test]
    fn test_build_sam_configuration() {
        let frame = build_command_frame(0x14, &[0x01, 0x14, 0x01]).unwrap();
        assert_eq!(
            frame,
            vec![0x00, 0x00, 0xFF, 0x05, 0xFB, 0xD4, 0x14, 0x01, 0x14, 0x01, 0x02, 0x00]
        );
    }

    #[test]
    fn test_encode_frame_too_large() {
        let data = vec![0u8; 254];
        assert!(matches!(
            build_command_frame(0x40, &data),
            Err(Error::FrameTooLarge { length: 256, .. })
        ));

        let data = vec![0u8; 253];
        assert_eq!(build_command_frame(0x40, &data).unwrap().len(), 262);
    }

    #[test]
    fn test_display() {
        let frame = Frame::Data {
            command: 0x4B,
            payload: vec![0x00],
        };
        assert_eq!(frame.to_string(), "DATA 0x4b [00]");
        assert_eq!(Frame::Ack.to_string(), "ACK");
    }
}
