//! Feature report command encoding and response parsing.
//!
//! Every command travels in a fixed 24-byte feature report:
//! `[command][data length][22 bytes data, zero padded]`. The reply uses the
//! same size with a status byte in place of the command.

use std::fmt;

use crate::error::{MagtekError, Result};
use crate::protocol::constants::*;

/// A 24-byte command ready to be sent with SET_REPORT.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommandBuffer {
    bytes: [u8; FEATURE_REPORT_SIZE],
}

impl CommandBuffer {
    /// Build a command buffer. Fails when `data` exceeds 22 bytes.
    pub fn encode(command: u8, data: &[u8]) -> Result<Self> {
        if data.len() > MAX_COMMAND_DATA {
            return Err(MagtekError::invalid(format!(
                "command data too long: {} bytes (max {})",
                data.len(),
                MAX_COMMAND_DATA
            )));
        }
        Ok(Self::build(command, data))
    }

    pub fn get_property(property: u8) -> Self {
        Self::build(CMD_GET_PROPERTY, &[property])
    }

    pub fn set_property(property: u8, value: u8) -> Self {
        Self::build(CMD_SET_PROPERTY, &[property, value])
    }

    pub fn reset_device() -> Self {
        Self::build(CMD_RESET_DEVICE, &[])
    }

    // `data` must fit in MAX_COMMAND_DATA.
    fn build(command: u8, data: &[u8]) -> Self {
        let mut bytes = [0u8; FEATURE_REPORT_SIZE];
        bytes[0] = command;
        bytes[1] = data.len() as u8;
        bytes[2..2 + data.len()].copy_from_slice(data);
        Self { bytes }
    }

    pub fn command(&self) -> u8 {
        self.bytes[0]
    }

    pub fn data(&self) -> &[u8] {
        let len = self.bytes[1] as usize;
        &self.bytes[2..2 + len]
    }

    pub fn as_bytes(&self) -> &[u8; FEATURE_REPORT_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CommandBuffer(cmd=0x{:02X} data={:02X?})",
            self.command(),
            self.data()
        )
    }
}

/// Payload of a successful command.
///
/// The device signals a scalar property with a length of one and a block
/// property (such as the software ID) with any larger length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResponse {
    Empty,
    Scalar(u8),
    Block(Vec<u8>),
}

impl CommandResponse {
    /// Parse a GET_REPORT reply, mapping vendor status codes to errors.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < 2 {
            return Err(MagtekError::invalid(format!(
                "response too short: {} bytes",
                raw.len()
            )));
        }

        match raw[0] {
            RC_SUCCESS => {}
            RC_FAIL => return Err(MagtekError::CommandFailed),
            RC_BADPARAM => return Err(MagtekError::BadParameter),
            other => return Err(MagtekError::UnknownStatus(other)),
        }

        let payload = &raw[2..];
        let len = (raw[1] as usize).min(MAX_COMMAND_DATA);
        if payload.len() < len {
            return Err(MagtekError::invalid(format!(
                "response truncated: length byte {} but {} data bytes",
                raw[1],
                payload.len()
            )));
        }
        Ok(match len {
            0 => CommandResponse::Empty,
            1 => CommandResponse::Scalar(payload[0]),
            _ => CommandResponse::Block(payload[..len].to_vec()),
        })
    }

    /// The value of a scalar property.
    pub fn as_scalar(&self) -> Option<u8> {
        match self {
            CommandResponse::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// The payload bytes, whatever the shape.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            CommandResponse::Empty => &[],
            CommandResponse::Scalar(v) => std::slice::from_ref(v),
            CommandResponse::Block(b) => b,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CommandResponse::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u8, payload: &[u8]) -> [u8; FEATURE_REPORT_SIZE] {
        let mut raw = [0u8; FEATURE_REPORT_SIZE];
        raw[0] = status;
        raw[1] = payload.len() as u8;
        raw[2..2 + payload.len()].copy_from_slice(payload);
        raw
    }

    #[test]
    fn test_encode_layout() {
        let buf = CommandBuffer::encode(0x01, &[0x03, 0x95]).unwrap();
        let bytes = buf.as_bytes();
        assert_eq!(bytes.len(), FEATURE_REPORT_SIZE);
        assert_eq!(&bytes[..4], &[0x01, 0x02, 0x03, 0x95]);
        assert!(bytes[4..].iter().all(|&b| b == 0));
        assert_eq!(buf.data(), &[0x03, 0x95]);
    }

    #[test]
    fn test_encode_max_and_overflow() {
        let data = [0xAAu8; 23];
        assert!(CommandBuffer::encode(0x00, &data[..22]).is_ok());
        let err = CommandBuffer::encode(0x00, &data).unwrap_err();
        assert!(matches!(err, MagtekError::InvalidArgument(_)));
    }

    #[test]
    fn test_helpers_match_encode() {
        assert_eq!(
            CommandBuffer::get_property(PROP_TRACK_FORMAT),
            CommandBuffer::encode(CMD_GET_PROPERTY, &[PROP_TRACK_FORMAT]).unwrap()
        );
        assert_eq!(
            CommandBuffer::set_property(PROP_INTERFACE_TYPE, INTERFACE_TYPE_KB),
            CommandBuffer::encode(CMD_SET_PROPERTY, &[PROP_INTERFACE_TYPE, 1]).unwrap()
        );
        let reset = CommandBuffer::reset_device();
        assert_eq!(reset.command(), CMD_RESET_DEVICE);
        assert!(reset.data().is_empty());
    }

    #[test]
    fn test_payload_slicing_all_lengths() {
        for len in 0..=MAX_COMMAND_DATA {
            let payload: Vec<u8> = (0..len as u8).map(|b| b.wrapping_add(0x41)).collect();
            let decoded = CommandResponse::decode(&response(RC_SUCCESS, &payload)).unwrap();
            assert_eq!(decoded.as_bytes(), payload.as_slice(), "length {len}");
            match len {
                0 => assert_eq!(decoded, CommandResponse::Empty),
                1 => assert_eq!(decoded, CommandResponse::Scalar(0x41)),
                _ => assert!(matches!(decoded, CommandResponse::Block(_))),
            }
        }
    }

    #[test]
    fn test_status_codes() {
        assert!(matches!(
            CommandResponse::decode(&response(RC_FAIL, &[])),
            Err(MagtekError::CommandFailed)
        ));
        assert!(matches!(
            CommandResponse::decode(&response(RC_BADPARAM, &[])),
            Err(MagtekError::BadParameter)
        ));
        assert!(matches!(
            CommandResponse::decode(&response(0x7F, &[])),
            Err(MagtekError::UnknownStatus(0x7F))
        ));
    }

    #[test]
    fn test_oversized_length_is_clamped() {
        let mut raw = response(RC_SUCCESS, &[1, 2, 3]);
        raw[1] = 0xFF;
        let decoded = CommandResponse::decode(&raw).unwrap();
        assert_eq!(decoded.as_bytes().len(), MAX_COMMAND_DATA);
    }

    #[test]
    fn test_short_response_rejected() {
        assert!(matches!(
            CommandResponse::decode(&[0x00]),
            Err(MagtekError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_length_byte_beyond_payload_rejected() {
        for raw in [&[0x00, 0x01][..], &[0x00, 0x03, 0x41, 0x42]] {
            assert!(
                matches!(CommandResponse::decode(raw), Err(MagtekError::InvalidArgument(_))),
                "{raw:02X?}"
            );
        }
        // Short but consistent replies are fine.
        assert_eq!(
            CommandResponse::decode(&[0x00, 0x01, 0x95]).unwrap(),
            CommandResponse::Scalar(0x95)
        );
        assert!(CommandResponse::decode(&[0x00, 0x00]).unwrap().is_empty());
    }
}
