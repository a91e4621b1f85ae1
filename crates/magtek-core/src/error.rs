//! Error types for reader operations.

use thiserror::Error;

use crate::device::DeviceMode;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum MagtekError {
    /// Malformed caller input: wrong buffer size, bad track number, oversized data.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No MagTek reader found: VID={vid:04X} PID={kb_pid:04X}/{hid_pid:04X}")]
    DeviceNotFound { vid: u16, kb_pid: u16, hid_pid: u16 },

    #[error("{context}: {source}")]
    TransportFailure {
        context: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("Command failed")]
    CommandFailed,

    #[error("Command failed due to bad parameter or syntax error")]
    BadParameter,

    #[error("Unrecognized status code 0x{0:02X}")]
    UnknownStatus(u8),

    #[error("Operation not supported in {0}")]
    UnsupportedMode(DeviceMode),
}

impl MagtekError {
    pub(crate) fn transport(context: &'static str) -> impl FnOnce(TransportError) -> Self {
        move |source| MagtekError::TransportFailure { context, source }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        MagtekError::InvalidArgument(message.into())
    }
}

pub type Result<T> = std::result::Result<T, MagtekError>;
