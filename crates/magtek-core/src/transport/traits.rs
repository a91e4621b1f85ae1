//! USB Transport layer abstraction.
//!
//! Defines the `HidTransport` trait for talking to an opened reader and the
//! `UsbBus` trait for locating one, allowing different implementations
//! (nusb, mock, etc.).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Control transfer failed: {0}")]
    ControlFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Short write: sent {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Blocking access to one opened reader.
///
/// Feature reports go over the control pipe; swipe data arrives on the
/// interrupt IN endpoint.
pub trait HidTransport {
    /// Detach any kernel driver bound to the HID interface and claim it.
    fn detach_kernel_driver(&mut self) -> Result<(), TransportError>;

    /// Select the device's (only) configuration. Any claimed interface is
    /// released first and claimed again on next use.
    fn set_configuration(&mut self) -> Result<(), TransportError>;

    /// USB bus reset.
    fn reset(&mut self) -> Result<(), TransportError>;

    /// SET_REPORT with a feature report. Returns bytes written.
    fn set_feature_report(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// GET_REPORT for a feature report of `len` bytes.
    fn get_feature_report(&mut self, len: usize) -> Result<Vec<u8>, TransportError>;

    /// Read one packet from the interrupt IN endpoint.
    ///
    /// Returns `TransportError::Timeout` when nothing arrived in time.
    fn read_input(&mut self, max_len: usize, timeout: Duration)
    -> Result<Vec<u8>, TransportError>;

    /// wMaxPacketSize of the interrupt IN endpoint.
    fn max_packet_size(&self) -> usize;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}

/// Finds and opens readers by VID/PID.
pub trait UsbBus {
    type Transport: HidTransport;

    /// Open the first device matching `vid`/`pid`.
    ///
    /// Returns `TransportError::DeviceNotFound` when none is attached.
    fn open(&self, vid: u16, pid: u16) -> Result<Self::Transport, TransportError>;
}
