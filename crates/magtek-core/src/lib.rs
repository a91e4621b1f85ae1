//! magtek-core: MagTek USB swipe reader protocol implementation in Rust.
//!
//! Drives MagTek magnetic stripe readers over USB HID: configuration through
//! 24-byte feature reports, card data through a 337-byte input report.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, command buffers, track format, swipe decoding
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **Reader**: Multi-packet swipe assembly with cooperative cancellation
//! - **Device**: High-level reader controller
//! - **Config**: TOML-backed USB identifiers and timeouts
//!
//! # Example
//!
//! ```no_run
//! use magtek_core::{MagtekReader, NusbBus, ReaderConfig, SwipeOutcome};
//!
//! let config = ReaderConfig::default();
//! let bus = NusbBus::new(config.control_timeout());
//! let mut reader = MagtekReader::connect(&bus, config).expect("no reader");
//!
//! println!("{}", reader.software_id().expect("software id"));
//! if let SwipeOutcome::Swiped(swipe) = reader.read_card(None).expect("read failed") {
//!     println!("{swipe}");
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod reader;
pub mod transport;

// Re-exports for convenience
pub use config::{ConfigError, ReaderConfig};
pub use device::{DeviceMode, InterfaceType, MagtekReader};
pub use error::{MagtekError, Result};
pub use protocol::{CardType, CommandBuffer, CommandResponse, SwipeData, TrackFormat, TrackMode};
pub use reader::{CancelCheck, CancellationToken, SwipeOutcome, SwipeReader};
pub use transport::{
    HidTransport, MockBus, MockTransport, NusbBus, NusbTransport, TransportError, UsbBus,
};
