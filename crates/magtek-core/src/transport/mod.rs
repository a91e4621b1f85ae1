//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod traits;

pub use mock::{MockBus, MockRead, MockTransport};
pub use self::nusb::{NusbBus, NusbTransport};
pub use traits::{HidTransport, TransportError, UsbBus};
