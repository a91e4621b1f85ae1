//! Reader controller: mode detection, property access and swipe reads.

use std::fmt;

use tracing::{debug, info, instrument};

use crate::config::ReaderConfig;
use crate::error::{MagtekError, Result};
use crate::protocol::command::{CommandBuffer, CommandResponse};
use crate::protocol::constants::*;
use crate::protocol::track_format::TrackFormat;
use crate::reader::{CancelCheck, SwipeOutcome, SwipeReader};
use crate::transport::{HidTransport, TransportError, UsbBus};

/// Firmware mode, fixed for the lifetime of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    /// Swipes are typed out as keystrokes.
    KbEmulation,
    /// Swipes are delivered as input reports.
    RawHid,
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::KbEmulation => write!(f, "KB emulation mode"),
            DeviceMode::RawHid => write!(f, "Raw HID mode"),
        }
    }
}

/// Value of the interface type property (0x10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    Hid,
    Keyboard,
    Unknown(u8),
}

impl InterfaceType {
    pub fn from_byte(value: u8) -> Self {
        match value {
            INTERFACE_TYPE_HID => InterfaceType::Hid,
            INTERFACE_TYPE_KB => InterfaceType::Keyboard,
            other => InterfaceType::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            InterfaceType::Hid => INTERFACE_TYPE_HID,
            InterfaceType::Keyboard => INTERFACE_TYPE_KB,
            InterfaceType::Unknown(v) => v,
        }
    }
}

impl From<DeviceMode> for InterfaceType {
    fn from(mode: DeviceMode) -> Self {
        match mode {
            DeviceMode::KbEmulation => InterfaceType::Keyboard,
            DeviceMode::RawHid => InterfaceType::Hid,
        }
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceType::Hid => write!(f, "HID"),
            InterfaceType::Keyboard => write!(f, "KB"),
            InterfaceType::Unknown(v) => write!(f, "Unknown (0x{v:02X})"),
        }
    }
}

/// A connected MagTek reader.
pub struct MagtekReader<T: HidTransport> {
    transport: T,
    mode: DeviceMode,
    config: ReaderConfig,
}

impl<T: HidTransport> MagtekReader<T> {
    /// Find a reader on `bus` and prepare it for use.
    ///
    /// The keyboard-emulation PID is tried first since that is how readers
    /// ship from the factory.
    #[instrument(level = "info", skip_all)]
    pub fn connect<B>(bus: &B, config: ReaderConfig) -> Result<Self>
    where
        B: UsbBus<Transport = T>,
    {
        let (transport, mode) = match bus.open(config.vendor_id, config.kb_product_id) {
            Ok(t) => (t, DeviceMode::KbEmulation),
            Err(TransportError::DeviceNotFound { .. }) => {
                match bus.open(config.vendor_id, config.hid_product_id) {
                    Ok(t) => (t, DeviceMode::RawHid),
                    Err(TransportError::DeviceNotFound { .. }) => {
                        return Err(MagtekError::DeviceNotFound {
                            vid: config.vendor_id,
                            kb_pid: config.kb_product_id,
                            hid_pid: config.hid_product_id,
                        });
                    }
                    Err(e) => return Err(MagtekError::transport("Could not open reader")(e)),
                }
            }
            Err(e) => return Err(MagtekError::transport("Could not open reader")(e)),
        };

        info!(
            vid = %format!("{:04X}", transport.vendor_id()),
            pid = %format!("{:04X}", transport.product_id()),
            mode = %mode,
            "Reader found"
        );

        Self::from_transport(transport, mode, config)
    }

    /// Take over an already opened transport.
    pub fn from_transport(mut transport: T, mode: DeviceMode, config: ReaderConfig) -> Result<Self> {
        transport
            .detach_kernel_driver()
            .map_err(MagtekError::transport(
                "Could not detach kernel driver (are you root?)",
            ))?;
        transport
            .set_configuration()
            .map_err(MagtekError::transport("Could not set configuration"))?;
        transport
            .reset()
            .map_err(MagtekError::transport("Could not reset device"))?;

        Ok(Self {
            transport,
            mode,
            config,
        })
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Software ID string, e.g. "21042812D01".
    pub fn software_id(&mut self) -> Result<String> {
        let response = self.get_property(PROP_SOFTWARE_ID)?;
        let text = String::from_utf8_lossy(response.as_bytes());
        Ok(text.trim_end_matches('\0').to_string())
    }

    pub fn track_format(&mut self) -> Result<TrackFormat> {
        let value = self.get_scalar(PROP_TRACK_FORMAT)?;
        Ok(TrackFormat::from_byte(value))
    }

    pub fn set_track_format(&mut self, format: TrackFormat) -> Result<()> {
        info!(value = %format!("0x{:02X}", format.to_byte()), "Setting track format");
        self.set_property(PROP_TRACK_FORMAT, format.to_byte())
    }

    pub fn interface_type(&mut self) -> Result<InterfaceType> {
        Ok(InterfaceType::from_byte(self.get_scalar(PROP_INTERFACE_TYPE)?))
    }

    /// Takes effect after `reset_device`.
    pub fn set_interface_type(&mut self, interface: InterfaceType) -> Result<()> {
        info!(interface = %interface, "Setting interface type");
        self.set_property(PROP_INTERFACE_TYPE, interface.to_byte())
    }

    /// Reboot the reader. The connection is gone afterwards.
    pub fn reset_device(&mut self) -> Result<()> {
        info!("Rebooting reader");
        self.send_command(&CommandBuffer::reset_device())?;
        Ok(())
    }

    /// Store the interface type for `mode` and reboot into it.
    pub fn switch_mode(&mut self, mode: DeviceMode) -> Result<()> {
        self.set_interface_type(mode.into())?;
        self.reset_device()
    }

    /// Enable or disable one track, then reboot so the change applies.
    pub fn configure_track(&mut self, track: u8, enabled: bool, required: bool) -> Result<TrackFormat> {
        let mut format = self.track_format()?;
        if enabled {
            format.enable_track(track, required)?;
        } else {
            format.disable_track(track)?;
        }
        self.set_track_format(format)?;
        self.reset_device()?;
        Ok(format)
    }

    /// Wait for a card swipe. Only available in raw HID mode.
    pub fn read_card(&mut self, cancel: Option<&dyn CancelCheck>) -> Result<SwipeOutcome> {
        SwipeReader::new(self.mode, &self.config).read_swipe(&mut self.transport, cancel)
    }

    fn get_property(&mut self, property: u8) -> Result<CommandResponse> {
        self.send_command(&CommandBuffer::get_property(property))
    }

    fn get_scalar(&mut self, property: u8) -> Result<u8> {
        let response = self.get_property(property)?;
        response.as_scalar().ok_or_else(|| {
            MagtekError::invalid(format!(
                "property 0x{property:02X} returned {} bytes, expected 1",
                response.as_bytes().len()
            ))
        })
    }

    fn set_property(&mut self, property: u8, value: u8) -> Result<()> {
        self.send_command(&CommandBuffer::set_property(property, value))?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn send_command(&mut self, command: &CommandBuffer) -> Result<CommandResponse> {
        let written = self
            .transport
            .set_feature_report(command.as_bytes())
            .map_err(MagtekError::transport("Failed to send control request"))?;
        if written != FEATURE_REPORT_SIZE {
            return Err(MagtekError::TransportFailure {
                context: "Failed to send control request",
                source: TransportError::ShortWrite {
                    written,
                    expected: FEATURE_REPORT_SIZE,
                },
            });
        }

        let reply = self
            .transport
            .get_feature_report(FEATURE_REPORT_SIZE)
            .map_err(MagtekError::transport("Failed to read command response"))?;
        let response = CommandResponse::decode(&reply)?;
        debug!(?response, "Command complete");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::swipe::tests::sample_report;
    use crate::transport::{MockBus, MockTransport};

    fn connect(pid: u16) -> (MagtekReader<MockTransport>, MockTransport) {
        let mock = MockTransport::new(pid);
        let bus = MockBus::new().with_device(mock.clone());
        let reader = MagtekReader::connect(&bus, ReaderConfig::default()).unwrap();
        (reader, mock)
    }

    #[test]
    fn test_connect_prefers_keyboard_pid() {
        let bus = MockBus::new()
            .with_device(MockTransport::new(HID_PRODUCT_ID))
            .with_device(MockTransport::new(KB_PRODUCT_ID));
        let reader = MagtekReader::connect(&bus, ReaderConfig::default()).unwrap();
        assert_eq!(reader.mode(), DeviceMode::KbEmulation);
    }

    #[test]
    fn test_connect_raw_hid_and_setup() {
        let (reader, mock) = connect(HID_PRODUCT_ID);
        assert_eq!(reader.mode(), DeviceMode::RawHid);
        assert_eq!(mock.detach_calls(), 1);
        assert_eq!(mock.configure_calls(), 1);
        assert_eq!(mock.reset_calls(), 1);
        assert!(mock.feature_writes().is_empty());
    }

    #[test]
    fn test_connect_no_device() {
        let result = MagtekReader::connect(&MockBus::new(), ReaderConfig::default());
        assert!(matches!(result, Err(MagtekError::DeviceNotFound { .. })));
    }

    #[test]
    fn test_connect_detach_failure() {
        let mock = MockTransport::new(KB_PRODUCT_ID);
        mock.fail_detach();
        let bus = MockBus::new().with_device(mock.clone());
        let result = MagtekReader::connect(&bus, ReaderConfig::default());
        assert!(matches!(result, Err(MagtekError::TransportFailure { .. })));
        assert_eq!(mock.configure_calls(), 0);
    }

    #[test]
    fn test_software_id() {
        let (mut reader, mock) = connect(KB_PRODUCT_ID);
        mock.queue_ok(b"21042812D01\0");

        assert_eq!(reader.software_id().unwrap(), "21042812D01");
        let writes = mock.feature_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(&writes[0][..3], &[CMD_GET_PROPERTY, 1, PROP_SOFTWARE_ID]);
        assert_eq!(writes[0].len(), FEATURE_REPORT_SIZE);
    }

    #[test]
    fn test_track_format_get_set() {
        let (mut reader, mock) = connect(KB_PRODUCT_ID);
        mock.queue_ok(&[0x95]);
        mock.queue_ok(&[]);

        let mut format = reader.track_format().unwrap();
        format.disable_track(1).unwrap();
        reader.set_track_format(format).unwrap();

        let writes = mock.feature_writes();
        assert_eq!(&writes[0][..3], &[CMD_GET_PROPERTY, 1, PROP_TRACK_FORMAT]);
        assert_eq!(&writes[1][..4], &[CMD_SET_PROPERTY, 2, PROP_TRACK_FORMAT, 0x94]);
    }

    #[test]
    fn test_set_track_format_bad_parameter() {
        let (mut reader, mock) = connect(KB_PRODUCT_ID);
        mock.queue_response(RC_BADPARAM, &[]);

        let err = reader
            .set_track_format(TrackFormat::from_byte(0x95))
            .unwrap_err();
        assert!(matches!(err, MagtekError::BadParameter));
    }

    #[test]
    fn test_command_failed() {
        let (mut reader, mock) = connect(KB_PRODUCT_ID);
        mock.queue_response(RC_FAIL, &[]);
        assert!(matches!(
            reader.interface_type(),
            Err(MagtekError::CommandFailed)
        ));
    }

    #[test]
    fn test_interface_type() {
        let (mut reader, mock) = connect(KB_PRODUCT_ID);
        mock.queue_ok(&[INTERFACE_TYPE_KB]);
        assert_eq!(reader.interface_type().unwrap(), InterfaceType::Keyboard);
    }

    #[test]
    fn test_scalar_property_with_block_reply() {
        let (mut reader, mock) = connect(KB_PRODUCT_ID);
        mock.queue_ok(&[1, 2]);
        assert!(matches!(
            reader.track_format(),
            Err(MagtekError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_switch_mode_sets_and_reboots() {
        let (mut reader, mock) = connect(KB_PRODUCT_ID);
        mock.queue_ok(&[]);
        mock.queue_ok(&[]);

        reader.switch_mode(DeviceMode::RawHid).unwrap();

        let writes = mock.feature_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(
            &writes[0][..4],
            &[CMD_SET_PROPERTY, 2, PROP_INTERFACE_TYPE, INTERFACE_TYPE_HID]
        );
        assert_eq!(&writes[1][..2], &[CMD_RESET_DEVICE, 0]);
    }

    #[test]
    fn test_configure_track() {
        let (mut reader, mock) = connect(KB_PRODUCT_ID);
        mock.queue_ok(&[0x80]);
        mock.queue_ok(&[]);
        mock.queue_ok(&[]);

        let format = reader.configure_track(2, true, false).unwrap();
        assert_eq!(format.to_byte(), 0x84);
        let writes = mock.feature_writes();
        assert_eq!(writes[1][3], 0x84);
        assert_eq!(writes[2][0], CMD_RESET_DEVICE);
    }

    #[test]
    fn test_configure_track_keeps_upper_bits() {
        for (reported, expected) in [(0x40u8, 0x44u8), (0xC0, 0xC4), (0x45, 0x45)] {
            let (mut reader, mock) = connect(KB_PRODUCT_ID);
            mock.queue_ok(&[reported]);
            mock.queue_ok(&[]);
            mock.queue_ok(&[]);

            let format = reader.configure_track(2, true, false).unwrap();
            assert_eq!(format.to_byte(), expected, "device reported {reported:#04X}");
            assert_eq!(mock.feature_writes()[1][3], expected);
        }
    }

    #[test]
    fn test_configure_invalid_track_sends_nothing_more() {
        let (mut reader, mock) = connect(KB_PRODUCT_ID);
        mock.queue_ok(&[0x95]);
        assert!(matches!(
            reader.configure_track(4, false, false),
            Err(MagtekError::InvalidArgument(_))
        ));
        assert_eq!(mock.feature_writes().len(), 1);
    }

    #[test]
    fn test_short_write() {
        let (mut reader, mock) = connect(KB_PRODUCT_ID);
        mock.short_write_next(10);
        let err = reader.reset_device().unwrap_err();
        assert!(matches!(
            err,
            MagtekError::TransportFailure {
                source: TransportError::ShortWrite { written: 10, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_read_card_raw_hid() {
        let (mut reader, mock) = connect(HID_PRODUCT_ID);
        for chunk in sample_report().chunks(64) {
            mock.queue_input(chunk);
        }

        let swipe = reader.read_card(None).unwrap().into_swipe().unwrap();
        assert_eq!(swipe.track(1).unwrap(), None);
        assert_eq!(swipe.track(2).unwrap().unwrap().len(), 37);
    }

    #[test]
    fn test_read_card_keyboard_mode() {
        let (mut reader, _mock) = connect(KB_PRODUCT_ID);
        assert!(matches!(
            reader.read_card(None),
            Err(MagtekError::UnsupportedMode(DeviceMode::KbEmulation))
        ));
    }
}
