//! nusb-based USB transport implementation.

use std::io::{ErrorKind, Read};
use std::thread;
use std::time::{Duration, Instant};

use nusb::io::EndpointRead;
use nusb::transfer::{ControlIn, ControlOut, ControlType, In, Interrupt, Recipient};
use nusb::{Device, DeviceInfo, Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use super::traits::{HidTransport, TransportError, UsbBus};
use crate::protocol::constants::{
    BREQ_GET_REPORT, BREQ_SET_REPORT, FEATURE_REPORT_WVALUE, HID_INTERFACE, USB_CONFIGURATION,
};

/// How long to wait for the reader to come back after a bus reset.
const REENUMERATE_TIMEOUT: Duration = Duration::from_secs(3);

/// Opens readers through nusb.
#[derive(Debug, Clone)]
pub struct NusbBus {
    control_timeout: Duration,
}

impl NusbBus {
    pub fn new(control_timeout: Duration) -> Self {
        Self { control_timeout }
    }
}

impl UsbBus for NusbBus {
    type Transport = NusbTransport;

    fn open(&self, vid: u16, pid: u16) -> Result<NusbTransport, TransportError> {
        NusbTransport::open_with_ids(vid, pid, self.control_timeout)
    }
}

/// nusb-based USB transport.
pub struct NusbTransport {
    device: Device,
    interface: Option<Interface>,
    reader: Option<EndpointRead<Interrupt>>,
    in_endpoint: u8,
    max_packet: usize,
    control_timeout: Duration,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open a device with specific VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(
        vid: u16,
        pid: u16,
        control_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let device_info = find_device(vid, pid)?;
        let device = open_device(&device_info)?;
        let (in_endpoint, max_packet) = find_interrupt_in(&device)?;

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            max_packet,
            "Device opened successfully"
        );

        Ok(Self {
            device,
            interface: None,
            reader: None,
            in_endpoint,
            max_packet,
            control_timeout,
            vid,
            pid,
        })
    }

    fn claim(&mut self) -> Result<&Interface, TransportError> {
        if self.interface.is_none() {
            let interface = self
                .device
                .detach_and_claim_interface(HID_INTERFACE)
                .wait()
                .map_err(|e| TransportError::ClaimInterfaceFailed {
                    interface: HID_INTERFACE,
                    message: e.to_string(),
                })?;
            debug!(interface = HID_INTERFACE, "Interface claimed");
            self.interface = Some(interface);
        }
        self.interface.as_ref().ok_or(TransportError::Disconnected)
    }

    fn reader(&mut self) -> Result<&mut EndpointRead<Interrupt>, TransportError> {
        if self.reader.is_none() {
            let (addr, packet) = (self.in_endpoint, self.max_packet);
            let ep = self
                .claim()?
                .endpoint::<Interrupt, In>(addr)
                .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
            self.reader = Some(ep.reader(packet));
        }
        self.reader.as_mut().ok_or(TransportError::Disconnected)
    }
}

impl HidTransport for NusbTransport {
    fn detach_kernel_driver(&mut self) -> Result<(), TransportError> {
        self.claim().map(|_| ())
    }

    fn set_configuration(&mut self) -> Result<(), TransportError> {
        if let Ok(active) = self.device.active_configuration()
            && active.configuration_value() == USB_CONFIGURATION
        {
            debug!(configuration = USB_CONFIGURATION, "Configuration already active");
            return Ok(());
        }
        // usbfs refuses SETCONFIGURATION while any interface is claimed.
        self.reader = None;
        self.interface = None;
        self.device
            .set_configuration(USB_CONFIGURATION)
            .wait()
            .map_err(|e| TransportError::OpenFailed(format!("set configuration: {e}")))
    }

    #[instrument(skip(self))]
    fn reset(&mut self) -> Result<(), TransportError> {
        self.reader = None;
        self.interface = None;
        self.device
            .reset()
            .wait()
            .map_err(|e| TransportError::OpenFailed(format!("reset: {e}")))?;

        // The old handle is dead once the device re-enumerates.
        let start = Instant::now();
        let info = loop {
            match find_device(self.vid, self.pid) {
                Ok(info) => break info,
                Err(TransportError::DeviceNotFound { .. })
                    if start.elapsed() < REENUMERATE_TIMEOUT =>
                {
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => return Err(e),
            }
        };
        self.device = open_device(&info)?;
        info!("Device re-opened after reset");
        Ok(())
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn set_feature_report(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let timeout = self.control_timeout;
        self.claim()?
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: BREQ_SET_REPORT,
                    value: FEATURE_REPORT_WVALUE,
                    index: HID_INTERFACE as u16,
                    data,
                },
                timeout,
            )
            .wait()
            .map_err(|e| TransportError::ControlFailed(format!("SET_REPORT: {e}")))?;
        debug!(bytes_written = data.len(), "Feature report sent");
        Ok(data.len())
    }

    #[instrument(skip(self))]
    fn get_feature_report(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let timeout = self.control_timeout;
        let reply = self
            .claim()?
            .control_in(
                ControlIn {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: BREQ_GET_REPORT,
                    value: FEATURE_REPORT_WVALUE,
                    index: HID_INTERFACE as u16,
                    length: len as u16,
                },
                timeout,
            )
            .wait()
            .map_err(|e| TransportError::ControlFailed(format!("GET_REPORT: {e}")))?;
        debug!(bytes_read = reply.len(), "Feature report received");
        Ok(reply)
    }

    #[instrument(skip(self), level = "trace")]
    fn read_input(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let reader = self.reader()?;
        reader.set_read_timeout(timeout);

        let mut buf = vec![0u8; max_len];
        let n = reader.read(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::TimedOut => TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            },
            _ => TransportError::ReadFailed(e.to_string()),
        })?;

        buf.truncate(n);
        debug!(bytes_read = n, "Read complete");
        Ok(buf)
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

fn find_device(vid: u16, pid: u16) -> Result<DeviceInfo, TransportError> {
    list_devices()
        .wait()
        .map_err(|e| TransportError::OpenFailed(e.to_string()))?
        .find(|d| d.vendor_id() == vid && d.product_id() == pid)
        .ok_or(TransportError::DeviceNotFound { vid, pid })
}

fn open_device(device_info: &DeviceInfo) -> Result<Device, TransportError> {
    info!(
        vendor_id = %format!("{:04X}", device_info.vendor_id()),
        product_id = %format!("{:04X}", device_info.product_id()),
        "Found device"
    );
    device_info
        .open()
        .wait()
        .map_err(|e| TransportError::OpenFailed(e.to_string()))
}

/// Locate the interrupt IN endpoint of the HID interface.
fn find_interrupt_in(device: &Device) -> Result<(u8, usize), TransportError> {
    for config in device.configurations() {
        for iface in config.interfaces() {
            if iface.interface_number() != HID_INTERFACE {
                continue;
            }
            for alt in iface.alt_settings() {
                for ep in alt.endpoints() {
                    if ep.transfer_type() == nusb::descriptors::TransferType::Interrupt
                        && ep.direction() == nusb::transfer::Direction::In
                    {
                        return Ok((ep.address(), ep.max_packet_size()));
                    }
                }
            }
        }
    }

    Err(TransportError::EndpointNotFound {
        ep_type: "Interrupt".into(),
        direction: "In".into(),
    })
}
