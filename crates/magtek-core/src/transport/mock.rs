//! Mock USB transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::traits::{HidTransport, TransportError, UsbBus};
use crate::protocol::constants::{FEATURE_REPORT_SIZE, MAGTEK_VENDOR_ID, RC_SUCCESS};

/// Scripted result of one interrupt read.
#[derive(Debug, Clone)]
pub enum MockRead {
    Data(Vec<u8>),
    Timeout,
    Error(String),
}

#[derive(Debug, Default)]
struct MockState {
    /// Queued GET_REPORT replies.
    feature_queue: VecDeque<Vec<u8>>,
    /// Queued interrupt reads.
    input_queue: VecDeque<MockRead>,
    /// Captured SET_REPORT payloads.
    feature_log: Vec<Vec<u8>>,
    /// Timeouts passed to each interrupt read.
    read_log: Vec<Duration>,
    detach_calls: usize,
    configure_calls: usize,
    reset_calls: usize,
    /// Bytes reported written by the next SET_REPORT, if overridden.
    short_write: Option<usize>,
    fail_detach: bool,
}

/// Mock transport for unit testing controller and reader logic.
///
/// Clones share state, so a test can keep one handle while the
/// controller owns another.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    vid: u16,
    pid: u16,
    max_packet: usize,
}

impl MockTransport {
    pub fn new(pid: u16) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            vid: MAGTEK_VENDOR_ID,
            pid,
            max_packet: 64,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only means another test thread panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a raw GET_REPORT reply.
    pub fn queue_feature(&self, reply: &[u8]) {
        self.state().feature_queue.push_back(reply.to_vec());
    }

    /// Queue a 24-byte reply built from a status byte and payload.
    pub fn queue_response(&self, status: u8, payload: &[u8]) {
        let mut reply = vec![0u8; FEATURE_REPORT_SIZE];
        reply[0] = status;
        reply[1] = payload.len() as u8;
        reply[2..2 + payload.len()].copy_from_slice(payload);
        self.queue_feature(&reply);
    }

    /// Queue a successful reply.
    pub fn queue_ok(&self, payload: &[u8]) {
        self.queue_response(RC_SUCCESS, payload);
    }

    pub fn queue_input(&self, packet: &[u8]) {
        self.state()
            .input_queue
            .push_back(MockRead::Data(packet.to_vec()));
    }

    pub fn queue_read(&self, read: MockRead) {
        self.state().input_queue.push_back(read);
    }

    /// Get all captured SET_REPORT payloads.
    pub fn feature_writes(&self) -> Vec<Vec<u8>> {
        self.state().feature_log.clone()
    }

    /// Timeouts of every interrupt read issued so far.
    pub fn reads(&self) -> Vec<Duration> {
        self.state().read_log.clone()
    }

    /// Number of input packets still queued.
    pub fn pending_input(&self) -> usize {
        self.state().input_queue.len()
    }

    pub fn detach_calls(&self) -> usize {
        self.state().detach_calls
    }

    pub fn configure_calls(&self) -> usize {
        self.state().configure_calls
    }

    pub fn reset_calls(&self) -> usize {
        self.state().reset_calls
    }

    /// Make the next SET_REPORT report only `written` bytes.
    pub fn short_write_next(&self, written: usize) {
        self.state().short_write = Some(written);
    }

    /// Make kernel driver detachment fail as it does without permissions.
    pub fn fail_detach(&self) {
        self.state().fail_detach = true;
    }

    pub fn set_max_packet_size(&mut self, size: usize) {
        self.max_packet = size;
    }
}

impl HidTransport for MockTransport {
    fn detach_kernel_driver(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        state.detach_calls += 1;
        if state.fail_detach {
            return Err(TransportError::ClaimInterfaceFailed {
                interface: 0,
                message: "Access denied (insufficient permissions)".into(),
            });
        }
        Ok(())
    }

    fn set_configuration(&mut self) -> Result<(), TransportError> {
        self.state().configure_calls += 1;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.state().reset_calls += 1;
        Ok(())
    }

    fn set_feature_report(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state();
        state.feature_log.push(data.to_vec());
        Ok(state.short_write.take().unwrap_or(data.len()))
    }

    fn get_feature_report(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut reply = self
            .state()
            .feature_queue
            .pop_front()
            .ok_or(TransportError::Timeout { timeout_ms: 1000 })?;
        reply.truncate(len);
        Ok(reply)
    }

    fn read_input(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state();
        state.read_log.push(timeout);
        let timeout_ms = timeout.as_millis() as u64;
        match state.input_queue.pop_front() {
            Some(MockRead::Data(mut packet)) => {
                packet.truncate(max_len);
                Ok(packet)
            }
            Some(MockRead::Error(message)) => Err(TransportError::ReadFailed(message)),
            Some(MockRead::Timeout) | None => Err(TransportError::Timeout { timeout_ms }),
        }
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

/// Mock bus holding a fixed set of attached readers.
#[derive(Debug, Default, Clone)]
pub struct MockBus {
    devices: Vec<MockTransport>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: MockTransport) -> Self {
        self.devices.push(device);
        self
    }
}

impl UsbBus for MockBus {
    type Transport = MockTransport;

    fn open(&self, vid: u16, pid: u16) -> Result<MockTransport, TransportError> {
        self.devices
            .iter()
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .cloned()
            .ok_or(TransportError::DeviceNotFound { vid, pid })
    }
}
