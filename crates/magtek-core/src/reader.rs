//! Swipe report assembly from the interrupt endpoint.
//!
//! The 337-byte input report is larger than the endpoint's packet size, so
//! it arrives over several reads. Timeouts between packets mean "no swipe
//! yet" and are retried until the caller cancels.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, instrument, trace, warn};

use crate::config::ReaderConfig;
use crate::device::DeviceMode;
use crate::error::{MagtekError, Result};
use crate::protocol::constants::INPUT_REPORT_SIZE;
use crate::protocol::swipe::SwipeData;
use crate::transport::{HidTransport, TransportError};

/// Polled once before every read; returning `true` abandons the swipe.
pub trait CancelCheck {
    fn should_stop(&self) -> bool;
}

impl<F: Fn() -> bool> CancelCheck for F {
    fn should_stop(&self) -> bool {
        self()
    }
}

/// Shared stop flag that another thread can trip.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl CancelCheck for CancellationToken {
    fn should_stop(&self) -> bool {
        self.is_cancelled()
    }
}

/// Result of waiting for a swipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwipeOutcome {
    Swiped(SwipeData),
    Cancelled,
}

impl SwipeOutcome {
    pub fn into_swipe(self) -> Option<SwipeData> {
        match self {
            SwipeOutcome::Swiped(data) => Some(data),
            SwipeOutcome::Cancelled => None,
        }
    }
}

/// Collects one input report from the interrupt endpoint.
#[derive(Debug, Clone)]
pub struct SwipeReader {
    mode: DeviceMode,
    read_timeout: Duration,
    drain_timeout: Duration,
}

impl SwipeReader {
    pub fn new(mode: DeviceMode, config: &ReaderConfig) -> Self {
        Self {
            mode,
            read_timeout: config.read_timeout(),
            drain_timeout: config.drain_timeout(),
        }
    }

    /// Block until a full report is read or `cancel` asks to stop.
    #[instrument(skip_all, fields(mode = %self.mode))]
    pub fn read_swipe<T: HidTransport>(
        &self,
        transport: &mut T,
        cancel: Option<&dyn CancelCheck>,
    ) -> Result<SwipeOutcome> {
        if self.mode != DeviceMode::RawHid {
            return Err(MagtekError::UnsupportedMode(self.mode));
        }

        let packet_size = transport.max_packet_size().max(1);
        let mut report = Vec::with_capacity(INPUT_REPORT_SIZE + packet_size);

        while report.len() < INPUT_REPORT_SIZE {
            if let Some(check) = cancel
                && check.should_stop()
            {
                debug!(bytes = report.len(), "Swipe read cancelled");
                return Ok(SwipeOutcome::Cancelled);
            }

            match transport.read_input(packet_size, self.read_timeout) {
                Ok(packet) => {
                    trace!(len = packet.len(), total = report.len() + packet.len(), "Packet");
                    report.extend_from_slice(&packet);
                }
                Err(TransportError::Timeout { .. }) => continue,
                Err(e) => return Err(MagtekError::transport("Swipe read failed")(e)),
            }
        }

        report.truncate(INPUT_REPORT_SIZE);
        self.drain(transport, packet_size);

        let swipe = SwipeData::decode(&report)?;
        debug!(card_type = %swipe.card_type(), "Swipe received");
        Ok(SwipeOutcome::Swiped(swipe))
    }

    // A second swipe right behind the first would otherwise prefix the next report.
    fn drain<T: HidTransport>(&self, transport: &mut T, packet_size: usize) {
        match transport.read_input(packet_size, self.drain_timeout) {
            Ok(stray) if !stray.is_empty() => debug!(len = stray.len(), "Discarded trailing data"),
            Ok(_) | Err(TransportError::Timeout { .. }) => {}
            Err(e) => warn!(error = %e, "Drain read failed"),
        }
    }
}
