//! Track format property (0x03).
//!
//! One byte: `| x | 0 | t3 t3 | t2 t2 | t1 t1 |` where `x` selects decoding of
//! all card formats versus ISO/ABA only and each `tN` pair is a track mode.
//! The top two bits are kept exactly as the device reported them.

use std::fmt;

use crate::error::{MagtekError, Result};

const TRACK_MASK: u8 = 0b11;
const TRACK_BITS: u32 = 6;
const UPPER_MASK: u8 = 0b11;
/// Upper bits written when decode-all is switched on (bit 7).
const DECODE_ALL_UPPER: u8 = 0b10;

/// Per-track reading mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackMode {
    #[default]
    Disabled,
    Enabled,
    /// Enabled, and a blank track is reported as an error.
    EnabledRequired,
    /// Bit pattern `11`, never written by this crate.
    Reserved,
}

impl TrackMode {
    fn from_bits(bits: u8) -> Self {
        match bits & TRACK_MASK {
            0 => TrackMode::Disabled,
            1 => TrackMode::Enabled,
            2 => TrackMode::EnabledRequired,
            _ => TrackMode::Reserved,
        }
    }

    fn bits(self) -> u8 {
        match self {
            TrackMode::Disabled => 0,
            TrackMode::Enabled => 1,
            TrackMode::EnabledRequired => 2,
            TrackMode::Reserved => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TrackMode::Disabled => "Disabled",
            TrackMode::Enabled => "Enabled",
            TrackMode::EnabledRequired => "Enabled and Required",
            TrackMode::Reserved => "Unknown",
        }
    }
}

impl fmt::Display for TrackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded track format byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackFormat {
    tracks: [TrackMode; 3],
    /// Bits 7:6 of the property byte.
    upper: u8,
}

impl TrackFormat {
    pub fn new(tracks: [TrackMode; 3], decode_all: bool) -> Self {
        Self {
            tracks,
            upper: if decode_all { DECODE_ALL_UPPER } else { 0 },
        }
    }

    pub fn from_byte(value: u8) -> Self {
        let mut tracks = [TrackMode::Disabled; 3];
        for (i, mode) in tracks.iter_mut().enumerate() {
            *mode = TrackMode::from_bits(value >> (2 * i));
        }
        Self {
            tracks,
            upper: (value >> TRACK_BITS) & UPPER_MASK,
        }
    }

    pub fn to_byte(&self) -> u8 {
        let flag = self.upper << TRACK_BITS;
        self.tracks
            .iter()
            .enumerate()
            .fold(flag, |acc, (i, mode)| acc | (mode.bits() << (2 * i)))
    }

    /// Mode of track `track` (1-3).
    pub fn mode(&self, track: u8) -> Result<TrackMode> {
        Ok(self.tracks[track_index(track)?])
    }

    pub fn modes(&self) -> [TrackMode; 3] {
        self.tracks
    }

    pub fn decode_all(&self) -> bool {
        self.upper != 0
    }

    pub fn enable_track(&mut self, track: u8, required: bool) -> Result<()> {
        let mode = if required {
            TrackMode::EnabledRequired
        } else {
            TrackMode::Enabled
        };
        self.tracks[track_index(track)?] = mode;
        Ok(())
    }

    pub fn disable_track(&mut self, track: u8) -> Result<()> {
        self.tracks[track_index(track)?] = TrackMode::Disabled;
        Ok(())
    }

    /// Copy of this format with one track changed.
    pub fn with_track(self, track: u8, mode: TrackMode) -> Result<Self> {
        if mode == TrackMode::Reserved {
            return Err(MagtekError::invalid("reserved track mode"));
        }
        let mut next = self;
        next.tracks[track_index(track)?] = mode;
        Ok(next)
    }

    /// Turning the flag on leaves any upper bits the device already set.
    pub fn with_decode_all(self, decode_all: bool) -> Self {
        let upper = match (decode_all, self.upper) {
            (false, _) => 0,
            (true, 0) => DECODE_ALL_UPPER,
            (true, bits) => bits,
        };
        Self { upper, ..self }
    }
}

impl From<u8> for TrackFormat {
    fn from(value: u8) -> Self {
        Self::from_byte(value)
    }
}

impl From<TrackFormat> for u8 {
    fn from(format: TrackFormat) -> Self {
        format.to_byte()
    }
}

impl fmt::Display for TrackFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, mode) in self.tracks.iter().enumerate() {
            writeln!(f, "Track {}: {}", i + 1, mode)?;
        }
        if self.decode_all() {
            writeln!(f, "Decode all card formats")
        } else {
            writeln!(f, "Decode ISO/ABA only")
        }
    }
}

pub(crate) fn track_index(track: u8) -> Result<usize> {
    match track {
        1..=3 => Ok(track as usize - 1),
        _ => Err(MagtekError::invalid(format!("invalid track number: {track}"))),
    }
}
