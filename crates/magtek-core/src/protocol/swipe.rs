//! Card swipe input report decoding.
//!
//! Layout of the 337-byte input report:
//!
//! | Offset  | Size | Field                         |
//! |---------|------|-------------------------------|
//! | 0       | 3    | Decode status, tracks 1-3     |
//! | 3       | 3    | Data length, tracks 1-3       |
//! | 6       | 1    | Card type                     |
//! | 7       | 109  | Track 1 data                  |
//! | 117     | 109  | Track 2 data                  |
//! | 227     | 109  | Track 3 data                  |
//!
//! Bytes 116, 226 and 336 are reserved.

use std::fmt;

use crate::error::{MagtekError, Result};
use crate::protocol::constants::{INPUT_REPORT_SIZE, TRACK_DATA_SIZE};
use crate::protocol::track_format::track_index;

const STATUS_OFFSET: usize = 0;
const LENGTH_OFFSET: usize = 3;
const CARD_TYPE_OFFSET: usize = 6;
const TRACK_OFFSETS: [usize; 3] = [7, 117, 227];

/// Card type reported by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardType {
    IsoAba,
    Aamva,
    Cadl,
    Blank,
    Other,
    Undetermined,
    None,
    Unknown(u8),
}

impl CardType {
    pub fn from_byte(value: u8) -> Self {
        match value {
            0 => CardType::IsoAba,
            1 => CardType::Aamva,
            2 => CardType::Cadl,
            3 => CardType::Blank,
            4 => CardType::Other,
            5 => CardType::Undetermined,
            6 => CardType::None,
            other => CardType::Unknown(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CardType::IsoAba => "ISO/ABA",
            CardType::Aamva => "AAMVA",
            CardType::Cadl => "CADL",
            CardType::Blank => "Blank",
            CardType::Other => "Other",
            CardType::Undetermined => "Undetermined",
            CardType::None => "None",
            CardType::Unknown(_) => "Unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, CardType::Unknown(_))
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardType::Unknown(v) => write!(f, "Unknown (0x{v:02X})"),
            known => f.write_str(known.name()),
        }
    }
}

/// One decoded swipe. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct SwipeData {
    decode_status: [u8; 3],
    lengths: [u8; 3],
    card_type: CardType,
    tracks: [[u8; TRACK_DATA_SIZE]; 3],
    raw: Vec<u8>,
}

impl SwipeData {
    /// Decode a complete input report. Anything other than 337 bytes is rejected.
    pub fn decode(report: &[u8]) -> Result<Self> {
        if report.len() != INPUT_REPORT_SIZE {
            return Err(MagtekError::invalid(format!(
                "swipe data must be {} bytes, got {}",
                INPUT_REPORT_SIZE,
                report.len()
            )));
        }

        let mut decode_status = [0u8; 3];
        decode_status.copy_from_slice(&report[STATUS_OFFSET..STATUS_OFFSET + 3]);
        let mut lengths = [0u8; 3];
        lengths.copy_from_slice(&report[LENGTH_OFFSET..LENGTH_OFFSET + 3]);

        let mut tracks = [[0u8; TRACK_DATA_SIZE]; 3];
        for (track, &offset) in tracks.iter_mut().zip(TRACK_OFFSETS.iter()) {
            track.copy_from_slice(&report[offset..offset + TRACK_DATA_SIZE]);
        }

        Ok(Self {
            decode_status,
            lengths,
            card_type: CardType::from_byte(report[CARD_TYPE_OFFSET]),
            tracks,
            raw: report.to_vec(),
        })
    }

    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    /// Raw decode status byte; nonzero means the reader hit an error.
    pub fn decode_status(&self, track: u8) -> Result<u8> {
        Ok(self.decode_status[track_index(track)?])
    }

    pub fn track_ok(&self, track: u8) -> Result<bool> {
        Ok(self.decode_status(track)? == 0)
    }

    pub fn track_length(&self, track: u8) -> Result<usize> {
        Ok(self.lengths[track_index(track)?] as usize)
    }

    /// Track bytes bounded by the recorded length.
    pub fn raw_track(&self, track: u8) -> Result<&[u8]> {
        let idx = track_index(track)?;
        let len = (self.lengths[idx] as usize).min(TRACK_DATA_SIZE);
        Ok(&self.tracks[idx][..len])
    }

    /// Track contents as text, or `None` when the reader flagged the track.
    pub fn track(&self, track: u8) -> Result<Option<String>> {
        if !self.track_ok(track)? {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(self.raw_track(track)?).into_owned()))
    }

    /// The full report as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

impl fmt::Debug for SwipeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwipeData")
            .field("card_type", &self.card_type)
            .field("decode_status", &self.decode_status)
            .field("lengths", &self.lengths)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for SwipeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.card_type.is_known() {
            writeln!(f, "Unknown/malformed swipe data ({})", self.card_type)?;
            return writeln!(f, "Raw report data: {:?}", self.raw);
        }

        writeln!(f, "Card type: {}", self.card_type)?;
        for (i, track) in (1u8..=3).enumerate() {
            let len = (self.lengths[i] as usize).min(TRACK_DATA_SIZE);
            let data = &self.tracks[i][..len];
            let status = if self.decode_status[i] == 0 { "OK" } else { "Error" };
            writeln!(f, "Track {track} Decode: {status}")?;
            writeln!(f, "Track {track} Length: {}", self.lengths[i])?;
            writeln!(f, "Track {track} Raw Data: {data:?}")?;
            writeln!(f, "Track {track} String Data: {}", String::from_utf8_lossy(data))?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TRACK2: &[u8] = b";4111111111111111=25121010000000000?";

    /// Report with track 1 in error, track 2 holding `TRACK2` plus padding to
    /// 37 bytes, track 3 empty.
    pub(crate) fn sample_report() -> Vec<u8> {
        let mut report = vec![0u8; INPUT_REPORT_SIZE];
        report[0] = 1;
        report[3] = 12;
        report[4] = 37;
        report[6] = 0;
        report[7..19].copy_from_slice(b"%B4111GARBLE");
        report[117..117 + TRACK2.len()].copy_from_slice(TRACK2);
        report[117 + TRACK2.len()] = b'X';
        report
    }

    #[test]
    fn test_track_two_text() {
        let swipe = SwipeData::decode(&sample_report()).unwrap();
        let text = swipe.track(2).unwrap().unwrap();
        assert_eq!(text.len(), 37);
        assert!(text.starts_with(std::str::from_utf8(TRACK2).unwrap()));
        assert!(text.ends_with('X'));
        assert_eq!(swipe.raw_track(2).unwrap().len(), 37);
    }

    #[test]
    fn test_errored_track_is_no_data() {
        let swipe = SwipeData::decode(&sample_report()).unwrap();
        assert_eq!(swipe.track(1).unwrap(), None);
        assert!(!swipe.track_ok(1).unwrap());
        // Raw bytes are still reachable for diagnostics.
        assert_eq!(swipe.raw_track(1).unwrap(), b"%B4111GARBLE");
    }

    #[test]
    fn test_empty_track_is_empty_string() {
        let swipe = SwipeData::decode(&sample_report()).unwrap();
        assert_eq!(swipe.track(3).unwrap(), Some(String::new()));
    }

    #[test]
    fn test_wrong_size_rejected() {
        let err = SwipeData::decode(&[0u8; 300]).unwrap_err();
        assert!(matches!(err, MagtekError::InvalidArgument(_)));
        assert!(SwipeData::decode(&[0u8; INPUT_REPORT_SIZE + 1]).is_err());
    }

    #[test]
    fn test_invalid_track_number() {
        let swipe = SwipeData::decode(&sample_report()).unwrap();
        assert!(matches!(swipe.track(0), Err(MagtekError::InvalidArgument(_))));
        assert!(matches!(swipe.track(4), Err(MagtekError::InvalidArgument(_))));
    }

    #[test]
    fn test_length_clamped_to_field() {
        let mut report = sample_report();
        report[5] = 0xFF;
        report[2] = 0;
        let swipe = SwipeData::decode(&report).unwrap();
        assert_eq!(swipe.raw_track(3).unwrap().len(), TRACK_DATA_SIZE);
        assert_eq!(swipe.track_length(3).unwrap(), 0xFF);
    }

    #[test]
    fn test_display() {
        let text = SwipeData::decode(&sample_report()).unwrap().to_string();
        assert!(text.contains("Card type: ISO/ABA"));
        assert!(text.contains("Track 1 Decode: Error"));
        assert!(text.contains("Track 2 Decode: OK"));
        assert!(text.contains("Track 2 Length: 37"));
        assert!(text.contains("Track 3 Raw Data: []"));
    }

    #[test]
    fn test_display_unknown_card_type() {
        let mut report = sample_report();
        report[6] = 0x42;
        let swipe = SwipeData::decode(&report).unwrap();
        assert_eq!(swipe.card_type(), CardType::Unknown(0x42));
        let text = swipe.to_string();
        assert!(text.starts_with("Unknown/malformed swipe data"));
    }
}
