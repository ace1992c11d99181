//! Header alphabet and frame parsing.
//!
//! Header symbols snap to a character-to-frequency alphabet by nearest
//! match; symbols with no alphabet tone within the snap distance become the
//! pad marker. The decoded string carries exactly three delimited fields:
//! sender, recipient and transmission mode. A wrong delimiter count is a
//! hard parse error surfaced to the caller, never silently defaulted.

use std::fmt;
use std::str::FromStr;

use log::info;

use crate::error::{DecodeError, Result};
use crate::{ALPHABET_BASE_HZ, ALPHABET_STEP_HZ};

/// Characters with a tone assignment, in frequency order.
pub const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-";

/// Pad / unknown marker. Has no tone; pad slots are silence on the air.
pub const PAD: char = ' ';

pub const FIELD_DELIMITER: char = '-';

/// Tone frequency for an alphabet character.
pub fn char_frequency(c: char) -> Result<f64> {
    let idx = ALPHABET
        .chars()
        .position(|a| a == c)
        .ok_or(DecodeError::UnmappedCharacter(c))?;
    Ok(ALPHABET_BASE_HZ + idx as f64 * ALPHABET_STEP_HZ)
}

/// The full alphabet tone table, aligned with [`ALPHABET`].
pub fn alphabet_frequencies() -> Vec<f64> {
    (0..ALPHABET.len())
        .map(|i| ALPHABET_BASE_HZ + i as f64 * ALPHABET_STEP_HZ)
        .collect()
}

/// Alphabet mapping in the encode direction, one tone per character.
/// Pad characters carry no tone and are skipped by transmitters; here they
/// are rejected so callers cannot build an untransmittable sequence.
pub fn frequencies_for(text: &str) -> Result<Vec<f64>> {
    text.chars().map(char_frequency).collect()
}

/// Nearest alphabet character within `snap_hz`, or the pad marker.
pub fn snap_to_char(frequency: f64, snap_hz: f64) -> char {
    let mut best: Option<(char, f64)> = None;
    for (i, c) in ALPHABET.chars().enumerate() {
        let tone = ALPHABET_BASE_HZ + i as f64 * ALPHABET_STEP_HZ;
        let distance = (frequency - tone).abs();
        if distance <= snap_hz && best.map_or(true, |(_, d)| distance < d) {
            best = Some((c, distance));
        }
    }
    best.map_or(PAD, |(c, _)| c)
}

/// Turn majority-resolved slot frequencies into the header string.
/// Unresolved slots (`None`) decode as the pad marker.
pub fn decode_string(frequencies: &[Option<f64>], snap_hz: f64) -> String {
    frequencies
        .iter()
        .map(|f| f.map_or(PAD, |f| snap_to_char(f, snap_hz)))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransmissionMode {
    Color8,
    Color16,
    Color32,
}

impl TransmissionMode {
    /// Palette entries actually used by this mode.
    pub fn palette_size(&self) -> usize {
        match self {
            TransmissionMode::Color8 => 8,
            TransmissionMode::Color16 => 16,
            TransmissionMode::Color32 => 32,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TransmissionMode::Color8 => "8C",
            TransmissionMode::Color16 => "16C",
            TransmissionMode::Color32 => "32C",
        }
    }
}

impl FromStr for TransmissionMode {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "8C" => Ok(TransmissionMode::Color8),
            "16C" => Ok(TransmissionMode::Color16),
            "32C" => Ok(TransmissionMode::Color32),
            other => Err(DecodeError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for TransmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Decoded header: write-once per session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderFrame {
    pub sender: String,
    pub recipient: String,
    pub mode: TransmissionMode,
}

impl fmt::Display for HeaderFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.sender, FIELD_DELIMITER, self.recipient, FIELD_DELIMITER, self.mode
        )
    }
}

/// Parse the decoded header string. Trailing pad is stripped first; the
/// remainder must split into exactly three fields.
pub fn parse_header(text: &str) -> Result<HeaderFrame> {
    let trimmed = text.trim_matches(PAD);
    let fields: Vec<&str> = trimmed.split(FIELD_DELIMITER).collect();
    if fields.len() != 3 {
        return Err(DecodeError::HeaderFieldCount {
            found: fields.len(),
        });
    }

    let frame = HeaderFrame {
        sender: fields[0].to_string(),
        recipient: fields[1].to_string(),
        mode: fields[2].parse()?,
    };
    info!("header decoded: {frame}");
    Ok(frame)
}

/// Snap and parse in one step, from majority-voted slot frequencies.
pub fn decode_header(frequencies: &[Option<f64>], snap_hz: f64) -> Result<HeaderFrame> {
    parse_header(&decode_string(frequencies, snap_hz))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_is_collision_free() {
        let freqs = alphabet_frequencies();
        assert_eq!(freqs.len(), 37);
        for pair in freqs.windows(2) {
            assert!((pair[1] - pair[0] - ALPHABET_STEP_HZ).abs() < 1e-9);
        }
    }

    #[test]
    fn test_snap_within_tolerance() {
        let f = char_frequency('K').unwrap();
        assert_eq!(snap_to_char(f, 18.0), 'K');
        assert_eq!(snap_to_char(f + 10.0, 18.0), 'K');
        assert_eq!(snap_to_char(f - 17.9, 18.0), 'K');
    }

    #[test]
    fn test_snap_miss_is_pad() {
        // Halfway between two tones and beyond the snap distance.
        assert_eq!(snap_to_char(ALPHABET_BASE_HZ + 20.0, 18.0), PAD);
        assert_eq!(snap_to_char(100.0, 18.0), PAD);
    }

    #[test]
    fn test_header_roundtrip() {
        let text = "AB1CD-XY2ZT-32C";
        let freqs: Vec<Option<f64>> = frequencies_for(text)
            .unwrap()
            .into_iter()
            .map(Some)
            .collect();

        let frame = decode_header(&freqs, 18.0).unwrap();
        assert_eq!(frame.sender, "AB1CD");
        assert_eq!(frame.recipient, "XY2ZT");
        assert_eq!(frame.mode, TransmissionMode::Color32);
        assert_eq!(frame.to_string(), text);
    }

    #[test]
    fn test_padded_header_parses() {
        let frame = parse_header("AB1CD-XY2ZT-16C   ").unwrap();
        assert_eq!(frame.recipient, "XY2ZT");
        assert_eq!(frame.mode, TransmissionMode::Color16);
    }

    #[test]
    fn test_wrong_field_count_is_an_error() {
        match parse_header("AB1CD-XY2ZT") {
            Err(DecodeError::HeaderFieldCount { found }) => assert_eq!(found, 2),
            other => panic!("expected field count error, got {other:?}"),
        }
        assert!(parse_header("A-B-C-D").is_err());
    }

    #[test]
    fn test_unknown_mode_is_an_error() {
        assert!(matches!(
            parse_header("AB1CD-XY2ZT-99Z"),
            Err(DecodeError::UnknownMode(_))
        ));
    }

    #[test]
    fn test_unresolved_slots_decode_as_pad() {
        let freqs = vec![Some(char_frequency('A').unwrap()), None];
        assert_eq!(decode_string(&freqs, 18.0), "A ");
    }

    #[test]
    fn test_pad_has_no_tone() {
        assert!(frequencies_for("A B").is_err());
    }
}
