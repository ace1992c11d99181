//! Acoustic picture-message receiver
//!
//! Recovers a short header (sender, recipient, transmission mode) followed by
//! a fixed-size indexed-color image from an audio signal that encodes data as
//! sequential pure tones. The channel carries no out-of-band synchronization;
//! the receiver relies on Goertzel tone detection, adaptive thresholding,
//! datum-anchored timing recovery and repetition FEC with majority voting.

pub mod analysis;
pub mod config;
pub mod contact;
pub mod decoder;
pub mod error;
pub mod fec;
pub mod goertzel;
pub mod header;
pub mod image;
pub mod session;
pub mod symbols;
pub mod sync;
pub mod tones;

pub use config::{CalibrationState, LinkConfig};
pub use contact::{ContactRecord, MetadataLookup, QualityScores, RecordSink, Renderer};
pub use decoder::{DecodedMessage, MessageDecoder};
pub use error::{DecodeError, Result};
pub use header::{HeaderFrame, TransmissionMode};
pub use session::{SessionController, SessionEvent, SessionPhase};
pub use tones::{ToneEvent, ToneLog};

// Frequency plan. Palette tones sit below the header alphabet so a drifted
// image tone never snaps into a header character, and the calibration pair
// sits above everything else.
pub const PALETTE_SIZE: usize = 32;
pub const PALETTE_BASE_HZ: f64 = 400.0;
pub const PALETTE_STEP_HZ: f64 = 55.0;

pub const ALPHABET_BASE_HZ: f64 = 2200.0;
pub const ALPHABET_STEP_HZ: f64 = 40.0;

/// Lower calibration tone.
pub const CAL_LOW_HZ: f64 = 3800.0;
/// Upper calibration tone; its last occurrence before the search bound is the
/// datum marker that anchors the header frame.
pub const CAL_DATUM_HZ: f64 = 3950.0;
