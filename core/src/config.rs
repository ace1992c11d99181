//! Receiver tuning parameters.
//!
//! Everything empirically tuned lives here rather than as derived constants:
//! rogue-run divisors, the symbol slot tolerance, snap distances and the
//! listening schedule are all injected per session and fixed while it runs.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result};
use crate::header;
use crate::image;
use crate::{CAL_DATUM_HZ, CAL_LOW_HZ, PALETTE_SIZE};

/// Scalar frequency correction added to every expected frequency before
/// matching. Updated at most once per session; zero until tone-pair
/// calibration is wired up.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CalibrationState {
    pub offset_hz: f64,
}

impl CalibrationState {
    pub fn apply(&self, frequency: f64) -> f64 {
        frequency + self.offset_hz
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Expected sample rate of the capture source.
    pub sample_rate: u32,
    /// Analysis window length in samples.
    pub block_size: usize,
    /// Hop between analysis ticks, milliseconds.
    pub analysis_tick_ms: u64,
    /// Duration of one transmitted tone, milliseconds.
    pub tone_duration_ms: u64,

    /// Dynamic threshold factor: threshold = mean + sigma * stddev.
    pub threshold_sigma: f64,
    /// Absolute magnitude floor a detection must also clear.
    pub magnitude_floor: f64,

    /// Header symbol slots per repetition (padded with spaces).
    pub header_symbols: usize,
    /// Header repetition count for majority voting.
    pub header_repeats: usize,
    /// Per-line repetition count for the image.
    pub image_repeats: usize,
    /// Image geometry.
    pub image_lines: usize,
    pub pixels_per_line: usize,

    /// Rogue-tone minimum run = ticks-per-tone / divisor, per stage.
    pub header_min_run_divisor: u64,
    pub image_min_run_divisor: u64,

    /// Symbol window half-width as a fraction of tone duration.
    pub slot_tolerance: f64,
    /// Minimum detection ticks inside a slot window before the slot
    /// resolves. A tone fills its own slot's window but bleeds only a few
    /// trailing ticks into an adjacent silent slot; requiring most of the
    /// window keeps pad slots silent.
    pub slot_min_ticks: usize,
    /// Nearest-frequency snap distances, Hz.
    pub header_snap_hz: f64,
    pub palette_snap_hz: f64,

    /// Datum search bound, seconds from listening start.
    pub sync_search_secs: f64,
    /// Elapsed listening time before header sync is attempted.
    pub header_sync_delay_secs: f64,
    /// Overall listening window timeout.
    pub listen_timeout_secs: f64,

    /// Listening windows start at offset seconds into each repeating
    /// wall-clock interval.
    pub schedule_interval_secs: u64,
    pub schedule_offset_secs: u64,

    /// Cadence of the image reconstruction tick.
    pub image_tick_secs: f64,

    /// Analysis worker pool shape.
    pub analysis_workers: usize,
    pub analysis_queue_depth: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 2048,
            analysis_tick_ms: 10,
            tone_duration_ms: 120,
            threshold_sigma: 2.6,
            magnitude_floor: 1.0,
            header_symbols: 18,
            header_repeats: 3,
            image_repeats: 3,
            image_lines: 32,
            pixels_per_line: 32,
            header_min_run_divisor: 4,
            image_min_run_divisor: 6,
            slot_tolerance: 0.25,
            slot_min_ticks: 5,
            header_snap_hz: 18.0,
            palette_snap_hz: 25.0,
            sync_search_secs: 8.0,
            header_sync_delay_secs: 10.0,
            listen_timeout_secs: 180.0,
            schedule_interval_secs: 900,
            schedule_offset_secs: 30,
            image_tick_secs: 0.5,
            analysis_workers: 2,
            analysis_queue_depth: 64,
        }
    }
}

impl LinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.block_size == 0 {
            return Err(DecodeError::InvalidConfig(
                "sample_rate and block_size must be non-zero".into(),
            ));
        }
        if self.analysis_tick_ms == 0 || self.tone_duration_ms < self.analysis_tick_ms {
            return Err(DecodeError::InvalidConfig(
                "tone duration must cover at least one analysis tick".into(),
            ));
        }
        if self.header_repeats == 0 || self.image_repeats == 0 {
            return Err(DecodeError::InvalidConfig(
                "repetition counts must be non-zero".into(),
            ));
        }
        if self.image_lines == 0 || self.pixels_per_line == 0 {
            return Err(DecodeError::InvalidConfig(
                "image geometry must be non-zero".into(),
            ));
        }
        if !(0.0..=0.5).contains(&self.slot_tolerance) {
            return Err(DecodeError::InvalidConfig(
                "slot_tolerance must lie in [0, 0.5]".into(),
            ));
        }
        if self.slot_min_ticks == 0 {
            return Err(DecodeError::InvalidConfig(
                "slot_min_ticks must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn tone_secs(&self) -> f64 {
        self.tone_duration_ms as f64 / 1000.0
    }

    pub fn tick_secs(&self) -> f64 {
        self.analysis_tick_ms as f64 / 1000.0
    }

    pub fn ticks_per_tone(&self) -> u64 {
        (self.tone_duration_ms / self.analysis_tick_ms).max(1)
    }

    /// Minimum consecutive identical readings for header-stage filtering.
    pub fn header_min_run(&self) -> usize {
        (self.ticks_per_tone() / self.header_min_run_divisor.max(1)).max(1) as usize
    }

    /// Minimum consecutive identical readings for image-stage filtering.
    pub fn image_min_run(&self) -> usize {
        (self.ticks_per_tone() / self.image_min_run_divisor.max(1)).max(1) as usize
    }

    pub fn image_pixels(&self) -> usize {
        self.image_lines * self.pixels_per_line
    }

    /// Analysis window duration in seconds.
    pub fn block_secs(&self) -> f64 {
        self.block_size as f64 / self.sample_rate as f64
    }

    /// Center of the first header symbol slot, in detection-event time.
    ///
    /// Detection ticks for a tone start up to half an analysis window
    /// before the tone does, so event time lags tone time by that half
    /// window. The datum anchor is the last detection tick of the datum
    /// tone and carries the same lag; measuring slot centers from it keeps
    /// both sides in the same clock, and the first data tone's ticks
    /// center half a tone past the anchor.
    pub fn frame_anchor(&self, datum_event_start: f64) -> f64 {
        datum_event_start + 0.5 * self.tone_secs()
    }

    /// Start of the image tone stream in event time: half a tone past the
    /// final header slot's center, where its last ticks have ended.
    pub fn image_start(&self, frame_anchor: f64) -> f64 {
        let header_slots = (self.header_repeats * self.header_symbols) as f64;
        frame_anchor + (header_slots - 0.5) * self.tone_secs()
    }

    /// Every frequency the analyzer evaluates each tick: calibration pair,
    /// header alphabet, image palette.
    pub fn candidate_frequencies(&self) -> Vec<f64> {
        let mut freqs = Vec::with_capacity(2 + header::ALPHABET.len() + PALETTE_SIZE);
        freqs.push(CAL_LOW_HZ);
        freqs.push(CAL_DATUM_HZ);
        freqs.extend(header::alphabet_frequencies());
        freqs.extend((0..PALETTE_SIZE as u8).map(image::palette_frequency));
        freqs
    }

    /// Start of the next listening window at or after `now` (seconds since
    /// the epoch): offset seconds into the next aligned interval.
    pub fn next_window_start(&self, now: f64) -> f64 {
        let interval = self.schedule_interval_secs.max(1) as f64;
        let offset = self.schedule_offset_secs as f64;
        let base = (now / interval).floor() * interval;
        let candidate = base + offset;
        if candidate > now {
            candidate
        } else {
            candidate + interval
        }
    }
}
