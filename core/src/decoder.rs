//! Offline decode front door.
//!
//! Runs a complete recording through the same stages the live session uses:
//! tick-hopped detection passes, rogue filtering, datum synchronization,
//! header extraction with majority voting, then image reconstruction. Used
//! by the CLI and by integration tests; the live path is [`crate::session`].

use std::sync::Arc;

use log::{debug, info};

use crate::analysis::{analyze_request, AnalysisRequest};
use crate::config::{CalibrationState, LinkConfig};
use crate::contact::{score_contact, QualityScores};
use crate::error::{DecodeError, Result};
use crate::fec::majority_rows;
use crate::header::{self, HeaderFrame};
use crate::image::ImageReconstructor;
use crate::symbols::extract_symbols;
use crate::sync::find_datum;
use crate::tones::{collapse_to_tones, drop_rogue_tones, ToneEvent, ToneLog};
use crate::CAL_DATUM_HZ;

#[derive(Clone, Debug)]
pub struct DecodedMessage {
    pub header: HeaderFrame,
    pub grid: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub average_snr_db: f64,
    pub error_count: u32,
    pub scores: QualityScores,
}

pub struct MessageDecoder {
    config: LinkConfig,
    calibration: CalibrationState,
}

impl MessageDecoder {
    pub fn new(config: LinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            calibration: CalibrationState::default(),
        })
    }

    pub fn with_calibration(mut self, calibration: CalibrationState) -> Self {
        self.calibration = calibration;
        self
    }

    /// Decode one full recording into header and image.
    pub fn decode(&self, samples: &[f32], sample_rate: u32) -> Result<DecodedMessage> {
        if sample_rate == 0 {
            return Err(DecodeError::InvalidConfig("sample rate is zero".into()));
        }
        if samples.len() < self.config.block_size {
            return Err(DecodeError::InsufficientData);
        }

        let log = self.detect_tones(samples, sample_rate);
        debug!("{} detection events over {} samples", log.len(), samples.len());

        let (header, anchor) = self.decode_header(&log)?;
        let (image, scores) = self.decode_image(&log, &header, anchor);

        Ok(DecodedMessage {
            header,
            grid: image.grid().to_vec(),
            width: image.width(),
            height: image.height(),
            average_snr_db: image.average_snr_db(),
            error_count: image.error_count(),
            scores,
        })
    }

    /// One detection pass per tick hop over the whole recording.
    fn detect_tones(&self, samples: &[f32], sample_rate: u32) -> ToneLog {
        let expected = Arc::new(self.config.candidate_frequencies());
        let hop = ((sample_rate as u64 * self.config.analysis_tick_ms) / 1000).max(1) as usize;
        let block = self.config.block_size;

        let mut log = ToneLog::new();
        let mut offset = 0;
        while offset + block <= samples.len() {
            let request = AnalysisRequest {
                start: offset as f64 / sample_rate as f64,
                samples: samples[offset..offset + block].to_vec(),
                sample_rate: sample_rate as f64,
                expected: expected.clone(),
                calibration_offset: self.calibration.offset_hz,
            };
            let response = analyze_request(
                &request,
                self.config.magnitude_floor,
                self.config.threshold_sigma,
            );
            if let Some(frequency) = response.detected_frequency {
                log.push(ToneEvent {
                    start: response.start,
                    duration: self.config.tick_secs(),
                    frequency,
                    snr_db: response.snr_db,
                });
            }
            offset += hop;
        }
        log
    }

    /// Synchronize on the datum and majority-decode the header. Returns the
    /// frame anchor alongside so the image stream start can be located.
    fn decode_header(&self, log: &ToneLog) -> Result<(HeaderFrame, f64)> {
        let filtered = drop_rogue_tones(log.events(), self.config.header_min_run());
        let datum = find_datum(&filtered, CAL_DATUM_HZ, self.config.sync_search_secs)
            .ok_or(DecodeError::SyncNotFound)?;

        let anchor = self.config.frame_anchor(datum);
        let slots = extract_symbols(
            &filtered,
            anchor,
            self.config.tone_secs(),
            self.config.header_symbols,
            self.config.header_repeats,
            self.config.slot_tolerance,
            self.config.slot_min_ticks,
        );
        let voted = majority_rows(&slots);
        let frame = header::decode_header(&voted, self.config.header_snap_hz)?;
        Ok((frame, anchor))
    }

    fn decode_image(
        &self,
        log: &ToneLog,
        header: &HeaderFrame,
        anchor: f64,
    ) -> (ImageReconstructor, QualityScores) {
        let image_start = self.config.image_start(anchor);
        let filtered = drop_rogue_tones(log.since(image_start), self.config.image_min_run());
        let tones = collapse_to_tones(&filtered, self.config.tone_secs());

        let mut image = ImageReconstructor::new(&self.config, header.mode.palette_size());
        image.ingest(&tones);
        if !image.is_complete() {
            info!(
                "image incomplete: {}/{} lines rendered",
                image.rendered_lines(),
                image.height()
            );
        }

        let scores = score_contact(
            image.error_count(),
            self.config.image_pixels(),
            image.average_snr_db(),
            None,
        );
        (image, scores)
    }
}
