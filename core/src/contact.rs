//! Completed-contact record and the outward collaborator seams.
//!
//! The core never touches presentation or storage details: it hands the
//! progressive grid to a [`Renderer`], the finished record to a
//! [`RecordSink`], and asks a [`MetadataLookup`] for the sender's distance.
//! All three may be slow, absent or failing without affecting decode.

use log::warn;

use crate::error::Result;
use crate::header::HeaderFrame;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QualityScores {
    /// Signal quality, 0..100, from average SNR and the decode error ratio.
    pub quality: f64,
    /// Rarity: quality weighted by contact distance.
    pub rarity: f64,
}

/// Everything a completed listening session produces.
#[derive(Clone, Debug)]
pub struct ContactRecord {
    pub header: HeaderFrame,
    pub grid: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub average_snr_db: f64,
    pub error_count: u32,
    pub scores: QualityScores,
    /// Seconds since the epoch at completion.
    pub timestamp: f64,
    pub distance_km: Option<f64>,
}

/// Progressive display surface. Called after every grid update with the
/// lines decoded so far; the core does not depend on rendering succeeding.
pub trait Renderer {
    fn render(&mut self, grid: &[u8], width: usize, rendered_lines: usize);
}

/// Persistence for completed records. Failure is logged, never retried.
pub trait RecordSink {
    fn store(&mut self, record: &ContactRecord) -> Result<()>;
}

/// Callsign-to-distance annotation. `None` when the callsign is unknown or
/// the lookup is unavailable.
pub trait MetadataLookup {
    fn distance_km(&self, callsign: &str) -> Option<f64>;
}

/// Collaborators that do nothing, for headless decoding and tests.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _grid: &[u8], _width: usize, _rendered_lines: usize) {}
}

#[derive(Debug, Default)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn store(&mut self, _record: &ContactRecord) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NullLookup;

impl MetadataLookup for NullLookup {
    fn distance_km(&self, _callsign: &str) -> Option<f64> {
        None
    }
}

/// Score a completed contact from its error count, average SNR and distance.
/// Quality blends an SNR term (30 dB and up counts as full strength) with
/// the fraction of pixels decoded without fallback; rarity scales quality by
/// the order of magnitude of the distance.
pub fn score_contact(
    error_count: u32,
    total_pixels: usize,
    average_snr_db: f64,
    distance_km: Option<f64>,
) -> QualityScores {
    let snr_term = (average_snr_db / 30.0).clamp(0.0, 1.0);
    let error_ratio = if total_pixels == 0 {
        1.0
    } else {
        (error_count as f64 / total_pixels as f64).min(1.0)
    };
    let quality = 100.0 * (0.6 * snr_term + 0.4 * (1.0 - error_ratio));
    let rarity = quality * (10.0 + distance_km.unwrap_or(0.0)).log10();
    QualityScores { quality, rarity }
}

/// Resolve the sender's distance, tolerating a failing or absent lookup.
pub fn annotate_distance<M: MetadataLookup>(lookup: &M, header: &HeaderFrame) -> Option<f64> {
    lookup.distance_km(&header.sender)
}

/// Store a record, downgrading failure to a log line.
pub fn store_record<S: RecordSink>(sink: &mut S, record: &ContactRecord) {
    if let Err(e) = sink.store(record) {
        warn!("record storage failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::header::TransmissionMode;

    fn header() -> HeaderFrame {
        HeaderFrame {
            sender: "AB1CD".into(),
            recipient: "XY2ZT".into(),
            mode: TransmissionMode::Color32,
        }
    }

    #[test]
    fn test_perfect_contact_scores_full_quality() {
        let scores = score_contact(0, 1024, 30.0, None);
        assert!((scores.quality - 100.0).abs() < 1e-9);
        // No distance: rarity equals quality (log10(10) = 1).
        assert!((scores.rarity - scores.quality).abs() < 1e-9);
    }

    #[test]
    fn test_errors_and_low_snr_reduce_quality() {
        let clean = score_contact(0, 1024, 30.0, None);
        let noisy = score_contact(0, 1024, 12.0, None);
        let errored = score_contact(256, 1024, 30.0, None);
        assert!(noisy.quality < clean.quality);
        assert!(errored.quality < clean.quality);
    }

    #[test]
    fn test_distance_raises_rarity() {
        let near = score_contact(0, 1024, 30.0, Some(10.0));
        let far = score_contact(0, 1024, 30.0, Some(5000.0));
        assert!((near.quality - far.quality).abs() < 1e-9);
        assert!(far.rarity > near.rarity);
    }

    #[test]
    fn test_infinite_snr_clamps() {
        let scores = score_contact(0, 1024, f64::INFINITY, None);
        assert!((scores.quality - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_failing_sink_is_tolerated() {
        struct FailingSink;
        impl RecordSink for FailingSink {
            fn store(&mut self, _record: &ContactRecord) -> crate::Result<()> {
                Err(DecodeError::Storage("disk full".into()))
            }
        }

        let record = ContactRecord {
            header: header(),
            grid: vec![0; 4],
            width: 2,
            height: 2,
            average_snr_db: 20.0,
            error_count: 0,
            scores: QualityScores::default(),
            timestamp: 0.0,
            distance_km: None,
        };
        // Must not panic or propagate.
        store_record(&mut FailingSink, &record);
    }

    #[test]
    fn test_null_lookup_yields_no_distance() {
        assert_eq!(annotate_distance(&NullLookup, &header()), None);
    }
}
