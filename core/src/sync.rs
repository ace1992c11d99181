//! Temporal synchronization against the datum marker.
//!
//! The transmitter leads with alternating calibration tones; the last
//! occurrence of the upper calibration tone before the search bound marks
//! the datum that anchors the header frame. No correlation is involved:
//! the filtered event log is searched directly.

use log::{debug, warn};

use crate::tones::ToneEvent;

/// Find the datum anchor: the start time of the last event at
/// `datum_frequency` whose start lies under `search_bound` seconds.
/// Returns `None` when no such event exists, which is fatal for the
/// listening session.
pub fn find_datum(events: &[ToneEvent], datum_frequency: f64, search_bound: f64) -> Option<f64> {
    let found = events
        .iter()
        .rev()
        .find(|e| e.start < search_bound && (e.frequency - datum_frequency).abs() < 1e-6);

    match found {
        Some(event) => {
            debug!("datum anchored at {:.3}s", event.start);
            Some(event.start)
        }
        None => {
            warn!(
                "no datum tone at {} Hz within {:.1}s",
                datum_frequency, search_bound
            );
            None
        }
    }
}
