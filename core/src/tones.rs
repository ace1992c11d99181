//! Tone event log and stream shaping.
//!
//! Every successful detection tick appends one [`ToneEvent`] to an
//! append-only log; insertion order is chronological order and events are
//! never mutated or reordered afterwards. Downstream stages consume slices
//! of the log, first dropping rogue single-tick spikes, then (for the image
//! path) collapsing tick runs into whole tones.

use log::debug;

/// One detection event: timestamp and duration in seconds from session
/// start, the best-matching candidate frequency and the tick's SNR estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneEvent {
    pub start: f64,
    pub duration: f64,
    pub frequency: f64,
    pub snr_db: f64,
}

/// Append-only, chronologically ordered event log.
#[derive(Clone, Debug, Default)]
pub struct ToneLog {
    events: Vec<ToneEvent>,
}

impl ToneLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ToneEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[ToneEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events at or after `start` seconds.
    pub fn since(&self, start: f64) -> &[ToneEvent] {
        let idx = self.events.partition_point(|e| e.start < start);
        &self.events[idx..]
    }
}

/// Drop detections that do not persist for at least `min_run` consecutive
/// identical frequency readings. Single forward pass, stable.
pub fn drop_rogue_tones(events: &[ToneEvent], min_run: usize) -> Vec<ToneEvent> {
    if min_run <= 1 {
        return events.to_vec();
    }

    let mut kept = Vec::with_capacity(events.len());
    let mut run_start = 0;
    for i in 0..=events.len() {
        let run_ends = i == events.len()
            || (i > run_start && !same_frequency(&events[i], &events[run_start]));
        if run_ends {
            let run = &events[run_start..i];
            if run.len() >= min_run {
                kept.extend_from_slice(run);
            } else if !run.is_empty() {
                debug!(
                    "dropping rogue run of {} tick(s) at {:.3}s ({} Hz)",
                    run.len(),
                    run[0].start,
                    run[0].frequency
                );
            }
            run_start = i;
        }
    }
    kept
}

/// Collapse consecutive identical-frequency ticks into whole tone units of
/// `tone_secs` each. A run spanning several tone durations (the same pixel
/// value repeated back to back) yields one unit per elapsed tone duration.
/// The unit's SNR is the run's power-domain average.
pub fn collapse_to_tones(events: &[ToneEvent], tone_secs: f64) -> Vec<ToneEvent> {
    let mut tones = Vec::new();
    if tone_secs <= 0.0 {
        return tones;
    }

    let mut run_start = 0;
    for i in 0..=events.len() {
        let run_ends = i == events.len()
            || (i > run_start && !same_frequency(&events[i], &events[run_start]));
        if !run_ends {
            continue;
        }
        let run = &events[run_start..i];
        run_start = i;
        if run.is_empty() {
            continue;
        }

        let first = run[0];
        let last = run[run.len() - 1];
        let span = last.start + last.duration - first.start;
        let count = ((span / tone_secs).round() as usize).max(1);
        let snr_db = average_snr_db(run.iter().map(|e| e.snr_db));
        for j in 0..count {
            tones.push(ToneEvent {
                start: first.start + j as f64 * tone_secs,
                duration: tone_secs,
                frequency: first.frequency,
                snr_db,
            });
        }
    }
    tones
}

/// Average dB values in the linear power domain, back to dB.
pub fn average_snr_db(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for db in values {
        sum += db_to_linear(db);
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    linear_to_db(sum / count as f64)
}

pub fn db_to_linear(db: f64) -> f64 {
    10.0f64.powf(db / 10.0)
}

pub fn linear_to_db(linear: f64) -> f64 {
    10.0 * linear.log10()
}

fn same_frequency(a: &ToneEvent, b: &ToneEvent) -> bool {
    (a.frequency - b.frequency).abs() < 1e-6
}
