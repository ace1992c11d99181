//! Progressive image reconstruction.
//!
//! Image tones arrive as a flat stream: each grid line is transmitted
//! `image_repeats` times in a row, pixel by pixel. Every tone snaps to the
//! nearest palette tone; a tone with no palette match falls back to the
//! previous pixel's value and bumps the session error counter. A line is
//! majority-voted into the grid exactly once, only after all its
//! repetitions have arrived, and rendering is strictly sequential.

use log::{debug, info};

use crate::config::LinkConfig;
use crate::fec::majority_rows;
use crate::tones::{db_to_linear, linear_to_db, ToneEvent};
use crate::{PALETTE_BASE_HZ, PALETTE_SIZE, PALETTE_STEP_HZ};

/// Tone frequency for a palette index.
pub fn palette_frequency(index: u8) -> f64 {
    PALETTE_BASE_HZ + index as f64 * PALETTE_STEP_HZ
}

/// Nearest palette index within `snap_hz`, over the first `palette_size`
/// entries. `None` when no palette tone is in range.
pub fn snap_to_palette(frequency: f64, snap_hz: f64, palette_size: usize) -> Option<u8> {
    let mut best: Option<(u8, f64)> = None;
    for index in 0..palette_size.min(PALETTE_SIZE) as u8 {
        let distance = (frequency - palette_frequency(index)).abs();
        if distance <= snap_hz && best.map_or(true, |(_, d)| distance < d) {
            best = Some((index, distance));
        }
    }
    best.map(|(index, _)| index)
}

/// What one ingest pass changed.
#[derive(Clone, Debug, Default)]
pub struct IngestSummary {
    pub pixels_added: usize,
    /// Indices of grid lines rendered during this pass, in order.
    pub lines_rendered: Vec<usize>,
    pub complete: bool,
}

pub struct ImageReconstructor {
    lines: usize,
    pixels_per_line: usize,
    repeats: usize,
    palette_size: usize,
    snap_hz: f64,

    grid: Vec<u8>,
    /// Per-line repetition buffers; a line's buffer is discarded once voted.
    line_reps: Vec<Vec<Vec<u8>>>,
    raw_pixels: usize,
    last_pixel: u8,
    rendered_lines: usize,
    error_count: u32,
    snr_linear_sum: f64,
    snr_samples: usize,
}

impl ImageReconstructor {
    pub fn new(config: &LinkConfig, palette_size: usize) -> Self {
        Self {
            lines: config.image_lines,
            pixels_per_line: config.pixels_per_line,
            repeats: config.image_repeats,
            palette_size,
            snap_hz: config.palette_snap_hz,
            grid: vec![0; config.image_pixels()],
            line_reps: (0..config.image_lines)
                .map(|_| vec![Vec::with_capacity(config.pixels_per_line); config.image_repeats])
                .collect(),
            raw_pixels: 0,
            last_pixel: 0,
            rendered_lines: 0,
            error_count: 0,
            snr_linear_sum: 0.0,
            snr_samples: 0,
        }
    }

    /// Consume newly-available tone units and render any line whose full
    /// repetition set is now present. Extra tones past the protocol's pixel
    /// count are ignored.
    pub fn ingest(&mut self, tones: &[ToneEvent]) -> IngestSummary {
        let mut summary = IngestSummary::default();
        let total = self.total_raw_pixels();

        for tone in tones {
            if self.raw_pixels >= total {
                break;
            }

            let index = match snap_to_palette(tone.frequency, self.snap_hz, self.palette_size) {
                Some(index) => index,
                None => {
                    // Off-palette tone: carry the previous pixel forward.
                    self.error_count += 1;
                    self.last_pixel
                }
            };
            self.last_pixel = index;

            let per_line = self.pixels_per_line * self.repeats;
            let line = self.raw_pixels / per_line;
            let rep = (self.raw_pixels % per_line) / self.pixels_per_line;
            self.line_reps[line][rep].push(index);
            self.raw_pixels += 1;
            summary.pixels_added += 1;

            self.snr_linear_sum += db_to_linear(tone.snr_db);
            self.snr_samples += 1;
        }

        self.render_ready_lines(&mut summary);
        summary.complete = self.is_complete();
        summary
    }

    /// Vote completed lines into the grid, in order, stopping at the first
    /// line whose repetitions are not all present yet.
    fn render_ready_lines(&mut self, summary: &mut IngestSummary) {
        while self.rendered_lines < self.lines {
            let line = self.rendered_lines;
            let ready = self.line_reps[line]
                .iter()
                .all(|rep| rep.len() >= self.pixels_per_line);
            if !ready {
                break;
            }

            let reps = std::mem::take(&mut self.line_reps[line]);
            let voted = majority_rows(&reps);
            let offset = line * self.pixels_per_line;
            self.grid[offset..offset + self.pixels_per_line]
                .copy_from_slice(&voted[..self.pixels_per_line]);
            self.rendered_lines += 1;
            summary.lines_rendered.push(line);
            debug!("rendered line {line}");
        }

        if self.is_complete() {
            info!(
                "image complete: {} lines, {} decode errors, avg SNR {:.1} dB",
                self.lines,
                self.error_count,
                self.average_snr_db()
            );
        }
    }

    pub fn total_raw_pixels(&self) -> usize {
        self.lines * self.pixels_per_line * self.repeats
    }

    pub fn raw_pixels(&self) -> usize {
        self.raw_pixels
    }

    /// The assembled grid, valid up to `rendered_lines`.
    pub fn grid(&self) -> &[u8] {
        &self.grid
    }

    pub fn rendered_lines(&self) -> usize {
        self.rendered_lines
    }

    pub fn width(&self) -> usize {
        self.pixels_per_line
    }

    pub fn height(&self) -> usize {
        self.lines
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn is_complete(&self) -> bool {
        self.rendered_lines == self.lines
    }

    /// Session average SNR: per-tone values averaged in the linear power
    /// domain, reported in dB.
    pub fn average_snr_db(&self) -> f64 {
        if self.snr_samples == 0 {
            return 0.0;
        }
        linear_to_db(self.snr_linear_sum / self.snr_samples as f64)
    }
}
