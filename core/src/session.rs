//! Listening-session state machine.
//!
//! The controller owns all session state and is driven entirely by the
//! caller's clock: `advance(now)` moves the machine, `handle_response`
//! appends detection results. No timers live inside the core, so tests can
//! tick deterministically. All failures are session-scoped: the machine
//! always returns to Idle and schedules the next aligned window.
//!
//! Phases: Idle -> Scheduled -> Listening -> HeaderSync -> ImageDecoding
//! -> Completed/TimedOut -> Idle.

use log::{debug, info, warn};

use crate::analysis::AnalysisResponse;
use crate::config::{CalibrationState, LinkConfig};
use crate::contact::{
    annotate_distance, score_contact, store_record, ContactRecord, MetadataLookup, RecordSink,
    Renderer,
};
use crate::fec::majority_rows;
use crate::header::{self, HeaderFrame};
use crate::image::ImageReconstructor;
use crate::symbols::extract_symbols;
use crate::sync::find_datum;
use crate::tones::{collapse_to_tones, drop_rogue_tones, ToneEvent, ToneLog};
use crate::CAL_DATUM_HZ;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Scheduled,
    Listening,
    HeaderSync,
    ImageDecoding,
    Completed,
    TimedOut,
}

#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// Next listening window scheduled, seconds since the epoch.
    WindowScheduled { start: f64 },
    ListeningStarted { at: f64 },
    HeaderDecoded(HeaderFrame),
    /// Grid lines rendered so far after an image tick.
    LinesRendered { through: usize },
    Completed(ContactRecord),
    TimedOut { reason: String },
}

pub struct SessionController<R, S, M> {
    config: LinkConfig,
    calibration: CalibrationState,
    renderer: R,
    sink: S,
    lookup: M,

    phase: SessionPhase,
    window_start: f64,
    listening_started: f64,
    log: ToneLog,
    header: Option<HeaderFrame>,
    image: Option<ImageReconstructor>,
    /// Start of the image tone stream, seconds from listening start.
    image_start: f64,
    /// Collapsed tone units already handed to the reconstructor.
    consumed_tones: usize,
    next_image_tick: f64,
}

impl<R: Renderer, S: RecordSink, M: MetadataLookup> SessionController<R, S, M> {
    pub fn new(config: LinkConfig, renderer: R, sink: S, lookup: M) -> Self {
        Self {
            config,
            calibration: CalibrationState::default(),
            renderer,
            sink,
            lookup,
            phase: SessionPhase::Idle,
            window_start: 0.0,
            listening_started: 0.0,
            log: ToneLog::new(),
            header: None,
            image: None,
            image_start: 0.0,
            consumed_tones: 0,
            next_image_tick: 0.0,
        }
    }

    /// Seed the controller with a previously measured frequency offset.
    pub fn with_calibration(mut self, calibration: CalibrationState) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn calibration(&self) -> CalibrationState {
        self.calibration
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn tone_log(&self) -> &ToneLog {
        &self.log
    }

    /// Append one analysis result. Response timestamps are seconds since
    /// listening start. Results arriving outside an active session are
    /// in-flight leftovers from a cancelled window and are discarded.
    pub fn handle_response(&mut self, response: AnalysisResponse) {
        match self.phase {
            SessionPhase::Listening | SessionPhase::HeaderSync | SessionPhase::ImageDecoding => {}
            _ => {
                debug!("discarding analysis result outside active session");
                return;
            }
        }

        if let Some(frequency) = response.detected_frequency {
            self.log.push(ToneEvent {
                start: response.start,
                duration: response.duration,
                frequency,
                snr_db: response.snr_db,
            });
        }
    }

    /// Drive the state machine to `now` (seconds since the epoch), emitting
    /// every observable transition.
    pub fn advance(&mut self, now: f64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        loop {
            match self.phase {
                SessionPhase::Idle => {
                    self.window_start = self.config.next_window_start(now);
                    self.phase = SessionPhase::Scheduled;
                    debug!("next listening window at {:.0}", self.window_start);
                    events.push(SessionEvent::WindowScheduled {
                        start: self.window_start,
                    });
                }
                SessionPhase::Scheduled => {
                    if now < self.window_start {
                        break;
                    }
                    self.reset_session();
                    self.listening_started = self.window_start;
                    self.phase = SessionPhase::Listening;
                    info!("listening window open at {:.0}", self.listening_started);
                    events.push(SessionEvent::ListeningStarted {
                        at: self.listening_started,
                    });
                }
                SessionPhase::Listening => {
                    let elapsed = now - self.listening_started;
                    if elapsed >= self.config.listen_timeout_secs {
                        self.fail_session("listening window timed out", &mut events);
                    } else if elapsed >= self.config.header_sync_delay_secs {
                        self.phase = SessionPhase::HeaderSync;
                    } else {
                        break;
                    }
                }
                SessionPhase::HeaderSync => {
                    self.attempt_header_sync(now, &mut events);
                }
                SessionPhase::ImageDecoding => {
                    let elapsed = now - self.listening_started;
                    if elapsed >= self.config.listen_timeout_secs {
                        self.fail_session("image decode timed out", &mut events);
                        continue;
                    }
                    if now < self.next_image_tick {
                        break;
                    }
                    self.next_image_tick = now + self.config.image_tick_secs;
                    self.image_tick(now, &mut events);
                    if self.phase == SessionPhase::ImageDecoding {
                        break;
                    }
                }
                SessionPhase::Completed | SessionPhase::TimedOut => {
                    self.phase = SessionPhase::Idle;
                }
            }
        }
        events
    }

    fn reset_session(&mut self) {
        self.log = ToneLog::new();
        self.header = None;
        self.image = None;
        self.image_start = 0.0;
        self.consumed_tones = 0;
        self.next_image_tick = 0.0;
    }

    fn fail_session(&mut self, reason: &str, events: &mut Vec<SessionEvent>) {
        warn!("session aborted: {reason}");
        self.phase = SessionPhase::TimedOut;
        events.push(SessionEvent::TimedOut {
            reason: reason.to_string(),
        });
    }

    fn attempt_header_sync(&mut self, now: f64, events: &mut Vec<SessionEvent>) {
        let filtered = drop_rogue_tones(self.log.events(), self.config.header_min_run());
        let datum = match find_datum(&filtered, CAL_DATUM_HZ, self.config.sync_search_secs) {
            Some(datum) => datum,
            None => {
                self.fail_session("no datum tone found", events);
                return;
            }
        };

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

        match header::decode_header(&voted, self.config.header_snap_hz) {
            Ok(frame) => {
                self.image = Some(ImageReconstructor::new(
                    &self.config,
                    frame.mode.palette_size(),
                ));
                self.image_start = self.config.image_start(anchor);
                self.consumed_tones = 0;
                self.next_image_tick = now + self.config.image_tick_secs;
                events.push(SessionEvent::HeaderDecoded(frame.clone()));
                self.header = Some(frame);
                self.phase = SessionPhase::ImageDecoding;
            }
            Err(e) => {
                self.fail_session(&format!("header parse failed: {e}"), events);
            }
        }
    }

    fn image_tick(&mut self, now: f64, events: &mut Vec<SessionEvent>) {
        let now_rel = now - self.listening_started;
        let raw = self.log.since(self.image_start);
        let filtered = drop_rogue_tones(raw, self.config.image_min_run());
        let collapsed = collapse_to_tones(&filtered, self.config.tone_secs());
        let closed = closed_tone_count(&filtered, &collapsed, now_rel, self.config.tick_secs());

        let Some(image) = self.image.as_mut() else {
            return;
        };
        if closed <= self.consumed_tones {
            return;
        }

        let summary = image.ingest(&collapsed[self.consumed_tones..closed]);
        self.consumed_tones = closed;

        if !summary.lines_rendered.is_empty() {
            self.renderer
                .render(image.grid(), image.width(), image.rendered_lines());
            events.push(SessionEvent::LinesRendered {
                through: image.rendered_lines(),
            });
        }
        if summary.complete {
            self.finalize_session(now, events);
        }
    }

    fn finalize_session(&mut self, now: f64, events: &mut Vec<SessionEvent>) {
        let (Some(header), Some(image)) = (self.header.take(), self.image.take()) else {
            return;
        };

        let distance_km = annotate_distance(&self.lookup, &header);
        let scores = score_contact(
            image.error_count(),
            self.config.image_pixels(),
            image.average_snr_db(),
            distance_km,
        );
        let record = ContactRecord {
            grid: image.grid().to_vec(),
            width: image.width(),
            height: image.height(),
            average_snr_db: image.average_snr_db(),
            error_count: image.error_count(),
            scores,
            timestamp: now,
            distance_km,
            header,
        };

        store_record(&mut self.sink, &record);
        info!(
            "session complete: {} quality {:.0} rarity {:.0}",
            record.header, record.scores.quality, record.scores.rarity
        );
        events.push(SessionEvent::Completed(record));
        self.phase = SessionPhase::Completed;
    }
}

/// Number of leading collapsed tone units that are final. Units belonging
/// to a run that may still be growing (its last tick is recent and no other
/// frequency follows) are held back until the run closes.
fn closed_tone_count(
    filtered: &[ToneEvent],
    collapsed: &[ToneEvent],
    now_rel: f64,
    tick_secs: f64,
) -> usize {
    let Some(last) = filtered.last() else {
        return 0;
    };
    if last.start + last.duration + 2.0 * tick_secs < now_rel {
        // The stream has gone quiet: every run is closed.
        return collapsed.len();
    }

    // Walk back over the still-open final run.
    let mut open_start = last.start;
    for event in filtered.iter().rev() {
        if (event.frequency - last.frequency).abs() < 1e-6 {
            open_start = event.start;
        } else {
            break;
        }
    }
    collapsed
        .iter()
        .take_while(|t| t.start < open_start - 1e-9)
        .count()
}
