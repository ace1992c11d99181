//! Symbol extraction: fixed-duration time slots aligned to the frame anchor.
//!
//! Slot boundaries are always computed relative to the synchronized anchor,
//! never to session start. Each slot resolves to the most frequent event
//! frequency inside its tolerance window; ties break to the value first
//! encountered in scan order, which keeps extraction deterministic. A tone
//! keeps being detected for a few ticks past its edges, so a window must
//! hold at least `min_ticks` readings of a frequency before it resolves;
//! otherwise a neighboring tone's spill-over would turn a silent slot into
//! a phantom symbol.

use crate::tones::ToneEvent;

/// Partition `events` into `repeats` x `symbols_per_rep` slots. The slot for
/// repetition `r`, index `i` is centered at
/// `anchor + (r * symbols_per_rep + i) * tone_secs` with a window of
/// `tolerance * tone_secs` on either side. A slot resolves only when its
/// dominant frequency has at least `min_ticks` events in the window; slots
/// below that (empty, or brushed by an adjacent tone's edge) yield `None`.
pub fn extract_symbols(
    events: &[ToneEvent],
    anchor: f64,
    tone_secs: f64,
    symbols_per_rep: usize,
    repeats: usize,
    tolerance: f64,
    min_ticks: usize,
) -> Vec<Vec<Option<f64>>> {
    let half_window = tolerance * tone_secs;
    (0..repeats)
        .map(|r| {
            (0..symbols_per_rep)
                .map(|i| {
                    let center = anchor + (r * symbols_per_rep + i) as f64 * tone_secs;
                    window_mode(events, center - half_window, center + half_window, min_ticks)
                })
                .collect()
        })
        .collect()
}

/// Most frequent frequency among events whose start falls in `[lo, hi]`,
/// provided it occurs at least `min_ticks` times; ties resolve to the
/// first-encountered value.
fn window_mode(events: &[ToneEvent], lo: f64, hi: f64, min_ticks: usize) -> Option<f64> {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for event in events {
        if event.start < lo || event.start > hi {
            continue;
        }
        match counts
            .iter_mut()
            .find(|(f, _)| (*f - event.frequency).abs() < 1e-6)
        {
            Some((_, n)) => *n += 1,
            None => counts.push((event.frequency, 1)),
        }
    }

    let mut best: Option<(f64, usize)> = None;
    for (frequency, count) in counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((frequency, count)),
        }
    }
    best.filter(|&(_, count)| count >= min_ticks)
        .map(|(frequency, _)| frequency)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(start: f64, frequency: f64) -> ToneEvent {
        ToneEvent {
            start,
            duration: 0.01,
            frequency,
            snr_db: 20.0,
        }
    }

    #[test]
    fn test_slots_resolve_to_dominant_frequency() {
        let tone = 0.12;
        let anchor = 1.0;
        // Slot 0 around 1.0s, slot 1 around 1.12s.
        let events = vec![
            event(0.99, 500.0),
            event(1.00, 500.0),
            event(1.01, 600.0),
            event(1.11, 700.0),
            event(1.12, 700.0),
        ];
        let grid = extract_symbols(&events, anchor, tone, 2, 1, 0.25, 1);
        assert_eq!(grid, vec![vec![Some(500.0), Some(700.0)]]);
    }

    #[test]
    fn test_tie_breaks_to_first_encountered() {
        let events = vec![event(0.99, 500.0), event(1.01, 600.0)];
        let grid = extract_symbols(&events, 1.0, 0.12, 1, 1, 0.25, 1);
        assert_eq!(grid, vec![vec![Some(500.0)]]);
    }

    #[test]
    fn test_empty_window_is_none() {
        let events = vec![event(5.0, 500.0)];
        let grid = extract_symbols(&events, 1.0, 0.12, 2, 1, 0.25, 1);
        assert_eq!(grid, vec![vec![None, None]]);
    }

    #[test]
    fn test_repetitions_offset_by_symbol_count() {
        let tone = 0.1;
        let anchor = 0.0;
        // Rep 0 slots at 0.0 and 0.1; rep 1 slots at 0.2 and 0.3.
        let events = vec![
            event(0.0, 100.0),
            event(0.1, 200.0),
            event(0.2, 300.0),
            event(0.3, 400.0),
        ];
        let grid = extract_symbols(&events, anchor, tone, 2, 2, 0.25, 1);
        assert_eq!(
            grid,
            vec![
                vec![Some(100.0), Some(200.0)],
                vec![Some(300.0), Some(400.0)],
            ]
        );
    }

    #[test]
    fn test_events_outside_tolerance_excluded() {
        // Tolerance 0.25 of 0.12s = 0.03s; an event 0.05s off-center is out.
        let events = vec![event(1.05, 500.0)];
        let grid = extract_symbols(&events, 1.0, 0.12, 1, 1, 0.25, 1);
        assert_eq!(grid, vec![vec![None]]);
    }

    #[test]
    fn test_trailing_edge_ticks_do_not_resolve_a_silent_slot() {
        // A tone in slot 0 keeps being detected for a few ticks after it
        // ends; those readings land in silent slot 1's window. The tone
        // fills its own window (7 ticks) but leaves only 2 in slot 1's,
        // below the slot minimum.
        let events: Vec<ToneEvent> = (0..15)
            .map(|k| event(0.96 + k as f64 * 0.01, 500.0))
            .collect();
        let grid = extract_symbols(&events, 1.0, 0.12, 2, 1, 0.25, 5);
        assert_eq!(grid, vec![vec![Some(500.0), None]]);
    }

    #[test]
    fn test_min_ticks_gates_every_frequency_in_the_window() {
        // Four ticks of one tone plus two of another: neither reaches a
        // minimum of five, so the slot stays unresolved.
        let mut events: Vec<ToneEvent> = (0..4)
            .map(|k| event(0.98 + k as f64 * 0.01, 500.0))
            .collect();
        events.extend((0..2).map(|k| event(1.02 + k as f64 * 0.01, 600.0)));
        let grid = extract_symbols(&events, 1.0, 0.12, 1, 1, 0.25, 5);
        assert_eq!(grid, vec![vec![None]]);
    }
}
