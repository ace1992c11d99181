//! Forward error correction by repetition.
//!
//! The protocol repeats every header symbol run and every image line a fixed
//! number of times; the receiver recovers each position by majority vote
//! across the repetitions. The same vote is reused at two granularities:
//! per character frequency for the header and per pixel for image lines.

/// Position-wise majority across repetition rows. Ties resolve to the value
/// first encountered in repetition order. Rows may be ragged (a truncated
/// repetition); voting covers positions up to the longest row.
pub fn majority_rows<T: PartialEq + Copy>(rows: &[Vec<T>]) -> Vec<T> {
    let positions = rows.iter().map(Vec::len).max().unwrap_or(0);
    (0..positions)
        .filter_map(|i| majority_at(rows, i))
        .collect()
}

fn majority_at<T: PartialEq + Copy>(rows: &[Vec<T>], position: usize) -> Option<T> {
    let mut counts: Vec<(T, usize)> = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(&value) = row.get(position) else {
            continue;
        };
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(T, usize)> = None;
    for (value, count) in counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_majority_recovers_single_corruption() {
        let rows = vec![vec![1u8, 2, 3], vec![1, 2, 3], vec![1, 9, 3]];
        assert_eq!(majority_rows(&rows), vec![1, 2, 3]);
    }

    #[test]
    fn test_tie_resolves_to_first_repetition() {
        let rows = vec![vec![5u8], vec![7]];
        assert_eq!(majority_rows(&rows), vec![5]);
    }

    #[test]
    fn test_optional_frequencies_vote() {
        // None (unresolved slot) participates like any other value.
        let rows = vec![
            vec![Some(500.0), None],
            vec![Some(500.0), Some(600.0)],
            vec![None, Some(600.0)],
        ];
        assert_eq!(majority_rows(&rows), vec![Some(500.0), Some(600.0)]);
    }

    #[test]
    fn test_ragged_rows_vote_over_longest() {
        let rows = vec![vec![1u8, 2], vec![1, 2, 3], vec![1, 2, 3]];
        assert_eq!(majority_rows(&rows), vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_input() {
        let rows: Vec<Vec<u8>> = vec![];
        assert!(majority_rows(&rows).is_empty());
    }
}
