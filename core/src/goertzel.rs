//! Single-bin spectral estimation and the per-tick detection pass.
//!
//! One analysis tick evaluates every expected frequency against the same
//! Hamming-windowed sample block using the Goertzel recursion, then separates
//! "tone present" from noise with a threshold derived from the magnitude
//! distribution itself, so no fixed calibration is needed.

use std::f64::consts::PI;

/// Apply a Hamming window to a raw sample block.
pub fn hamming_window(block: &[f32]) -> Vec<f32> {
    let n = block.len();
    if n < 2 {
        return block.to_vec();
    }
    block
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let w = 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos();
            s * w as f32
        })
        .collect()
}

/// Goertzel magnitude of `windowed` at `frequency`. Pure; degenerate input
/// (empty block, non-finite samples, zero rate) yields magnitude 0.
pub fn goertzel_magnitude(windowed: &[f32], sample_rate: f64, frequency: f64) -> f64 {
    if windowed.is_empty() || sample_rate <= 0.0 || !frequency.is_finite() {
        return 0.0;
    }

    let omega = 2.0 * PI * frequency / sample_rate;
    let coeff = 2.0 * omega.cos();

    let mut q1 = 0.0f64;
    let mut q2 = 0.0f64;
    for &sample in windowed {
        let q0 = coeff * q1 - q2 + sample as f64;
        q2 = q1;
        q1 = q0;
    }

    let real = q1 - q2 * omega.cos();
    let imag = q2 * omega.sin();
    let magnitude = (real * real + imag * imag).sqrt();
    if magnitude.is_finite() {
        magnitude
    } else {
        0.0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ThresholdStats {
    pub mean: f64,
    pub std_dev: f64,
    pub threshold: f64,
}

/// Noise statistics across a candidate magnitude distribution. The single
/// strongest magnitude is left out of the mean/deviation so a loud tone does
/// not raise its own cutoff; the threshold is mean + sigma * stddev over the
/// remaining candidates.
pub fn dynamic_threshold(magnitudes: &[f64], sigma: f64) -> ThresholdStats {
    if magnitudes.len() < 2 {
        return ThresholdStats::default();
    }

    let peak_idx = peak_index(magnitudes);
    let rest: Vec<f64> = magnitudes
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != peak_idx)
        .map(|(_, &m)| m)
        .collect();

    let mean = rest.iter().sum::<f64>() / rest.len() as f64;
    let variance = rest.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / rest.len() as f64;
    let std_dev = variance.sqrt();
    ThresholdStats {
        mean,
        std_dev,
        threshold: mean + sigma * std_dev,
    }
}

/// Estimated SNR in dB: signal power is the squared peak, noise power the
/// mean squared magnitude of all sub-threshold candidates. No sub-threshold
/// candidates means no noise estimate, reported as +inf.
pub fn estimate_snr_db(magnitudes: &[f64], peak: f64, threshold: f64) -> f64 {
    let mut noise_sum = 0.0;
    let mut noise_count = 0usize;
    for &m in magnitudes {
        if m < threshold {
            noise_sum += m * m;
            noise_count += 1;
        }
    }

    if noise_count == 0 || noise_sum == 0.0 {
        return f64::INFINITY;
    }
    let noise_power = noise_sum / noise_count as f64;
    10.0 * (peak * peak / noise_power).log10()
}

/// Outcome of one detection pass over the full candidate table.
#[derive(Clone, Debug)]
pub struct DetectionPass {
    /// Accepted candidate, if the peak cleared both gates.
    pub detected_frequency: Option<f64>,
    pub max_magnitude: f64,
    /// Per-candidate magnitudes, aligned with the input table.
    pub magnitudes: Vec<f64>,
    pub mean: f64,
    pub std_dev: f64,
    pub threshold: f64,
    pub snr_db: f64,
}

/// Evaluate every candidate frequency against one sample block. A candidate
/// is detected only when its magnitude exceeds both the dynamic threshold
/// and the absolute floor; otherwise the pass reports diagnostics only.
pub fn analyze_block(
    block: &[f32],
    sample_rate: f64,
    candidates: &[f64],
    floor: f64,
    sigma: f64,
) -> DetectionPass {
    let windowed = hamming_window(block);
    let magnitudes: Vec<f64> = candidates
        .iter()
        .map(|&f| goertzel_magnitude(&windowed, sample_rate, f))
        .collect();

    if magnitudes.is_empty() {
        return DetectionPass {
            detected_frequency: None,
            max_magnitude: 0.0,
            magnitudes,
            mean: 0.0,
            std_dev: 0.0,
            threshold: 0.0,
            snr_db: f64::INFINITY,
        };
    }

    let peak_idx = peak_index(&magnitudes);
    let max_magnitude = magnitudes[peak_idx];
    let stats = dynamic_threshold(&magnitudes, sigma);
    let snr_db = estimate_snr_db(&magnitudes, max_magnitude, stats.threshold);

    let detected = max_magnitude > stats.threshold && max_magnitude > floor;
    DetectionPass {
        detected_frequency: detected.then(|| candidates[peak_idx]),
        max_magnitude,
        magnitudes,
        mean: stats.mean,
        std_dev: stats.std_dev,
        threshold: stats.threshold,
        snr_db,
    }
}

fn peak_index(magnitudes: &[f64]) -> usize {
    let mut best = 0;
    for (i, &m) in magnitudes.iter().enumerate() {
        if m > magnitudes[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn sine(frequency: f64, sample_rate: f64, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (TAU * frequency * i as f64 / sample_rate).sin() as f32)
            .collect()
    }

    #[test]
    fn test_magnitude_peaks_at_target_frequency() {
        let rate = 44100.0;
        let candidates: Vec<f64> = (0..37).map(|i| 2200.0 + 40.0 * i as f64).collect();

        for &f in &candidates {
            let block = sine(f, rate, 2048, 0.5);
            let windowed = hamming_window(&block);
            let at_target = goertzel_magnitude(&windowed, rate, f);
            for &other in &candidates {
                if (other - f).abs() < 40.0 {
                    continue;
                }
                let elsewhere = goertzel_magnitude(&windowed, rate, other);
                assert!(
                    at_target > elsewhere,
                    "{f} Hz: target magnitude {at_target} not above {elsewhere} at {other} Hz"
                );
            }
        }
    }

    #[test]
    fn test_degenerate_input_yields_zero() {
        assert_eq!(goertzel_magnitude(&[], 44100.0, 1000.0), 0.0);
        assert_eq!(goertzel_magnitude(&[0.1, 0.2], 0.0, 1000.0), 0.0);
        let nan_block = vec![f32::NAN; 64];
        assert_eq!(goertzel_magnitude(&nan_block, 44100.0, 1000.0), 0.0);
    }

    #[test]
    fn test_dynamic_threshold_classifies_single_outlier() {
        let magnitudes = [1.0, 1.0, 1.0, 1.0, 10.0];
        let stats = dynamic_threshold(&magnitudes, 2.6);
        let above: Vec<f64> = magnitudes
            .iter()
            .copied()
            .filter(|&m| m > stats.threshold)
            .collect();
        assert_eq!(above, vec![10.0]);
    }

    #[test]
    fn test_snr_infinite_without_noise_estimate() {
        // Every candidate at or above the threshold: no noise to measure.
        assert_eq!(estimate_snr_db(&[5.0, 5.0], 5.0, 5.0), f64::INFINITY);
        assert_eq!(estimate_snr_db(&[0.0, 0.0], 0.0, 1.0), f64::INFINITY);
    }

    #[test]
    fn test_snr_uses_sub_threshold_noise_power() {
        // Noise power = mean of squares below threshold = (1 + 4) / 2 = 2.5.
        let snr = estimate_snr_db(&[1.0, 2.0, 10.0], 10.0, 3.0);
        let expected = 10.0 * (100.0f64 / 2.5).log10();
        assert!((snr - expected).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_block_detects_pure_tone() {
        let rate = 44100.0;
        let candidates: Vec<f64> = (0..32).map(|i| 400.0 + 55.0 * i as f64).collect();
        let block = sine(candidates[7], rate, 2048, 0.5);

        let pass = analyze_block(&block, rate, &candidates, 1.0, 2.6);
        assert_eq!(pass.detected_frequency, Some(candidates[7]));
        assert!(pass.snr_db > 10.0);
        assert_eq!(pass.magnitudes.len(), candidates.len());
    }

    #[test]
    fn test_analyze_block_silence_stays_quiet() {
        let candidates: Vec<f64> = (0..32).map(|i| 400.0 + 55.0 * i as f64).collect();
        let block = vec![0.0f32; 2048];
        let pass = analyze_block(&block, 44100.0, &candidates, 1.0, 2.6);
        assert_eq!(pass.detected_frequency, None);
    }

    #[test]
    fn test_analyze_block_floor_gates_weak_peaks() {
        let rate = 44100.0;
        let candidates: Vec<f64> = (0..32).map(|i| 400.0 + 55.0 * i as f64).collect();
        // A real tone, but far too weak to clear an absurdly high floor.
        let block = sine(candidates[3], rate, 2048, 0.5);
        let pass = analyze_block(&block, rate, &candidates, 1e9, 2.6);
        assert_eq!(pass.detected_frequency, None);
        assert!(pass.max_magnitude > 0.0);
    }
}
