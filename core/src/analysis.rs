//! Fire-and-forget analysis task boundary.
//!
//! The sampling loop pushes one request per tick into a bounded channel and
//! never waits; worker threads run the detection pass and push responses
//! into a second bounded channel drained by a single consumer. Responses
//! arrive in completion order, not submission order. When the request queue
//! is full the block is dropped and counted rather than stalling the
//! sampling cadence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{trace, warn};

use crate::goertzel::analyze_block;

/// One sample block handed to the analyzer.
#[derive(Clone, Debug)]
pub struct AnalysisRequest {
    /// Block start, seconds since session start.
    pub start: f64,
    pub samples: Vec<f32>,
    pub sample_rate: f64,
    /// Canonical (un-calibrated) candidate frequencies.
    pub expected: Arc<Vec<f64>>,
    pub calibration_offset: f64,
}

/// Detection outcome plus diagnostics for one tick.
#[derive(Clone, Debug)]
pub struct AnalysisResponse {
    pub start: f64,
    pub duration: f64,
    /// Canonical candidate frequency, when detection succeeded.
    pub detected_frequency: Option<f64>,
    pub max_magnitude: f64,
    pub magnitudes: Vec<f64>,
    pub threshold: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub snr_db: f64,
}

/// Run one detection pass. The calibration offset shifts the frequencies
/// handed to the estimator; the response reports the canonical candidate so
/// downstream matching stays table-exact.
pub fn analyze_request(request: &AnalysisRequest, floor: f64, sigma: f64) -> AnalysisResponse {
    let adjusted: Vec<f64> = request
        .expected
        .iter()
        .map(|f| f + request.calibration_offset)
        .collect();
    let pass = analyze_block(
        &request.samples,
        request.sample_rate,
        &adjusted,
        floor,
        sigma,
    );

    let detected_frequency = pass.detected_frequency.map(|f| {
        let idx = adjusted
            .iter()
            .position(|&a| (a - f).abs() < 1e-9)
            .unwrap_or(0);
        request.expected[idx]
    });

    AnalysisResponse {
        start: request.start,
        duration: request.samples.len() as f64 / request.sample_rate.max(1.0),
        detected_frequency,
        max_magnitude: pass.max_magnitude,
        magnitudes: pass.magnitudes,
        threshold: pass.threshold,
        mean: pass.mean,
        std_dev: pass.std_dev,
        snr_db: pass.snr_db,
    }
}

/// Worker pool bridging the sampling loop and the event-log consumer.
pub struct AnalysisPool {
    request_tx: Option<Sender<AnalysisRequest>>,
    response_rx: Receiver<AnalysisResponse>,
    workers: Vec<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
}

impl AnalysisPool {
    pub fn new(workers: usize, queue_depth: usize, floor: f64, sigma: f64) -> Self {
        let workers = workers.max(1);
        let queue_depth = queue_depth.max(1);
        let (request_tx, request_rx) = bounded::<AnalysisRequest>(queue_depth);
        let (response_tx, response_rx) = bounded::<AnalysisResponse>(queue_depth);

        let handles = (0..workers)
            .map(|id| {
                let requests = request_rx.clone();
                let responses = response_tx.clone();
                std::thread::spawn(move || {
                    trace!("analysis worker {id} up");
                    for request in requests.iter() {
                        let response = analyze_request(&request, floor, sigma);
                        if responses.send(response).is_err() {
                            break;
                        }
                    }
                    trace!("analysis worker {id} down");
                })
            })
            .collect();

        Self {
            request_tx: Some(request_tx),
            response_rx,
            workers: handles,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Submit without blocking. Returns false when the queue was full and
    /// the block was dropped.
    pub fn submit(&self, request: AnalysisRequest) -> bool {
        let Some(tx) = &self.request_tx else {
            return false;
        };
        match tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(request)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("analysis queue full, dropping tick at {:.3}s", request.start);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Drain completed responses, in arrival order, without blocking.
    pub fn try_recv(&self) -> Option<AnalysisResponse> {
        self.response_rx.try_recv().ok()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting requests and wait for workers to finish. In-flight
    /// results left in the response queue are discarded with the pool.
    pub fn shutdown(mut self) {
        self.request_tx = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for AnalysisPool {
    fn drop(&mut self) {
        self.request_tx = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;
    use std::time::Duration;

    fn sine(frequency: f64, sample_rate: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (TAU * frequency * i as f64 / sample_rate).sin() as f32)
            .collect()
    }

    fn candidates() -> Arc<Vec<f64>> {
        Arc::new((0..32).map(|i| 400.0 + 55.0 * i as f64).collect())
    }

    #[test]
    fn test_pool_detects_submitted_tone() {
        let pool = AnalysisPool::new(2, 16, 1.0, 2.6);
        let expected = candidates();
        let target = expected[10];
        pool.submit(AnalysisRequest {
            start: 0.25,
            samples: sine(target, 44100.0, 2048),
            sample_rate: 44100.0,
            expected: expected.clone(),
            calibration_offset: 0.0,
        });

        let response = loop {
            if let Some(r) = pool.try_recv() {
                break r;
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(response.detected_frequency, Some(target));
        assert_eq!(response.start, 0.25);
        pool.shutdown();
    }

    #[test]
    fn test_calibration_offset_reports_canonical_frequency() {
        let expected = candidates();
        // Signal is 5 Hz above the table; calibration compensates.
        let target = expected[4];
        let request = AnalysisRequest {
            start: 0.0,
            samples: sine(target + 5.0, 44100.0, 2048),
            sample_rate: 44100.0,
            expected: expected.clone(),
            calibration_offset: 5.0,
        };
        let response = analyze_request(&request, 1.0, 2.6);
        assert_eq!(response.detected_frequency, Some(target));
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        // No workers draining fast enough to matter: depth 1, slow blocks.
        let pool = AnalysisPool::new(1, 1, 1.0, 2.6);
        let expected = candidates();
        let request = AnalysisRequest {
            start: 0.0,
            samples: sine(expected[0], 44100.0, 1 << 15),
            sample_rate: 44100.0,
            expected: expected.clone(),
            calibration_offset: 0.0,
        };

        let mut dropped_any = false;
        for _ in 0..64 {
            if !pool.submit(request.clone()) {
                dropped_any = true;
                break;
            }
        }
        assert!(dropped_any);
        assert!(pool.dropped() >= 1);
        pool.shutdown();
    }

    #[test]
    fn test_responses_arrive_for_all_submissions() {
        let pool = AnalysisPool::new(2, 32, 1.0, 2.6);
        let expected = candidates();
        let mut submitted = 0;
        for i in 0..8 {
            let ok = pool.submit(AnalysisRequest {
                start: i as f64 * 0.01,
                samples: sine(expected[i], 11025.0, 1024),
                sample_rate: 11025.0,
                expected: expected.clone(),
                calibration_offset: 0.0,
            });
            if ok {
                submitted += 1;
            }
        }

        let mut received = 0;
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while received < submitted && std::time::Instant::now() < deadline {
            if pool.try_recv().is_some() {
                received += 1;
            } else {
                std::thread::sleep(Duration::from_millis(2));
            }
        }
        assert_eq!(received, submitted);
        pool.shutdown();
    }
}
