use std::time::{Duration, Instant};

use crate::AbrOptions;

/// One network throughput measurement.
#[derive(Debug, Clone, Copy)]
pub struct ThroughputSample {
    pub bytes: u64,
    pub duration: Duration,
    pub at: Instant,
}

/// Throughput estimation seam, mockable in selector tests.
#[cfg_attr(test, unimock::unimock(api = EstimatorMock))]
pub trait Estimator: Send {
    fn push_sample(&mut self, sample: ThroughputSample);
    fn estimate_bps(&self) -> Option<u64>;
}

/// EWMA throughput estimator.
///
/// The estimate expires after `sample_window` of silence so a stale
/// measurement cannot keep driving decisions.
#[derive(Clone, Debug)]
pub struct ThroughputEstimator {
    sample_window: Duration,
    alpha: f64,
    last_update_at: Option<Instant>,
    estimate_bps: Option<f64>,
}

impl ThroughputEstimator {
    pub fn new(opts: &AbrOptions) -> Self {
        Self {
            sample_window: opts.sample_window,
            alpha: 0.3,
            last_update_at: None,
            estimate_bps: None,
        }
    }
}

impl Estimator for ThroughputEstimator {
    fn push_sample(&mut self, sample: ThroughputSample) {
        if sample.duration == Duration::ZERO || sample.bytes == 0 {
            return;
        }

        if let Some(last_update_at) = self.last_update_at {
            if sample.at.duration_since(last_update_at) > self.sample_window {
                self.estimate_bps = None;
            }
        }

        let sample_bps = (sample.bytes as f64 * 8.0) / sample.duration.as_secs_f64();
        self.estimate_bps = Some(match self.estimate_bps {
            None => sample_bps,
            Some(prev) => self.alpha * sample_bps + (1.0 - self.alpha) * prev,
        });
        self.last_update_at = Some(sample.at);
    }

    fn estimate_bps(&self) -> Option<u64> {
        self.estimate_bps.map(|v| v.round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(bytes: u64, millis: u64, at: Instant) -> ThroughputSample {
        ThroughputSample {
            bytes,
            duration: Duration::from_millis(millis),
            at,
        }
    }

    #[test]
    fn empty_estimator_has_no_estimate() {
        let est = ThroughputEstimator::new(&AbrOptions::default());
        assert_eq!(est.estimate_bps(), None);
    }

    #[test]
    fn single_sample_sets_estimate() {
        let mut est = ThroughputEstimator::new(&AbrOptions::default());
        // 1000 bytes in 100ms = 80_000 bps
        est.push_sample(sample(1000, 100, Instant::now()));
        assert_eq!(est.estimate_bps(), Some(80_000));
    }

    #[test]
    fn zero_duration_sample_ignored() {
        let mut est = ThroughputEstimator::new(&AbrOptions::default());
        est.push_sample(sample(1000, 0, Instant::now()));
        assert_eq!(est.estimate_bps(), None);
    }

    #[test]
    fn stale_estimate_expires_on_next_sample() {
        let opts = AbrOptions {
            sample_window: Duration::from_secs(1),
            ..AbrOptions::default()
        };
        let mut est = ThroughputEstimator::new(&opts);

        let t0 = Instant::now();
        est.push_sample(sample(1000, 100, t0));

        // A sample far past the window resets the EWMA rather than mixing
        // with the stale value.
        est.push_sample(sample(4000, 100, t0 + Duration::from_secs(5)));
        assert_eq!(est.estimate_bps(), Some(320_000));
    }
}
