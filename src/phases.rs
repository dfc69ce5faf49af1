//! Demo phase steps
//!
//! [`MeanEstimator`] learns the mean of a deterministic noisy stream, one
//! sample per learning step, then scores the estimate against held-out
//! samples during testing.

use std::sync::Arc;

use serde::Serialize;

use crate::log::LogSink;
use crate::run_loop::{PhaseSteps, StepOutcome};

/// Noise pattern period; offsets are symmetric so they average to zero
const NOISE_PERIOD: usize = 17;

/// Summary of what the estimator did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub learned: usize,
    pub tested: usize,
    pub estimate: f64,
    pub mean_absolute_error: Option<f64>,
}

pub struct MeanEstimator {
    target: f64,
    spread: f64,
    learning_samples: usize,
    testing_samples: usize,
    learned: usize,
    tested: usize,
    estimate: f64,
    total_error: f64,
    log: Arc<dyn LogSink>,
}

impl MeanEstimator {
    pub fn new(learning_samples: usize, testing_samples: usize, log: Arc<dyn LogSink>) -> Self {
        Self {
            target: 10.0,
            spread: 2.0,
            learning_samples,
            testing_samples,
            learned: 0,
            tested: 0,
            estimate: 0.0,
            total_error: 0.0,
            log,
        }
    }

    /// Change the true mean and noise amplitude of the stream
    #[cfg(test)]
    fn with_stream(mut self, target: f64, spread: f64) -> Self {
        self.target = target;
        self.spread = spread;
        self
    }

    /// k-th sample of the stream
    fn sample(&self, k: usize) -> f64 {
        let offset = (k * 37 % NOISE_PERIOD) as f64 - (NOISE_PERIOD / 2) as f64;
        self.target + offset / (NOISE_PERIOD / 2) as f64 * self.spread
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    pub fn mean_absolute_error(&self) -> Option<f64> {
        (self.tested > 0).then(|| self.total_error / self.tested as f64)
    }

    pub fn report(&self) -> PhaseReport {
        PhaseReport {
            learned: self.learned,
            tested: self.tested,
            estimate: self.estimate,
            mean_absolute_error: self.mean_absolute_error(),
        }
    }
}

impl PhaseSteps for MeanEstimator {
    fn learning_step(&mut self, iteration: u64) -> StepOutcome {
        self.log.trace("MeanEstimator::learning_step");
        if self.learned >= self.learning_samples {
            return StepOutcome::Exhausted;
        }

        let x = self.sample(self.learned);
        self.learned += 1;
        self.estimate += (x - self.estimate) / self.learned as f64;
        self.log.status(&format!(
            "[{}] learning {}/{}: sample={:.3} estimate={:.3}",
            iteration, self.learned, self.learning_samples, x, self.estimate
        ));
        StepOutcome::MoreWork
    }

    fn testing_step(&mut self, iteration: u64) -> StepOutcome {
        self.log.trace("MeanEstimator::testing_step");
        if self.tested >= self.testing_samples {
            if let Some(mae) = self.mean_absolute_error() {
                self.log
                    .status(&format!("testing done: mean absolute error={:.3}", mae));
            }
            return StepOutcome::Exhausted;
        }

        // Held-out samples continue the stream past the learning range
        let x = self.sample(self.learning_samples + self.tested);
        let error = (x - self.estimate).abs();
        self.tested += 1;
        self.total_error += error;
        self.log.status(&format!(
            "[{}] testing {}/{}: sample={:.3} error={:.3}",
            iteration, self.tested, self.testing_samples, x, error
        ));
        StepOutcome::MoreWork
    }
}
