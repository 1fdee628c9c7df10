//! Per-channel online filter kernels.
//!
//! Each kernel owns exactly one [`RingWindow`] and adds the derived-quantity
//! formula from the moving-window aggregates the window tracks for it.

use dsp_core::{Sample, StateError, DEFAULT_EPSILON};

use crate::ring::{AggregateSet, Aggregates, RingWindow};

/// Shared shape every moving-window kernel exposes.
pub trait Kernel {
    /// Feeds one sample and returns the kernel's derived statistic.
    fn add_sample(&mut self, x: Sample) -> Sample;
    /// Clears accumulated state without changing the window size.
    fn clear(&mut self);
    /// The configured window size `N`.
    fn window_size(&self) -> usize;
    /// Number of samples currently held (`<= window_size`).
    fn count(&self) -> usize;
}

macro_rules! ring_backed_kernel {
    ($name:ident, $aggset:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            ring: RingWindow,
        }

        impl $name {
            pub fn new(window_size: usize) -> Self {
                Self { ring: RingWindow::new(window_size, $aggset) }
            }

            /// Oldest-to-newest samples and current aggregates, for serialization.
            pub fn snapshot(&self) -> (Vec<Sample>, Aggregates) {
                self.ring.snapshot()
            }

            /// Rebuilds from a previous snapshot, validating aggregates.
            pub fn restore(
                &mut self,
                samples: &[Sample],
                aggregates: Aggregates,
            ) -> Result<(), StateError> {
                self.ring.restore(samples, aggregates)
            }
        }
    };
}

ring_backed_kernel!(MovingMean, AggregateSet::sum_only());
ring_backed_kernel!(MovingMav, AggregateSet::sum_abs_only());
ring_backed_kernel!(MovingRms, AggregateSet::sum_sq_only());
ring_backed_kernel!(MovingVariance, AggregateSet::sum_and_sum_sq());

impl Kernel for MovingMean {
    fn add_sample(&mut self, x: Sample) -> Sample {
        let agg = self.ring.add_sample(x);
        agg.sum / self.ring.count() as Sample
    }
    fn clear(&mut self) {
        self.ring.clear();
    }
    fn window_size(&self) -> usize {
        self.ring.capacity()
    }
    fn count(&self) -> usize {
        self.ring.count()
    }
}

impl Kernel for MovingMav {
    fn add_sample(&mut self, x: Sample) -> Sample {
        let agg = self.ring.add_sample(x);
        agg.sum_abs / self.ring.count() as Sample
    }
    fn clear(&mut self) {
        self.ring.clear();
    }
    fn window_size(&self) -> usize {
        self.ring.capacity()
    }
    fn count(&self) -> usize {
        self.ring.count()
    }
}

impl Kernel for MovingRms {
    fn add_sample(&mut self, x: Sample) -> Sample {
        let agg = self.ring.add_sample(x);
        let mean_sq = agg.sum_sq / self.ring.count() as Sample;
        mean_sq.max(0.0).sqrt()
    }
    fn clear(&mut self) {
        self.ring.clear();
    }
    fn window_size(&self) -> usize {
        self.ring.capacity()
    }
    fn count(&self) -> usize {
        self.ring.count()
    }
}

impl Kernel for MovingVariance {
    fn add_sample(&mut self, x: Sample) -> Sample {
        let agg = self.ring.add_sample(x);
        population_variance(agg, self.ring.count())
    }
    fn clear(&mut self) {
        self.ring.clear();
    }
    fn window_size(&self) -> usize {
        self.ring.capacity()
    }
    fn count(&self) -> usize {
        self.ring.count()
    }
}

/// Population variance over the given aggregates, clamped to 0 to absorb
/// rounding in the sliding-sum accumulation.
#[inline]
fn population_variance(agg: Aggregates, count: usize) -> Sample {
    let count = count as Sample;
    let mean = agg.sum / count;
    let mean_sq = agg.sum_sq / count;
    (mean_sq - mean * mean).max(0.0)
}

/// Sliding z-score normalization: standardizes each incoming sample against
/// the mean/stddev of its own moving window (including itself).
#[derive(Debug, Clone)]
pub struct MovingZScore {
    ring: RingWindow,
    epsilon: Sample,
}

impl MovingZScore {
    pub fn new(window_size: usize, epsilon: Sample) -> Self {
        Self {
            ring: RingWindow::new(window_size, AggregateSet::sum_and_sum_sq()),
            epsilon,
        }
    }

    pub fn with_default_epsilon(window_size: usize) -> Self {
        Self::new(window_size, DEFAULT_EPSILON)
    }

    pub fn epsilon(&self) -> Sample {
        self.epsilon
    }

    pub fn snapshot(&self) -> (Vec<Sample>, Aggregates) {
        self.ring.snapshot()
    }

    pub fn restore(
        &mut self,
        samples: &[Sample],
        aggregates: Aggregates,
    ) -> Result<(), StateError> {
        self.ring.restore(samples, aggregates)
    }
}

impl Kernel for MovingZScore {
    fn add_sample(&mut self, x: Sample) -> Sample {
        let agg = self.ring.add_sample(x);
        let count = self.ring.count();
        let mean = agg.sum / count as Sample;
        let variance = population_variance(agg, count);
        let stddev = variance.sqrt();
        if stddev < self.epsilon {
            0.0
        } else {
            (x - mean) / stddev.max(self.epsilon)
        }
    }
    fn clear(&mut self) {
        self.ring.clear();
    }
    fn window_size(&self) -> usize {
        self.ring.capacity()
    }
    fn count(&self) -> usize {
        self.ring.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn moving_mean_matches_s1() {
        let mut k = MovingMean::new(3);
        let out: Vec<f32> = [1.0, 2.0, 3.0, 4.0, 5.0]
            .into_iter()
            .map(|x| k.add_sample(x))
            .collect();
        assert_eq!(out, vec![1.0, 1.5, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn moving_rms_matches_s5() {
        let mut k = MovingRms::new(3);
        k.add_sample(3.0);
        k.add_sample(4.0);
        let last = k.add_sample(0.0);
        assert_relative_eq!(last, 2.886751, epsilon = 1e-5);
    }

    #[test]
    fn moving_variance_is_never_negative() {
        let mut k = MovingVariance::new(4);
        for x in [1.0, 1.0, 1.0, 1.0] {
            let y = k.add_sample(x);
            assert!(y >= 0.0);
        }
    }

    #[test]
    fn zscore_returns_zero_below_epsilon() {
        let mut k = MovingZScore::new(4, 1e-6);
        // constant signal -> zero variance -> zero z-score, not NaN/Inf.
        for _ in 0..4 {
            let y = k.add_sample(5.0);
            assert_eq!(y, 0.0);
        }
    }

    #[test]
    fn single_element_window_is_pure_function_of_current_sample() {
        let mut mean = MovingMean::new(1);
        assert_eq!(mean.add_sample(7.0), 7.0);
        assert_eq!(mean.add_sample(3.0), 3.0);

        let mut rms = MovingRms::new(1);
        assert_eq!(rms.add_sample(-4.0), 4.0);
    }
}
