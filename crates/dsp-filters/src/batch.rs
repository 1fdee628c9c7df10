//! Stateless batch statistics.
//!
//! Batch mode consumes a whole channel's samples, computes the population
//! statistic in double precision for numerical headroom, then overwrites
//! every sample in the channel with the scalar answer — except z-score,
//! which substitutes each sample with its standardized value.

use dsp_core::Sample;

fn mean_f64(channel: &[Sample]) -> f64 {
    let sum: f64 = channel.iter().map(|&x| x as f64).sum();
    sum / channel.len() as f64
}

fn mean_abs_f64(channel: &[Sample]) -> f64 {
    let sum: f64 = channel.iter().map(|&x| (x as f64).abs()).sum();
    sum / channel.len() as f64
}

fn mean_sq_f64(channel: &[Sample]) -> f64 {
    let sum: f64 = channel.iter().map(|&x| (x as f64) * (x as f64)).sum();
    sum / channel.len() as f64
}

fn population_variance_f64(channel: &[Sample]) -> f64 {
    let mean = mean_f64(channel);
    (mean_sq_f64(channel) - mean * mean).max(0.0)
}

/// Fills `channel` with its population mean.
pub fn batch_mean(channel: &mut [Sample]) {
    if channel.is_empty() {
        return;
    }
    let mean = mean_f64(channel) as Sample;
    channel.fill(mean);
}

/// Fills `channel` with its mean absolute value.
pub fn batch_mav(channel: &mut [Sample]) {
    if channel.is_empty() {
        return;
    }
    let mav = mean_abs_f64(channel) as Sample;
    channel.fill(mav);
}

/// Fills `channel` with its RMS value.
pub fn batch_rms(channel: &mut [Sample]) {
    if channel.is_empty() {
        return;
    }
    let rms = mean_sq_f64(channel).max(0.0).sqrt() as Sample;
    channel.fill(rms);
}

/// Fills `channel` with its population variance.
pub fn batch_variance(channel: &mut [Sample]) {
    if channel.is_empty() {
        return;
    }
    let variance = population_variance_f64(channel) as Sample;
    channel.fill(variance);
}

/// Replaces every sample in `channel` with its z-score against the channel's
/// own population mean/stddev.
pub fn batch_zscore(channel: &mut [Sample], epsilon: Sample) {
    if channel.is_empty() {
        return;
    }
    let mean = mean_f64(channel);
    let stddev = population_variance_f64(channel).sqrt();
    let stddev32 = stddev as Sample;
    if stddev32 < epsilon {
        channel.fill(0.0);
        return;
    }
    let divisor = stddev.max(epsilon as f64);
    for x in channel.iter_mut() {
        *x = ((*x as f64 - mean) / divisor) as Sample;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn batch_mean_matches_s2() {
        let mut ch = [10.0, 20.0, 30.0, 40.0, 50.0];
        batch_mean(&mut ch);
        assert_eq!(ch, [30.0; 5]);
    }

    #[test]
    fn batch_zscore_matches_s6() {
        let mut ch = [10.0, 20.0, 30.0, 40.0, 50.0];
        batch_zscore(&mut ch, 1e-6);
        let expected = [-1.41421, -0.70711, 0.0, 0.70711, 1.41421];
        for (a, b) in ch.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-4);
        }
    }

    #[test]
    fn batch_is_idempotent() {
        let mut ch = [1.0, 2.0, 3.0, 4.0];
        batch_rms(&mut ch);
        let once = ch;
        batch_rms(&mut ch);
        assert_eq!(ch, once);
    }

    #[test]
    fn batch_zscore_constant_channel_is_zero_not_nan() {
        let mut ch = [5.0, 5.0, 5.0];
        batch_zscore(&mut ch, 1e-6);
        assert_eq!(ch, [0.0, 0.0, 0.0]);
    }
}
