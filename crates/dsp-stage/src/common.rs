//! Shared buffer validation and lazy per-channel kernel fan-out used by every
//! moving-mode statistical stage.

use dsp_core::{DspError, DspResult, InputError, Sample};
use dsp_filters::Kernel;
use log::debug;

/// Checks the `process` precondition shared by every stage: at least one
/// channel, and a buffer length that is an exact multiple of it.
pub fn validate_buffer(buffer_len: usize, num_channels: usize) -> DspResult<()> {
    if num_channels == 0 || buffer_len % num_channels != 0 {
        return Err(DspError::Input(InputError::InvalidBufferLength {
            len: buffer_len,
            channels: num_channels,
        }));
    }
    Ok(())
}

/// Lazily allocates `num_channels` kernels on first use; on subsequent calls
/// with a different channel count, fails rather than silently reshaping.
pub fn ensure_channels<K>(
    channels: &mut Vec<K>,
    num_channels: usize,
    make: impl Fn() -> K,
) -> DspResult<()> {
    if channels.is_empty() {
        debug!("allocating {num_channels} channel kernels on first process call");
        channels.reserve(num_channels);
        for _ in 0..num_channels {
            channels.push(make());
        }
    } else if channels.len() != num_channels {
        return Err(DspError::Input(InputError::ChannelCountMismatch {
            expected: channels.len(),
            actual: num_channels,
        }));
    }
    Ok(())
}

/// Runs every sample of an interleaved buffer through its channel's kernel,
/// in place.
pub fn process_moving<K: Kernel>(channels: &mut [K], buffer: &mut [Sample], num_channels: usize) {
    for (i, x) in buffer.iter_mut().enumerate() {
        let ch = i % num_channels;
        *x = channels[ch].add_sample(*x);
    }
}

/// Runs a batch statistic independently over each channel's de-interleaved
/// sample subsequence.
pub fn process_batch(buffer: &mut [Sample], num_channels: usize, mut per_channel: impl FnMut(&mut [Sample])) {
    let mut scratch = vec![0.0; buffer.len() / num_channels];
    for ch in 0..num_channels {
        for (slot, sample) in scratch.iter_mut().zip(buffer.iter().skip(ch).step_by(num_channels)) {
            *slot = *sample;
        }
        per_channel(&mut scratch);
        for (sample, &value) in buffer.iter_mut().skip(ch).step_by(num_channels).zip(scratch.iter()) {
            *sample = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_buffer_rejects_zero_channels() {
        assert!(validate_buffer(4, 0).is_err());
    }

    #[test]
    fn validate_buffer_rejects_non_multiple_length() {
        assert!(validate_buffer(5, 2).is_err());
    }

    #[test]
    fn process_batch_deinterleaves_per_channel() {
        let mut buf = [1.0, 10.0, 2.0, 20.0, 3.0, 30.0];
        process_batch(&mut buf, 2, |ch| {
            let sum: f32 = ch.iter().sum();
            ch.fill(sum);
        });
        assert_eq!(buf, [6.0, 60.0, 6.0, 60.0, 6.0, 60.0]);
    }
}
