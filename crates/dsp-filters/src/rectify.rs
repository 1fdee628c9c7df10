//! Stateless rectification. Shared between batch and moving mode since
//! rectify has no memory either way.

use dsp_core::Sample;

/// `x -> |x|`.
#[inline]
pub fn full_wave(x: Sample) -> Sample {
    x.abs()
}

/// `x -> max(0, x)`.
#[inline]
pub fn half_wave(x: Sample) -> Sample {
    x.max(0.0)
}
