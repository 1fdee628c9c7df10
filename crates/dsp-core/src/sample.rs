//! Sample type shared across the stage engine.

/// Type alias for a single DSP sample. Fixed at single precision; only
/// accumulators inside kernels (e.g. batch recomputation) are widened to
/// double precision.
pub type Sample = f32;

/// Relative/absolute tolerance used when comparing a recomputed aggregate
/// against a stored one (ring window restore, aggregate checksum).
pub const AGGREGATE_TOLERANCE: f32 = 1e-4;

/// Default epsilon for the z-score kernel's standard-deviation floor.
pub const DEFAULT_EPSILON: f32 = 1e-6;

/// True when `actual` and `expected` agree within the aggregate tolerance,
/// scaled by the magnitude of `actual` (`max(1, |actual|) * tolerance`) —
/// `actual` is the freshly recomputed, trusted value; `expected` is the
/// claimed value from a document under validation.
#[inline]
pub fn aggregates_agree(expected: f32, actual: f32) -> bool {
    (expected - actual).abs() <= actual.abs().max(1.0) * AGGREGATE_TOLERANCE
}
