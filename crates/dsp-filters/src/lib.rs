//! dsp-filters: the online and batch statistical filters the stage engine
//! is built from — the ring window primitive and the per-channel kernels
//! wrapping it.

pub mod batch;
pub mod kernel;
pub mod rectify;
pub mod ring;

pub use kernel::{Kernel, MovingMav, MovingMean, MovingRms, MovingVariance, MovingZScore};
pub use ring::{AggregateSet, Aggregates, RingWindow};
