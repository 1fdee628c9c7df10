//! dsp-core: shared types and errors for the streaming stage engine.
//!
//! Every other crate in this workspace depends on this one for the sample
//! type alias and the error taxonomy; it carries no DSP logic of its own.

mod error;
mod sample;

pub use error::{ConfigError, DspError, DspResult, InputError, StateError};
pub use sample::{aggregates_agree, Sample, AGGREGATE_TOLERANCE, DEFAULT_EPSILON};
