//! Crate-wide error taxonomy for the streaming stage engine.

use thiserror::Error;

/// Errors raised while adding a stage to a pipeline or while a stage's own
/// configuration is parsed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown stage type: {type_id}")]
    UnknownStage { type_id: String },

    #[error("invalid stage config: {reason}")]
    InvalidConfig { reason: String },

    #[error("windowSize is required when mode is moving")]
    MissingWindowSize,
}

/// Errors raised by `Pipeline::process` / `Stage::process` before any buffer
/// mutation has taken place.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("channel count mismatch: stage was initialized with {expected} channels, got {actual}")]
    ChannelCountMismatch { expected: usize, actual: usize },

    #[error("invalid buffer length {len} for {channels} channels")]
    InvalidBufferLength { len: usize, channels: usize },
}

/// Errors raised while restoring serialized state. The pipeline/stage is left
/// exactly as it was before the failed restore (no partial application).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("mode mismatch: document describes a different mode than the configured stage")]
    ModeMismatch,

    #[error("window size mismatch: expected {expected}, document has {actual}")]
    WindowSizeMismatch { expected: usize, actual: usize },

    #[error("epsilon mismatch: expected {expected}, document has {actual}")]
    EpsilonMismatch { expected: f32, actual: f32 },

    #[error(
        "aggregate checksum failed for {field}: expected {expected}, recomputed {actual} (tolerance {tolerance})"
    )]
    AggregateChecksumFailed {
        field: &'static str,
        expected: f32,
        actual: f32,
        tolerance: f32,
    },

    #[error("stage count mismatch: pipeline has {expected} stages, document has {actual}")]
    StageCountMismatch { expected: usize, actual: usize },

    #[error("malformed state document: {0}")]
    Malformed(String),
}

/// Top-level error type returned by every fallible operation in the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("input error: {0}")]
    Input(#[from] InputError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Reserved for runtime faults outside the kernel/stage contract (§7).
    /// No core code path currently constructs this variant.
    #[error("pipeline runtime error: {0}")]
    Runtime(String),
}

pub type DspResult<T> = Result<T, DspError>;
