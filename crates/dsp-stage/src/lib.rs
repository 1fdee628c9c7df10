//! dsp-stage: the uniform stage interface over the statistical kernels in
//! `dsp-filters` — mode selection, lazy channel fan-out, and the
//! self-validating state document protocol.

pub mod common;
pub mod config;
pub mod document;
pub mod stage;

pub use config::{Mode, RectifyMode, StageConfig};
pub use stage::{Stage, StageSummary};
