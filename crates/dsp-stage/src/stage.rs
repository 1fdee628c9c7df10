//! The fixed stage catalog.
//!
//! Dispatch is a `match` over a tagged variant rather than a `dyn Trait`
//! vtable: the catalog is closed and known at compile time, so each variant
//! carries its own concrete state instead of going through a virtual call.

use dsp_core::{DspError, DspResult, Sample, StateError};
use dsp_filters::ring::Aggregates;
use dsp_filters::{batch, rectify, Kernel, MovingMav, MovingMean, MovingRms, MovingVariance, MovingZScore};
use serde_json::json;

use crate::common::{ensure_channels, process_batch, process_moving, validate_buffer};
use crate::config::{Mode, RectifyMode, StageConfig};
use crate::document::{parse_doc, BatchStateDoc, ChannelDoc, ModeTag, MovingStateDoc, RectifyModeTag, RectifyStateDoc};

/// Stable per-stage type identifier, as named in the external interface.
pub const TYPE_MOVING_AVERAGE: &str = "movingAverage";
pub const TYPE_MEAN_ABSOLUTE_VALUE: &str = "meanAbsoluteValue";
pub const TYPE_RMS: &str = "rms";
pub const TYPE_VARIANCE: &str = "variance";
pub const TYPE_ZSCORE_NORMALIZE: &str = "zScoreNormalize";
pub const TYPE_RECTIFY: &str = "rectify";

/// Assumed buffer arrival rate (samples/second per chunk) used to turn a
/// sample rate into a sample-count window for `meanAbsoluteValue`'s
/// inference path. There is no canonical value for this in the source; 100
/// makes the "10-sample-equivalent" heuristic resolve to a window of 10 at
/// a 100 Hz sample rate, the order of magnitude typical EMG/IoT feeds use.
const ASSUMED_CHUNK_RATE_HZ: f32 = 100.0;

macro_rules! moving_stat_stage {
    ($name:ident, $kernel:ty, $batch_fn:path, agg = sum) => {
        #[derive(Debug)]
        pub struct $name {
            mode: Mode,
            window_size: usize,
            channels: Vec<$kernel>,
        }

        impl $name {
            pub fn new(config: &StageConfig) -> DspResult<Self> {
                let window_size = if config.mode == Mode::Moving {
                    config.require_window_size()?
                } else {
                    0
                };
                Ok(Self { mode: config.mode, window_size, channels: Vec::new() })
            }

            pub fn process(&mut self, buffer: &mut [Sample], num_channels: usize) -> DspResult<()> {
                validate_buffer(buffer.len(), num_channels)?;
                match self.mode {
                    Mode::Batch => process_batch(buffer, num_channels, $batch_fn),
                    Mode::Moving => {
                        let window_size = self.window_size;
                        ensure_channels(&mut self.channels, num_channels, || {
                            <$kernel>::new(window_size)
                        })?;
                        process_moving(&mut self.channels, buffer, num_channels);
                    }
                }
                Ok(())
            }

            pub fn reset(&mut self) {
                for c in &mut self.channels {
                    c.clear();
                }
            }

            pub fn serialize(&self) -> serde_json::Value {
                match self.mode {
                    Mode::Batch => {
                        json!(BatchStateDoc { mode: ModeTag::Batch, epsilon: None })
                    }
                    Mode::Moving => {
                        let channels = self
                            .channels
                            .iter()
                            .map(|k| {
                                let (buffer, agg) = k.snapshot();
                                ChannelDoc { buffer, running_sum: Some(agg.sum), running_sum_of_squares: None }
                            })
                            .collect();
                        json!(MovingStateDoc {
                            mode: ModeTag::Moving,
                            window_size: self.window_size,
                            num_channels: self.channels.len(),
                            epsilon: None,
                            channels,
                        })
                    }
                }
            }

            pub fn deserialize(&mut self, value: &serde_json::Value) -> DspResult<()> {
                match self.mode {
                    Mode::Batch => {
                        let doc: BatchStateDoc = parse_doc(value)?;
                        if doc.mode != ModeTag::Batch {
                            return Err(StateError::ModeMismatch.into());
                        }
                        Ok(())
                    }
                    Mode::Moving => {
                        let doc: MovingStateDoc = parse_doc(value)?;
                        if doc.mode != ModeTag::Moving {
                            return Err(StateError::ModeMismatch.into());
                        }
                        if doc.window_size != self.window_size {
                            return Err(StateError::WindowSizeMismatch {
                                expected: self.window_size,
                                actual: doc.window_size,
                            }
                            .into());
                        }
                        let mut rebuilt = Vec::with_capacity(doc.channels.len());
                        for ch in &doc.channels {
                            let mut k = <$kernel>::new(self.window_size);
                            let claimed = Aggregates {
                                sum: ch.running_sum.unwrap_or(0.0),
                                sum_abs: 0.0,
                                sum_sq: 0.0,
                            };
                            k.restore(&ch.buffer, claimed)?;
                            rebuilt.push(k);
                        }
                        self.channels = rebuilt;
                        Ok(())
                    }
                }
            }
        }
    };

    ($name:ident, $kernel:ty, $batch_fn:path, agg = sum_sq) => {
        #[derive(Debug)]
        pub struct $name {
            mode: Mode,
            window_size: usize,
            channels: Vec<$kernel>,
        }

        impl $name {
            pub fn new(config: &StageConfig) -> DspResult<Self> {
                let window_size = if config.mode == Mode::Moving {
                    config.require_window_size()?
                } else {
                    0
                };
                Ok(Self { mode: config.mode, window_size, channels: Vec::new() })
            }

            pub fn process(&mut self, buffer: &mut [Sample], num_channels: usize) -> DspResult<()> {
                validate_buffer(buffer.len(), num_channels)?;
                match self.mode {
                    Mode::Batch => process_batch(buffer, num_channels, $batch_fn),
                    Mode::Moving => {
                        let window_size = self.window_size;
                        ensure_channels(&mut self.channels, num_channels, || {
                            <$kernel>::new(window_size)
                        })?;
                        process_moving(&mut self.channels, buffer, num_channels);
                    }
                }
                Ok(())
            }

            pub fn reset(&mut self) {
                for c in &mut self.channels {
                    c.clear();
                }
            }

            pub fn serialize(&self) -> serde_json::Value {
                match self.mode {
                    Mode::Batch => json!(BatchStateDoc { mode: ModeTag::Batch, epsilon: None }),
                    Mode::Moving => {
                        let channels = self
                            .channels
                            .iter()
                            .map(|k| {
                                let (buffer, agg) = k.snapshot();
                                ChannelDoc {
                                    buffer,
                                    running_sum: None,
                                    running_sum_of_squares: Some(agg.sum_sq),
                                }
                            })
                            .collect();
                        json!(MovingStateDoc {
                            mode: ModeTag::Moving,
                            window_size: self.window_size,
                            num_channels: self.channels.len(),
                            epsilon: None,
                            channels,
                        })
                    }
                }
            }

            pub fn deserialize(&mut self, value: &serde_json::Value) -> DspResult<()> {
                match self.mode {
                    Mode::Batch => {
                        let doc: BatchStateDoc = parse_doc(value)?;
                        if doc.mode != ModeTag::Batch {
                            return Err(StateError::ModeMismatch.into());
                        }
                        Ok(())
                    }
                    Mode::Moving => {
                        let doc: MovingStateDoc = parse_doc(value)?;
                        if doc.mode != ModeTag::Moving {
                            return Err(StateError::ModeMismatch.into());
                        }
                        if doc.window_size != self.window_size {
                            return Err(StateError::WindowSizeMismatch {
                                expected: self.window_size,
                                actual: doc.window_size,
                            }
                            .into());
                        }
                        let mut rebuilt = Vec::with_capacity(doc.channels.len());
                        for ch in &doc.channels {
                            let mut k = <$kernel>::new(self.window_size);
                            let claimed = Aggregates {
                                sum: 0.0,
                                sum_abs: 0.0,
                                sum_sq: ch.running_sum_of_squares.unwrap_or(0.0),
                            };
                            k.restore(&ch.buffer, claimed)?;
                            rebuilt.push(k);
                        }
                        self.channels = rebuilt;
                        Ok(())
                    }
                }
            }
        }
    };

    ($name:ident, $kernel:ty, $batch_fn:path, agg = both) => {
        #[derive(Debug)]
        pub struct $name {
            mode: Mode,
            window_size: usize,
            channels: Vec<$kernel>,
        }

        impl $name {
            pub fn new(config: &StageConfig) -> DspResult<Self> {
                let window_size = if config.mode == Mode::Moving {
                    config.require_window_size()?
                } else {
                    0
                };
                Ok(Self { mode: config.mode, window_size, channels: Vec::new() })
            }

            pub fn process(&mut self, buffer: &mut [Sample], num_channels: usize) -> DspResult<()> {
                validate_buffer(buffer.len(), num_channels)?;
                match self.mode {
                    Mode::Batch => process_batch(buffer, num_channels, $batch_fn),
                    Mode::Moving => {
                        let window_size = self.window_size;
                        ensure_channels(&mut self.channels, num_channels, || {
                            <$kernel>::new(window_size)
                        })?;
                        process_moving(&mut self.channels, buffer, num_channels);
                    }
                }
                Ok(())
            }

            pub fn reset(&mut self) {
                for c in &mut self.channels {
                    c.clear();
                }
            }

            pub fn serialize(&self) -> serde_json::Value {
                match self.mode {
                    Mode::Batch => json!(BatchStateDoc { mode: ModeTag::Batch, epsilon: None }),
                    Mode::Moving => {
                        let channels = self
                            .channels
                            .iter()
                            .map(|k| {
                                let (buffer, agg) = k.snapshot();
                                ChannelDoc {
                                    buffer,
                                    running_sum: Some(agg.sum),
                                    running_sum_of_squares: Some(agg.sum_sq),
                                }
                            })
                            .collect();
                        json!(MovingStateDoc {
                            mode: ModeTag::Moving,
                            window_size: self.window_size,
                            num_channels: self.channels.len(),
                            epsilon: None,
                            channels,
                        })
                    }
                }
            }

            pub fn deserialize(&mut self, value: &serde_json::Value) -> DspResult<()> {
                match self.mode {
                    Mode::Batch => {
                        let doc: BatchStateDoc = parse_doc(value)?;
                        if doc.mode != ModeTag::Batch {
                            return Err(StateError::ModeMismatch.into());
                        }
                        Ok(())
                    }
                    Mode::Moving => {
                        let doc: MovingStateDoc = parse_doc(value)?;
                        if doc.mode != ModeTag::Moving {
                            return Err(StateError::ModeMismatch.into());
                        }
                        if doc.window_size != self.window_size {
                            return Err(StateError::WindowSizeMismatch {
                                expected: self.window_size,
                                actual: doc.window_size,
                            }
                            .into());
                        }
                        let mut rebuilt = Vec::with_capacity(doc.channels.len());
                        for ch in &doc.channels {
                            let mut k = <$kernel>::new(self.window_size);
                            let claimed = Aggregates {
                                sum: ch.running_sum.unwrap_or(0.0),
                                sum_abs: 0.0,
                                sum_sq: ch.running_sum_of_squares.unwrap_or(0.0),
                            };
                            k.restore(&ch.buffer, claimed)?;
                            rebuilt.push(k);
                        }
                        self.channels = rebuilt;
                        Ok(())
                    }
                }
            }
        }
    };
}

moving_stat_stage!(MovingAverageStage, MovingMean, batch::batch_mean, agg = sum);
moving_stat_stage!(RmsStage, MovingRms, batch::batch_rms, agg = sum_sq);
moving_stat_stage!(VarianceStage, MovingVariance, batch::batch_variance, agg = both);

/// `meanAbsoluteValue`. Built by hand rather than through
/// `moving_stat_stage!` because it alone supports the `windowSize: 0`
/// sample-rate inference path.
#[derive(Debug)]
pub struct MavStage {
    mode: Mode,
    window_size: usize,
    sample_rate: Option<f32>,
    channels: Vec<MovingMav>,
}

impl MavStage {
    pub fn new(config: &StageConfig) -> DspResult<Self> {
        let window_size = if config.mode == Mode::Moving { config.window_size } else { 0 };
        Ok(Self { mode: config.mode, window_size, sample_rate: config.sample_rate, channels: Vec::new() })
    }

    fn resolve_window_size(&mut self, sample_rate: Option<f32>) -> DspResult<usize> {
        if self.window_size > 0 {
            return Ok(self.window_size);
        }
        let rate = sample_rate.or(self.sample_rate).unwrap_or(0.0);
        if rate <= 0.0 {
            return Err(DspError::from(dsp_core::ConfigError::MissingWindowSize));
        }
        let inferred = ((10.0 * rate / ASSUMED_CHUNK_RATE_HZ).floor() as i64).max(1) as usize;
        self.window_size = inferred;
        Ok(inferred)
    }

    pub fn process(&mut self, buffer: &mut [Sample], num_channels: usize) -> DspResult<()> {
        self.process_with_rate(buffer, num_channels, None)
    }

    pub fn process_with_rate(
        &mut self,
        buffer: &mut [Sample],
        num_channels: usize,
        sample_rate: Option<f32>,
    ) -> DspResult<()> {
        validate_buffer(buffer.len(), num_channels)?;
        match self.mode {
            Mode::Batch => process_batch(buffer, num_channels, batch::batch_mav),
            Mode::Moving => {
                let window_size = self.resolve_window_size(sample_rate)?;
                ensure_channels(&mut self.channels, num_channels, || MovingMav::new(window_size))?;
                process_moving(&mut self.channels, buffer, num_channels);
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        for c in &mut self.channels {
            c.clear();
        }
    }

    pub fn serialize(&self) -> serde_json::Value {
        match self.mode {
            Mode::Batch => json!(BatchStateDoc { mode: ModeTag::Batch, epsilon: None }),
            Mode::Moving => {
                let channels = self
                    .channels
                    .iter()
                    .map(|k| {
                        let (buffer, agg) = k.snapshot();
                        ChannelDoc { buffer, running_sum: Some(agg.sum_abs), running_sum_of_squares: None }
                    })
                    .collect();
                json!(MovingStateDoc {
                    mode: ModeTag::Moving,
                    window_size: self.window_size,
                    num_channels: self.channels.len(),
                    epsilon: None,
                    channels,
                })
            }
        }
    }

    pub fn deserialize(&mut self, value: &serde_json::Value) -> DspResult<()> {
        match self.mode {
            Mode::Batch => {
                let doc: BatchStateDoc = parse_doc(value)?;
                if doc.mode != ModeTag::Batch {
                    return Err(StateError::ModeMismatch.into());
                }
                Ok(())
            }
            Mode::Moving => {
                let doc: MovingStateDoc = parse_doc(value)?;
                if doc.mode != ModeTag::Moving {
                    return Err(StateError::ModeMismatch.into());
                }
                // An inferred window size is only known after the first
                // process call; a document from a pipeline that never
                // processed anything would have no meaningful windowSize to
                // check against, but loadState always follows at least one
                // configured stage, so self.window_size is authoritative
                // once non-zero.
                if self.window_size != 0 && doc.window_size != self.window_size {
                    return Err(StateError::WindowSizeMismatch {
                        expected: self.window_size,
                        actual: doc.window_size,
                    }
                    .into());
                }
                self.window_size = doc.window_size;
                let mut rebuilt = Vec::with_capacity(doc.channels.len());
                for ch in &doc.channels {
                    let mut k = MovingMav::new(self.window_size);
                    let claimed =
                        Aggregates { sum: 0.0, sum_abs: ch.running_sum.unwrap_or(0.0), sum_sq: 0.0 };
                    k.restore(&ch.buffer, claimed)?;
                    rebuilt.push(k);
                }
                self.channels = rebuilt;
                Ok(())
            }
        }
    }
}

/// `zScoreNormalize`. Hand-written because it alone carries an `epsilon`.
#[derive(Debug)]
pub struct ZScoreStage {
    mode: Mode,
    window_size: usize,
    epsilon: Sample,
    channels: Vec<MovingZScore>,
}

impl ZScoreStage {
    pub fn new(config: &StageConfig) -> DspResult<Self> {
        let window_size = if config.mode == Mode::Moving { config.require_window_size()? } else { 0 };
        Ok(Self { mode: config.mode, window_size, epsilon: config.epsilon, channels: Vec::new() })
    }

    pub fn process(&mut self, buffer: &mut [Sample], num_channels: usize) -> DspResult<()> {
        validate_buffer(buffer.len(), num_channels)?;
        match self.mode {
            Mode::Batch => {
                let epsilon = self.epsilon;
                process_batch(buffer, num_channels, |ch| batch::batch_zscore(ch, epsilon));
            }
            Mode::Moving => {
                let (window_size, epsilon) = (self.window_size, self.epsilon);
                ensure_channels(&mut self.channels, num_channels, || MovingZScore::new(window_size, epsilon))?;
                process_moving(&mut self.channels, buffer, num_channels);
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        for c in &mut self.channels {
            c.clear();
        }
    }

    pub fn serialize(&self) -> serde_json::Value {
        match self.mode {
            Mode::Batch => json!(BatchStateDoc { mode: ModeTag::Batch, epsilon: Some(self.epsilon) }),
            Mode::Moving => {
                let channels = self
                    .channels
                    .iter()
                    .map(|k| {
                        let (buffer, agg) = k.snapshot();
                        ChannelDoc {
                            buffer,
                            running_sum: Some(agg.sum),
                            running_sum_of_squares: Some(agg.sum_sq),
                        }
                    })
                    .collect();
                json!(MovingStateDoc {
                    mode: ModeTag::Moving,
                    window_size: self.window_size,
                    num_channels: self.channels.len(),
                    epsilon: Some(self.epsilon),
                    channels,
                })
            }
        }
    }

    pub fn deserialize(&mut self, value: &serde_json::Value) -> DspResult<()> {
        match self.mode {
            Mode::Batch => {
                let doc: BatchStateDoc = parse_doc(value)?;
                if doc.mode != ModeTag::Batch {
                    return Err(StateError::ModeMismatch.into());
                }
                if let Some(e) = doc.epsilon {
                    if !dsp_core::aggregates_agree(e, self.epsilon) {
                        return Err(StateError::EpsilonMismatch { expected: self.epsilon, actual: e }.into());
                    }
                }
                Ok(())
            }
            Mode::Moving => {
                let doc: MovingStateDoc = parse_doc(value)?;
                if doc.mode != ModeTag::Moving {
                    return Err(StateError::ModeMismatch.into());
                }
                if doc.window_size != self.window_size {
                    return Err(StateError::WindowSizeMismatch {
                        expected: self.window_size,
                        actual: doc.window_size,
                    }
                    .into());
                }
                if let Some(e) = doc.epsilon {
                    if !dsp_core::aggregates_agree(e, self.epsilon) {
                        return Err(StateError::EpsilonMismatch { expected: self.epsilon, actual: e }.into());
                    }
                }
                let mut rebuilt = Vec::with_capacity(doc.channels.len());
                for ch in &doc.channels {
                    let mut k = MovingZScore::new(self.window_size, self.epsilon);
                    let claimed = Aggregates {
                        sum: ch.running_sum.unwrap_or(0.0),
                        sum_abs: 0.0,
                        sum_sq: ch.running_sum_of_squares.unwrap_or(0.0),
                    };
                    k.restore(&ch.buffer, claimed)?;
                    rebuilt.push(k);
                }
                self.channels = rebuilt;
                Ok(())
            }
        }
    }
}

/// `rectify`. Entirely stateless: no channel vector, no lazy init, no
/// `ChannelCountMismatch` possible.
#[derive(Debug)]
pub struct RectifyStage {
    submode: RectifyMode,
}

impl RectifyStage {
    pub fn new(submode: RectifyMode) -> Self {
        Self { submode }
    }

    pub fn process(&mut self, buffer: &mut [Sample], num_channels: usize) -> DspResult<()> {
        validate_buffer(buffer.len(), num_channels)?;
        let f = match self.submode {
            RectifyMode::Full => rectify::full_wave,
            RectifyMode::Half => rectify::half_wave,
        };
        for x in buffer.iter_mut() {
            *x = f(*x);
        }
        Ok(())
    }

    pub fn reset(&mut self) {}

    pub fn serialize(&self) -> serde_json::Value {
        let mode = match self.submode {
            RectifyMode::Full => RectifyModeTag::Full,
            RectifyMode::Half => RectifyModeTag::Half,
        };
        json!(RectifyStateDoc { type_tag: "rectify".to_string(), mode })
    }

    pub fn deserialize(&mut self, value: &serde_json::Value) -> DspResult<()> {
        let doc: RectifyStateDoc = parse_doc(value)?;
        let doc_mode = match doc.mode {
            RectifyModeTag::Full => RectifyMode::Full,
            RectifyModeTag::Half => RectifyMode::Half,
        };
        if doc_mode != self.submode {
            return Err(StateError::ModeMismatch.into());
        }
        Ok(())
    }
}

/// A lightweight, read-only projection of a stage's identity and occupancy.
/// Produced by `listState`; never accepted back for restoration.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    #[serde(rename = "type")]
    pub type_id: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_channels: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,
}

/// The fixed stage catalog: every variant of the DSP pipeline.
#[derive(Debug)]
pub enum Stage {
    MovingAverage(MovingAverageStage),
    MeanAbsoluteValue(MavStage),
    Rms(RmsStage),
    Variance(VarianceStage),
    ZScoreNormalize(ZScoreStage),
    Rectify(RectifyStage),
}

impl Stage {
    /// Constructs a stage from its type identifier and configuration
    /// document. The configuration document shape is the same whether it
    /// comes from a declarative pipeline description or a one-off call.
    pub fn construct(type_id: &str, config_doc: &serde_json::Value) -> DspResult<Self> {
        let stage = match type_id {
            TYPE_MOVING_AVERAGE => {
                let config = StageConfig::parse(config_doc)?;
                Stage::MovingAverage(MovingAverageStage::new(&config)?)
            }
            TYPE_MEAN_ABSOLUTE_VALUE => {
                let config = StageConfig::parse(config_doc)?;
                Stage::MeanAbsoluteValue(MavStage::new(&config)?)
            }
            TYPE_RMS => {
                let config = StageConfig::parse(config_doc)?;
                Stage::Rms(RmsStage::new(&config)?)
            }
            TYPE_VARIANCE => {
                let config = StageConfig::parse(config_doc)?;
                Stage::Variance(VarianceStage::new(&config)?)
            }
            TYPE_ZSCORE_NORMALIZE => {
                let config = StageConfig::parse(config_doc)?;
                Stage::ZScoreNormalize(ZScoreStage::new(&config)?)
            }
            TYPE_RECTIFY => {
                let submode = crate::config::parse_rectify_mode(config_doc)?;
                Stage::Rectify(RectifyStage::new(submode))
            }
            other => {
                return Err(DspError::from(dsp_core::ConfigError::UnknownStage { type_id: other.to_string() }))
            }
        };
        log::debug!("constructed stage {}", stage.type_id());
        Ok(stage)
    }

    pub fn type_id(&self) -> &'static str {
        match self {
            Stage::MovingAverage(_) => TYPE_MOVING_AVERAGE,
            Stage::MeanAbsoluteValue(_) => TYPE_MEAN_ABSOLUTE_VALUE,
            Stage::Rms(_) => TYPE_RMS,
            Stage::Variance(_) => TYPE_VARIANCE,
            Stage::ZScoreNormalize(_) => TYPE_ZSCORE_NORMALIZE,
            Stage::Rectify(_) => TYPE_RECTIFY,
        }
    }

    /// Runs this stage's `process` with no explicit sample rate. Equivalent
    /// to `process_with_rate(buffer, num_channels, None)`.
    pub fn process(&mut self, buffer: &mut [Sample], num_channels: usize) -> DspResult<()> {
        self.process_with_rate(buffer, num_channels, None)
    }

    /// Like [`Stage::process`], but also carries the process options'
    /// optional `sampleRate` through to the one stage that can use it:
    /// `meanAbsoluteValue`'s `windowSize: 0` inference path.
    pub fn process_with_rate(
        &mut self,
        buffer: &mut [Sample],
        num_channels: usize,
        sample_rate: Option<f32>,
    ) -> DspResult<()> {
        match self {
            Stage::MovingAverage(s) => s.process(buffer, num_channels),
            Stage::MeanAbsoluteValue(s) => s.process_with_rate(buffer, num_channels, sample_rate),
            Stage::Rms(s) => s.process(buffer, num_channels),
            Stage::Variance(s) => s.process(buffer, num_channels),
            Stage::ZScoreNormalize(s) => s.process(buffer, num_channels),
            Stage::Rectify(s) => s.process(buffer, num_channels),
        }
    }

    pub fn serialize(&self) -> serde_json::Value {
        match self {
            Stage::MovingAverage(s) => s.serialize(),
            Stage::MeanAbsoluteValue(s) => s.serialize(),
            Stage::Rms(s) => s.serialize(),
            Stage::Variance(s) => s.serialize(),
            Stage::ZScoreNormalize(s) => s.serialize(),
            Stage::Rectify(s) => s.serialize(),
        }
    }

    pub fn deserialize(&mut self, value: &serde_json::Value) -> DspResult<()> {
        match self {
            Stage::MovingAverage(s) => s.deserialize(value),
            Stage::MeanAbsoluteValue(s) => s.deserialize(value),
            Stage::Rms(s) => s.deserialize(value),
            Stage::Variance(s) => s.deserialize(value),
            Stage::ZScoreNormalize(s) => s.deserialize(value),
            Stage::Rectify(s) => s.deserialize(value),
        }
    }

    pub fn reset(&mut self) {
        log::debug!("resetting stage {}", self.type_id());
        match self {
            Stage::MovingAverage(s) => s.reset(),
            Stage::MeanAbsoluteValue(s) => s.reset(),
            Stage::Rms(s) => s.reset(),
            Stage::Variance(s) => s.reset(),
            Stage::ZScoreNormalize(s) => s.reset(),
            Stage::Rectify(s) => s.reset(),
        }
    }

    pub fn summary(&self) -> StageSummary {
        let type_id = self.type_id();
        match self {
            Stage::MovingAverage(s) => StageSummary {
                type_id,
                mode: Some(mode_label(s.mode)),
                window_size: moving_window(s.mode, s.window_size),
                epsilon: None,
                num_channels: Some(s.channels.len()),
                buffer_size: s.channels.first().map(|k| k.count()),
            },
            Stage::MeanAbsoluteValue(s) => StageSummary {
                type_id,
                mode: Some(mode_label(s.mode)),
                window_size: moving_window(s.mode, s.window_size),
                epsilon: None,
                num_channels: Some(s.channels.len()),
                buffer_size: s.channels.first().map(|k| k.count()),
            },
            Stage::Rms(s) => StageSummary {
                type_id,
                mode: Some(mode_label(s.mode)),
                window_size: moving_window(s.mode, s.window_size),
                epsilon: None,
                num_channels: Some(s.channels.len()),
                buffer_size: s.channels.first().map(|k| k.count()),
            },
            Stage::Variance(s) => StageSummary {
                type_id,
                mode: Some(mode_label(s.mode)),
                window_size: moving_window(s.mode, s.window_size),
                epsilon: None,
                num_channels: Some(s.channels.len()),
                buffer_size: s.channels.first().map(|k| k.count()),
            },
            Stage::ZScoreNormalize(s) => StageSummary {
                type_id,
                mode: Some(mode_label(s.mode)),
                window_size: moving_window(s.mode, s.window_size),
                epsilon: Some(s.epsilon),
                num_channels: Some(s.channels.len()),
                buffer_size: s.channels.first().map(|k| k.count()),
            },
            Stage::Rectify(_) => {
                StageSummary { type_id, mode: None, window_size: None, epsilon: None, num_channels: None, buffer_size: None }
            }
        }
    }
}

fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Batch => "batch",
        Mode::Moving => "moving",
    }
}

fn moving_window(mode: Mode, window_size: usize) -> Option<usize> {
    matches!(mode, Mode::Moving).then_some(window_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn moving_average_matches_s1() {
        let mut stage =
            Stage::construct(TYPE_MOVING_AVERAGE, &json!({"mode": "moving", "windowSize": 3})).unwrap();
        let mut buf = [1.0, 2.0, 3.0, 4.0, 5.0];
        stage.process(&mut buf, 1).unwrap();
        assert_eq!(buf, [1.0, 1.5, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn multi_channel_moving_average_matches_s7() {
        let mut stage =
            Stage::construct(TYPE_MOVING_AVERAGE, &json!({"mode": "moving", "windowSize": 3})).unwrap();
        let mut buf = [1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0];
        stage.process(&mut buf, 2).unwrap();
        assert_eq!(buf, [1.0, 10.0, 1.5, 15.0, 2.0, 20.0, 3.0, 30.0]);
    }

    #[test]
    fn batch_moving_average_matches_s2() {
        let mut stage = Stage::construct(TYPE_MOVING_AVERAGE, &json!({"mode": "batch"})).unwrap();
        let mut buf = [10.0, 20.0, 30.0, 40.0, 50.0];
        stage.process(&mut buf, 1).unwrap();
        assert_eq!(buf, [30.0; 5]);
    }

    #[test]
    fn rectify_full_matches_s3() {
        let mut stage = Stage::construct(TYPE_RECTIFY, &json!({"mode": "full"})).unwrap();
        let mut buf = [1.0, -2.0, 3.0, -4.0, 5.0, -6.0];
        stage.process(&mut buf, 1).unwrap();
        assert_eq!(buf, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn channel_count_mismatch_after_first_process_is_rejected() {
        let mut stage =
            Stage::construct(TYPE_MOVING_AVERAGE, &json!({"mode": "moving", "windowSize": 3})).unwrap();
        let mut buf = [1.0, 2.0];
        stage.process(&mut buf, 2).unwrap();
        let mut buf2 = [1.0, 2.0, 3.0];
        let err = stage.process(&mut buf2, 3).unwrap_err();
        assert!(matches!(err, DspError::Input(dsp_core::InputError::ChannelCountMismatch { .. })));
    }

    #[test]
    fn save_restore_round_trip_matches_property_8() {
        let mut a =
            Stage::construct(TYPE_MOVING_AVERAGE, &json!({"mode": "moving", "windowSize": 5})).unwrap();
        let mut first = [1.0, 2.0, 3.0, 4.0, 5.0];
        a.process(&mut first, 1).unwrap();
        let mut second = [6.0, 7.0, 8.0];
        a.process(&mut second, 1).unwrap();
        let doc = a.serialize();

        let mut b =
            Stage::construct(TYPE_MOVING_AVERAGE, &json!({"mode": "moving", "windowSize": 5})).unwrap();
        let mut warm = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        b.process(&mut warm, 1).unwrap();

        let mut c =
            Stage::construct(TYPE_MOVING_AVERAGE, &json!({"mode": "moving", "windowSize": 5})).unwrap();
        c.deserialize(&doc).unwrap();

        let mut tail_b = [9.0, 10.0, 11.0];
        let mut tail_c = [9.0, 10.0, 11.0];
        b.process(&mut tail_b, 1).unwrap();
        c.process(&mut tail_c, 1).unwrap();
        assert_eq!(tail_b, tail_c);
    }

    #[test]
    fn tampered_aggregate_is_rejected_on_restore() {
        let mut a =
            Stage::construct(TYPE_MOVING_AVERAGE, &json!({"mode": "moving", "windowSize": 3})).unwrap();
        let mut buf = [1.0, 2.0, 3.0];
        a.process(&mut buf, 1).unwrap();
        let mut doc = a.serialize();
        doc["channels"][0]["runningSum"] = json!(9999.0);

        let mut b =
            Stage::construct(TYPE_MOVING_AVERAGE, &json!({"mode": "moving", "windowSize": 3})).unwrap();
        let err = b.deserialize(&doc).unwrap_err();
        assert!(matches!(
            err,
            DspError::State(dsp_core::StateError::AggregateChecksumFailed { .. })
        ));
    }

    #[test]
    fn mav_infers_window_size_from_sample_rate_when_zero() {
        let mut stage = Stage::construct(
            TYPE_MEAN_ABSOLUTE_VALUE,
            &json!({"mode": "moving", "windowSize": 0, "sampleRate": 100.0}),
        )
        .unwrap();
        let Stage::MeanAbsoluteValue(mav) = &mut stage else { unreachable!() };
        let mut buf = [1.0; 8];
        mav.process(&mut buf, 1).unwrap();
        assert_eq!(mav.window_size, 10);
    }

    #[test]
    fn unknown_stage_type_is_rejected() {
        let err = Stage::construct("bogus", &json!({})).unwrap_err();
        assert!(matches!(err, DspError::Config(dsp_core::ConfigError::UnknownStage { .. })));
    }

    #[test]
    fn rectify_has_no_window_size_or_epsilon_in_summary() {
        let stage = Stage::construct(TYPE_RECTIFY, &json!({"mode": "full"})).unwrap();
        let summary = stage.summary();
        assert_eq!(summary.type_id, TYPE_RECTIFY);
        assert!(summary.mode.is_none());
        assert!(summary.window_size.is_none());
    }
}
