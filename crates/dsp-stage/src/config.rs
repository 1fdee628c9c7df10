//! Declarative per-stage configuration, parsed from the same document shape
//! state is serialized with.

use dsp_core::{ConfigError, DEFAULT_EPSILON};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Batch,
    Moving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectifyMode {
    Full,
    Half,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawStageConfig {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    window_size: Option<usize>,
    #[serde(default)]
    epsilon: Option<f32>,
    #[serde(default)]
    sample_rate: Option<f32>,
}

/// Parsed, validated configuration for one of the non-rectify statistical
/// stages. `windowSize: 0` under moving mode is preserved as-is so stages
/// that support window-size inference (`meanAbsoluteValue`) can detect the
/// sentinel; every other moving stage rejects it eagerly via
/// [`StageConfig::require_window_size`].
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub mode: Mode,
    pub window_size: usize,
    pub epsilon: f32,
    pub sample_rate: Option<f32>,
}

impl StageConfig {
    pub fn parse(doc: &serde_json::Value) -> Result<Self, ConfigError> {
        let raw: RawStageConfig = serde_json::from_value(doc.clone())
            .map_err(|e| ConfigError::InvalidConfig { reason: e.to_string() })?;

        let mode = match raw.mode.as_deref() {
            Some("batch") => Mode::Batch,
            Some("moving") => Mode::Moving,
            Some(other) => {
                return Err(ConfigError::InvalidConfig { reason: format!("unknown mode: {other}") })
            }
            None => return Err(ConfigError::InvalidConfig { reason: "mode is required".into() }),
        };

        let window_size = raw.window_size.unwrap_or(0);

        Ok(Self {
            mode,
            window_size,
            epsilon: raw.epsilon.unwrap_or(DEFAULT_EPSILON),
            sample_rate: raw.sample_rate,
        })
    }

    /// Fails unless a positive `windowSize` was given for a moving-mode
    /// stage. Every moving stage calls this except `meanAbsoluteValue`,
    /// which treats `0` as "infer from sample rate" instead.
    pub fn require_window_size(&self) -> Result<usize, ConfigError> {
        if self.mode == Mode::Moving && self.window_size == 0 {
            return Err(ConfigError::MissingWindowSize);
        }
        Ok(self.window_size)
    }
}

pub fn parse_rectify_mode(doc: &serde_json::Value) -> Result<RectifyMode, ConfigError> {
    #[derive(Deserialize)]
    struct RawRectify {
        mode: Option<String>,
    }
    let raw: RawRectify = serde_json::from_value(doc.clone())
        .map_err(|e| ConfigError::InvalidConfig { reason: e.to_string() })?;
    match raw.mode.as_deref() {
        Some("full") => Ok(RectifyMode::Full),
        Some("half") => Ok(RectifyMode::Half),
        Some(other) => {
            Err(ConfigError::InvalidConfig { reason: format!("unknown rectify mode: {other}") })
        }
        None => Err(ConfigError::InvalidConfig { reason: "mode is required".into() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_moving_with_window_size() {
        let cfg = StageConfig::parse(&json!({"mode": "moving", "windowSize": 5})).unwrap();
        assert_eq!(cfg.mode, Mode::Moving);
        assert_eq!(cfg.window_size, 5);
    }

    #[test]
    fn missing_window_size_on_moving_is_an_error() {
        let cfg = StageConfig::parse(&json!({"mode": "moving"})).unwrap();
        assert!(matches!(cfg.require_window_size(), Err(ConfigError::MissingWindowSize)));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let cfg = StageConfig::parse(&json!({"mode": "batch", "unrelated": true})).unwrap();
        assert_eq!(cfg.mode, Mode::Batch);
    }

    #[test]
    fn epsilon_defaults_when_absent() {
        let cfg = StageConfig::parse(&json!({"mode": "batch"})).unwrap();
        assert_eq!(cfg.epsilon, DEFAULT_EPSILON);
    }
}
