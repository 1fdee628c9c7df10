//! Wire-format types for a single stage's `state` payload.
//!
//! These mirror the external state document shape field for field; the
//! pipeline crate embeds the `serde_json::Value` this module produces
//! verbatim under each stage's `state` key.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModeTag {
    Batch,
    Moving,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RectifyModeTag {
    Full,
    Half,
}

/// One channel's ring window contents plus the aggregates the owning kernel
/// declares. Unused aggregate fields are omitted rather than zeroed, so a
/// stage's document shape reflects exactly what it tracks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDoc {
    pub buffer: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_sum: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_sum_of_squares: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchStateDoc {
    pub mode: ModeTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MovingStateDoc {
    pub mode: ModeTag,
    pub window_size: usize,
    pub num_channels: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f32>,
    pub channels: Vec<ChannelDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RectifyStateDoc {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub mode: RectifyModeTag,
}

/// Parses a stage's `state` payload into `T`, mapping any structural
/// mismatch to [`dsp_core::StateError::Malformed`] rather than panicking.
pub fn parse_doc<T: serde::de::DeserializeOwned>(
    value: &serde_json::Value,
) -> Result<T, dsp_core::StateError> {
    serde_json::from_value(value.clone()).map_err(|e| dsp_core::StateError::Malformed(e.to_string()))
}
