//! Wire-format types for whole-pipeline state documents.

use serde::{Deserialize, Serialize};

/// One stage's entry inside a pipeline state document: its position, its
/// stable type identifier, and its own serialized `state` payload verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStateEntry {
    pub index: u32,
    #[serde(rename = "type")]
    pub type_id: String,
    pub state: serde_json::Value,
}

/// Whole-pipeline save/restore document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStateDocument {
    pub timestamp: i64,
    pub stage_count: u32,
    pub stages: Vec<StageStateEntry>,
}

/// A single stage's read-only entry in a pipeline summary listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummaryEntry {
    pub index: u32,
    #[serde(flatten)]
    pub summary: dsp_stage::StageSummary,
}

/// Lightweight, read-only projection of a pipeline's stages. Never accepted
/// back for restoration; use [`PipelineStateDocument`] for that.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub stages: Vec<StageSummaryEntry>,
}
