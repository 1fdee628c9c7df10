//! The pipeline orchestrator: an ordered sequence of stages, dispatched off
//! the caller's thread.
//!
//! Per-stage mutation (`add_stage`, `load_state`, `clear_state`) and the
//! read-only `save_state`/`list_state` projections run synchronously on the
//! caller's thread, as the contract requires. `process` is the only
//! operation that leaves the caller's thread: it hands the stage list to
//! Tokio's blocking pool for the duration of one call and returns a
//! `JoinHandle` the caller awaits. The stages live behind an `Arc<Mutex<_>>`
//! rather than being moved in and out of the struct so that a `process` call
//! in flight and a `&mut self` mutation on the caller's thread contend on the
//! same lock instead of on ownership — the pipeline-level lock this crate
//! picks among the options the concurrency model allows.

use std::sync::Arc;

use chrono::Utc;
use dsp_core::{DspError, DspResult, Sample, StateError};
use dsp_stage::Stage;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::document::{PipelineStateDocument, PipelineSummary, StageStateEntry, StageSummaryEntry};

/// An ordered sequence of stages plus the background execution handle.
pub struct Pipeline {
    stages: Arc<Mutex<Vec<Stage>>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Looks up the factory for `type_id`, parses `config_doc`, constructs
    /// the stage, and appends it. Previously added stages are unaffected by
    /// a failure here.
    pub fn add_stage(&mut self, type_id: &str, config_doc: &serde_json::Value) -> DspResult<()> {
        let stage = Stage::construct(type_id, config_doc)?;
        let mut stages = self.stages.lock();
        debug!("pipeline: adding stage {type_id} at index {}", stages.len());
        stages.push(stage);
        Ok(())
    }

    pub fn stage_count(&self) -> usize {
        self.stages.lock().len()
    }

    /// Spawns the stage loop onto the blocking pool and returns immediately;
    /// the caller awaits the handle to observe the mutated buffer or the
    /// first stage error. Stages run in insertion order within the task.
    pub fn process(&mut self, buffer: Vec<Sample>, num_channels: usize) -> JoinHandle<DspResult<Vec<Sample>>> {
        self.process_with_rate(buffer, num_channels, None)
    }

    /// Like [`Pipeline::process`], but also carries the process options'
    /// optional `sampleRate` to stages that use it (`meanAbsoluteValue`'s
    /// `windowSize: 0` inference path).
    pub fn process_with_rate(
        &mut self,
        buffer: Vec<Sample>,
        num_channels: usize,
        sample_rate: Option<f32>,
    ) -> JoinHandle<DspResult<Vec<Sample>>> {
        let stages = Arc::clone(&self.stages);
        tokio::task::spawn_blocking(move || {
            let mut stages = stages.lock();
            let mut buffer = buffer;
            for stage in stages.iter_mut() {
                trace!(
                    "pipeline: process stage={} channels={} len={}",
                    stage.type_id(),
                    num_channels,
                    buffer.len()
                );
                stage.process_with_rate(&mut buffer, num_channels, sample_rate)?;
            }
            Ok(buffer)
        })
    }

    /// Emits a document with a monotonic timestamp, the stage count, and
    /// each stage's own serialization output.
    pub fn save_state(&self) -> PipelineStateDocument {
        let stages = self.stages.lock();
        let entries = stages
            .iter()
            .enumerate()
            .map(|(index, stage)| StageStateEntry {
                index: index as u32,
                type_id: stage.type_id().to_string(),
                state: stage.serialize(),
            })
            .collect();
        PipelineStateDocument {
            timestamp: Utc::now().timestamp(),
            stage_count: stages.len() as u32,
            stages: entries,
        }
    }

    /// Restores every stage from its corresponding document entry, in
    /// order. Aborts at the first per-stage failure; stages already
    /// restored in this call are left as the failing document described
    /// them, matching the "no partial application" contract at the pipeline
    /// level (individual stages never partially apply their own restore).
    pub fn load_state(&mut self, document: &PipelineStateDocument) -> DspResult<()> {
        let mut stages = self.stages.lock();
        if document.stage_count as usize != stages.len() {
            return Err(DspError::from(StateError::StageCountMismatch {
                expected: stages.len(),
                actual: document.stage_count as usize,
            }));
        }
        for (stage, entry) in stages.iter_mut().zip(document.stages.iter()) {
            if let Err(err) = stage.deserialize(&entry.state) {
                warn!("pipeline: loadState rejected stage {}: {err}", entry.type_id);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Resets every stage's kernels without touching configuration.
    pub fn clear_state(&mut self) {
        let mut stages = self.stages.lock();
        for stage in stages.iter_mut() {
            stage.reset();
        }
    }

    /// A read-only projection for operator inspection; never used for
    /// restoration.
    pub fn list_state(&self) -> PipelineSummary {
        let stages = self.stages.lock();
        let entries = stages
            .iter()
            .enumerate()
            .map(|(index, stage)| StageSummaryEntry { index: index as u32, summary: stage.summary() })
            .collect();
        PipelineSummary { stages: entries }
    }
}
