// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task and the embedded Resume Ledger
//!
//! A `Task` is one channel's journey through the six-stage pipeline. The
//! Resume Ledger lives inside it (§4.1, §4.3): for each stage, whether it
//! is complete, how long it took, and a stage-shaped record of which
//! sub-items are already done. A sub-item only counts as done once its
//! expected output file has been verified on storage — the Ledger itself
//! never asserts that, it just records what the Stage Driver reported.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ChannelId, Priority, StageKind, TaskId, TaskStatus};

/// Stage-shaped partial-progress record (§4.1: "Known partial-progress
/// shapes"). Which variant is valid for a given stage is fixed by
/// [`StagePartialProgress::for_stage`]; the Orchestrator never mixes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePartialProgress {
    /// Indices (into the generator's manifest) completed so far. Used by
    /// Assets, Composites, and Video — the shapes differ only in what the
    /// index numbers mean.
    pub completed_indices: BTreeSet<u32>,
    /// Clip numbers completed so far. Used by Audio (narration) and Sfx.
    pub completed_clip_numbers: BTreeSet<u32>,
}

impl StagePartialProgress {
    pub fn is_empty(&self) -> bool {
        self.completed_indices.is_empty() && self.completed_clip_numbers.is_empty()
    }
}

/// One stage's entry in the Resume Ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageLedgerEntry {
    pub completed: bool,
    pub duration_secs: Option<f64>,
    pub progress: StagePartialProgress,
}

/// Which narration/SFX clip numbers a human rejection flagged as bad.
/// Written by the Board Synchronizer when it parses rejection feedback
/// (§4.7.1) and consumed by the next stage execution to regenerate only
/// the annotated sub-items, preserving everything else (§4.3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAudioClipNumbers {
    pub narration: Vec<u32>,
    pub sfx: Vec<u32>,
}

/// Per-task, per-stage record of what sub-items are complete. Rewritten
/// atomically with stage status (§4.3): callers never observe a
/// half-updated ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeLedger {
    pub assets: StageLedgerEntry,
    pub composites: StageLedgerEntry,
    pub video: StageLedgerEntry,
    pub audio: StageLedgerEntry,
    pub sfx: StageLedgerEntry,
    pub assembly: StageLedgerEntry,
    pub failed_audio_clip_numbers: FailedAudioClipNumbers,
}

impl ResumeLedger {
    pub fn entry(&self, stage: StageKind) -> &StageLedgerEntry {
        match stage {
            StageKind::Assets => &self.assets,
            StageKind::Composites => &self.composites,
            StageKind::Video => &self.video,
            StageKind::Audio => &self.audio,
            StageKind::Sfx => &self.sfx,
            StageKind::Assembly => &self.assembly,
        }
    }

    pub fn entry_mut(&mut self, stage: StageKind) -> &mut StageLedgerEntry {
        match stage {
            StageKind::Assets => &mut self.assets,
            StageKind::Composites => &mut self.composites,
            StageKind::Video => &mut self.video,
            StageKind::Audio => &mut self.audio,
            StageKind::Sfx => &mut self.sfx,
            StageKind::Assembly => &mut self.assembly,
        }
    }

    /// A stage with zero outstanding sub-items skips execution and
    /// transitions immediately (§4.6, edge case). Assembly has no
    /// sub-items at all, so it is never "already done" by this check —
    /// its driver always runs once.
    pub fn is_fully_done(&self, stage: StageKind, expected_sub_item_count: usize) -> bool {
        if stage == StageKind::Assembly {
            return false;
        }
        let entry = self.entry(stage);
        entry.completed
            && (entry.progress.completed_indices.len() + entry.progress.completed_clip_numbers.len()) >= expected_sub_item_count
    }

    /// The stage a re-claimed Task should resume at: the first stage in
    /// pipeline order not yet marked `completed` in the Ledger. Because
    /// every finished sub-item is recorded as it happens, this is enough
    /// to resume a crashed or manually-retried Task without replaying a
    /// stage history anywhere else (§4.8).
    pub fn next_incomplete_stage(&self) -> Option<StageKind> {
        StageKind::ORDER.into_iter().find(|s| !self.entry(*s).completed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub channel_id: ChannelId,
    pub board_page_id: crate::value_objects::BoardPageId,
    pub title: String,
    pub topic: String,
    pub narrative_direction: String,
    pub priority: Priority,
    pub status: TaskStatus,
    /// Append-only; each entry is timestamped and prefixed by the caller.
    pub error_log: String,
    pub final_output_path: Option<String>,
    pub final_output_duration_secs: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pipeline_start_time: Option<DateTime<Utc>>,
    pub pipeline_end_time: Option<DateTime<Utc>>,
    pub review_started_at: Option<DateTime<Utc>>,
    pub review_completed_at: Option<DateTime<Utc>>,
    pub pipeline_cost_usd: f64,
    pub ledger: ResumeLedger,
    /// Backoff deadline set when a transient failure parks the task in
    /// `Retry`; the Fair Scheduler excludes it from the candidate set
    /// until this passes.
    pub retry_after: Option<DateTime<Utc>>,
    /// Attempts made at the current stage since the last success or
    /// permanent failure; reset on stage advance.
    pub attempt_count: u32,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub fn new_from_board(
        id: TaskId,
        channel_id: ChannelId,
        board_page_id: crate::value_objects::BoardPageId,
        title: impl Into<String>,
        topic: impl Into<String>,
        narrative_direction: impl Into<String>,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            channel_id,
            board_page_id,
            title: title.into(),
            topic: topic.into(),
            narrative_direction: narrative_direction.into(),
            priority,
            status: TaskStatus::Queued,
            error_log: String::new(),
            final_output_path: None,
            final_output_duration_secs: None,
            created_at: now,
            updated_at: now,
            pipeline_start_time: None,
            pipeline_end_time: None,
            review_started_at: None,
            review_completed_at: None,
            pipeline_cost_usd: 0.0,
            ledger: ResumeLedger::default(),
            retry_after: None,
            attempt_count: 0,
        }
    }

    pub fn append_error(&mut self, message: &str, at: DateTime<Utc>) {
        if !self.error_log.is_empty() {
            self.error_log.push('\n');
        }
        self.error_log.push_str(&format!("[{}] {}", at.to_rfc3339(), message));
    }

    pub fn record_cost(&mut self, amount_usd: f64) {
        self.pipeline_cost_usd += amount_usd;
    }

    pub fn pipeline_duration_secs(&self) -> Option<f64> {
        match (self.pipeline_start_time, self.pipeline_end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::BoardPageId;

    fn sample_task() -> Task {
        Task::new_from_board(
            TaskId::new(),
            ChannelId::parse("c1").unwrap(),
            BoardPageId::new("page-1"),
            "Title",
            "Topic",
            "Direction",
            Priority::Normal,
            Utc::now(),
        )
    }

    #[test]
    fn appends_multiple_error_lines_in_order() {
        let mut task = sample_task();
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(1);
        task.append_error("first failure", t1);
        task.append_error("second failure", t2);
        assert!(task.error_log.contains("first failure"));
        assert!(task.error_log.contains("second failure"));
        assert!(task.error_log.find("first failure").unwrap() < task.error_log.find("second failure").unwrap());
    }

    #[test]
    fn cost_accumulates_across_multiple_entries() {
        let mut task = sample_task();
        task.record_cost(0.50);
        task.record_cost(1.25);
        assert!((task.pipeline_cost_usd - 1.75).abs() < f64::EPSILON);
    }

    #[test]
    fn assembly_never_reports_fully_done() {
        let mut task = sample_task();
        task.ledger.assembly.completed = true;
        assert!(!task.ledger.is_fully_done(StageKind::Assembly, 0));
    }

    #[test]
    fn stage_with_zero_expected_sub_items_is_fully_done_when_marked_complete() {
        let mut task = sample_task();
        task.ledger.assets.completed = true;
        assert!(task.ledger.is_fully_done(StageKind::Assets, 0));
    }
}
