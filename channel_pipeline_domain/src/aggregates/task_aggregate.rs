// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Aggregate
//!
//! Wraps a [`Task`] and enforces the pipeline state machine (§4.6): every
//! status change a caller wants to make goes through one of the methods
//! here, never through `task.status = ...` directly, so an invalid
//! transition is a compile-reachable-but-runtime-rejected `InvalidTransition`
//! rather than a silently corrupted row.
//!
//! Composites has no review gate and no dedicated error state in the
//! board's vocabulary; a permanent failure during compositing is recorded
//! as `asset_error`, since compositing consumes and extends the asset
//! stage's output (see DESIGN.md).

use chrono::{DateTime, Utc};

use crate::entities::{FailedAudioClipNumbers, Task};
use crate::events::TaskEvent;
use crate::value_objects::{StageKind, TaskStatus};
use crate::PipelineError;

pub struct TaskAggregate {
    task: Task,
    uncommitted_events: Vec<TaskEvent>,
}

impl TaskAggregate {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            uncommitted_events: Vec::new(),
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn into_task(self) -> Task {
        self.task
    }

    pub fn take_events(&mut self) -> Vec<TaskEvent> {
        std::mem::take(&mut self.uncommitted_events)
    }

    fn transition_to(&mut self, to: TaskStatus, now: DateTime<Utc>) -> Result<(), PipelineError> {
        validate_transition(self.task.status, to)?;
        self.task.status = to;
        self.task.updated_at = now;
        Ok(())
    }

    /// Enqueues a freshly-upserted Task (§4.1, `upsert_task_from_board`).
    pub fn enqueue(&mut self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        self.transition_to(TaskStatus::Queued, now)
    }

    /// A worker has claimed this Task via the Fair Scheduler.
    pub fn claim(&mut self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        self.transition_to(TaskStatus::Claimed, now)
    }

    /// Step 1 of the stage execution algorithm (§4.6): open a short
    /// transaction, set `generating_S`, stamp `pipeline_start_time` once.
    pub fn begin_stage(&mut self, stage: StageKind, now: DateTime<Utc>) -> Result<(), PipelineError> {
        self.transition_to(TaskStatus::Generating(stage), now)?;
        if self.task.pipeline_start_time.is_none() {
            self.task.pipeline_start_time = Some(now);
        }
        self.uncommitted_events.push(TaskEvent::StageStarted {
            task_id: self.task.id,
            stage,
            at: now,
        });
        Ok(())
    }

    /// Marks one sub-item done in the Ledger (§4.6 step 3). Called once
    /// per sub-item, never batched — the Ledger must reflect partial
    /// progress even if the worker is interrupted mid-stage.
    pub fn record_index_progress(&mut self, stage: StageKind, index: u32) {
        self.task.ledger.entry_mut(stage).progress.completed_indices.insert(index);
    }

    pub fn record_clip_progress(&mut self, stage: StageKind, clip_number: u32) {
        self.task
            .ledger
            .entry_mut(stage)
            .progress
            .completed_clip_numbers
            .insert(clip_number);
    }

    /// Step 5: stage finished, every output verified. Advances to the
    /// stage's review gate, or straight into the next `generating_*` state
    /// if the stage has no gate (composites only).
    pub fn complete_stage(&mut self, stage: StageKind, duration_secs: f64, now: DateTime<Utc>) -> Result<(), PipelineError> {
        if self.task.status != TaskStatus::Generating(stage) {
            return Err(PipelineError::invalid_transition(format!(
                "cannot complete stage {stage} from status {}",
                self.task.status
            )));
        }
        let entry = self.task.ledger.entry_mut(stage);
        entry.completed = true;
        entry.duration_secs = Some(duration_secs);
        self.task.attempt_count = 0;

        self.uncommitted_events.push(TaskEvent::StageCompleted {
            task_id: self.task.id,
            stage,
            duration_secs,
            at: now,
        });

        if stage.has_review_gate() {
            let gate_status = review_gate_status(stage);
            self.transition_to(gate_status, now)?;
            self.task.review_started_at = Some(now);
            self.uncommitted_events.push(TaskEvent::ReviewGateEntered {
                task_id: self.task.id,
                status: gate_status,
                at: now,
            });
            Ok(())
        } else {
            match stage.next() {
                Some(next_stage) => self.transition_to(TaskStatus::Generating(next_stage), now),
                None => Err(PipelineError::internal_error("gateless stage has no successor")),
            }
        }
    }

    /// Human (or Synchronizer-relayed) approval at a review gate.
    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        let stage = stage_for_gate(self.task.status)
            .ok_or_else(|| PipelineError::invalid_transition("approve called outside a review gate"))?;
        self.task.review_completed_at = Some(now);

        let approved_status = if stage == StageKind::Assembly {
            TaskStatus::Approved
        } else {
            TaskStatus::StageApproved(stage)
        };
        self.transition_to(approved_status, now)?;
        self.uncommitted_events.push(TaskEvent::Approved {
            task_id: self.task.id,
            status: approved_status,
            at: now,
        });

        if stage == StageKind::Assembly {
            return Ok(());
        }
        match stage.next() {
            Some(next_stage) => self.transition_to(TaskStatus::Generating(next_stage), now),
            None => Ok(()),
        }
    }

    /// Human rejection at a review gate, carrying parsed partial-failure
    /// annotations into the Ledger (§4.3, §4.7.1).
    pub fn reject(
        &mut self,
        annotations: FailedAudioClipNumbers,
        raw_feedback: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let stage = stage_for_gate(self.task.status)
            .ok_or_else(|| PipelineError::invalid_transition("reject called outside a review gate"))?;
        self.task.review_completed_at = Some(now);
        self.task.ledger.failed_audio_clip_numbers = annotations;
        self.task.append_error(&format!("rejected: {raw_feedback}"), now);

        let error_status = error_status_for_stage(stage);
        self.transition_to(error_status, now)?;
        self.uncommitted_events.push(TaskEvent::Rejected {
            task_id: self.task.id,
            status: error_status,
            feedback: raw_feedback.to_string(),
            at: now,
        });
        Ok(())
    }

    /// Transient Stage Driver failure (§4.6 step 6): leaves the Ledger
    /// untouched, parks the Task in `Retry` behind a backoff deadline.
    pub fn fail_transient(&mut self, stage: StageKind, reason: &str, retry_after: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), PipelineError> {
        if self.task.status != TaskStatus::Generating(stage) {
            return Err(PipelineError::invalid_transition(format!(
                "cannot record transient failure for {stage} from status {}",
                self.task.status
            )));
        }
        self.task.attempt_count += 1;
        self.task.append_error(&format!("transient failure at {stage}: {reason}"), now);
        self.task.retry_after = Some(retry_after);
        self.transition_to(TaskStatus::Retry, now)?;
        self.uncommitted_events.push(TaskEvent::TransientFailure {
            task_id: self.task.id,
            stage,
            attempt: self.task.attempt_count,
            retry_after,
        });
        Ok(())
    }

    /// Permanent Stage Driver failure: straight to the stage's error
    /// state, no automatic retry.
    pub fn fail_permanent(&mut self, stage: StageKind, reason: &str, now: DateTime<Utc>) -> Result<(), PipelineError> {
        if self.task.status != TaskStatus::Generating(stage) {
            return Err(PipelineError::invalid_transition(format!(
                "cannot record permanent failure for {stage} from status {}",
                self.task.status
            )));
        }
        self.task.append_error(&format!("permanent failure at {stage}: {reason}"), now);
        let error_status = error_status_for_stage(stage);
        self.transition_to(error_status, now)?;
        self.uncommitted_events.push(TaskEvent::PermanentFailure {
            task_id: self.task.id,
            stage,
            reason: reason.to_string(),
            at: now,
        });
        Ok(())
    }

    /// Rejection feedback that failed to parse against the documented
    /// grammar (§9 open question): the raw text goes into the error log
    /// and the Task still falls to the gate's error state, but the Ledger
    /// is left untouched since there are no annotations to apply.
    pub fn reject_unparsable(&mut self, raw_feedback: &str, now: DateTime<Utc>) -> Result<(), PipelineError> {
        let stage = stage_for_gate(self.task.status)
            .ok_or_else(|| PipelineError::invalid_transition("reject_unparsable called outside a review gate"))?;
        self.task.review_completed_at = Some(now);
        self.task.append_error(&format!("unparsable rejection feedback: {raw_feedback}"), now);

        let error_status = error_status_for_stage(stage);
        self.transition_to(error_status, now)?;
        self.uncommitted_events.push(TaskEvent::PermanentFailure {
            task_id: self.task.id,
            stage,
            reason: format!("unparsable rejection feedback: {raw_feedback}"),
            at: now,
        });
        Ok(())
    }

    /// Manual retry from an error state: re-queues the Task. The Ledger is
    /// left exactly as-is so [`Task::ledger`]'s `next_incomplete_stage`
    /// resumes at the right place once reclaimed.
    pub fn retry_from_error(&mut self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        if !self.task.status.is_terminal_error() {
            return Err(PipelineError::invalid_transition(format!(
                "retry_from_error called from non-error status {}",
                self.task.status
            )));
        }
        self.task.attempt_count = 0;
        self.task.retry_after = None;
        self.transition_to(TaskStatus::Queued, now)
    }

    /// Publish handoff after all review gates clear.
    pub fn begin_upload(&mut self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        self.transition_to(TaskStatus::Uploading, now)
    }

    pub fn publish(&mut self, output_path: impl Into<String>, duration_secs: f64, now: DateTime<Utc>) -> Result<(), PipelineError> {
        let output_path = output_path.into();
        self.transition_to(TaskStatus::Published, now)?;
        self.task.pipeline_end_time = Some(now);
        self.task.final_output_path = Some(output_path.clone());
        self.task.final_output_duration_secs = Some(duration_secs);
        self.uncommitted_events.push(TaskEvent::Published {
            task_id: self.task.id,
            output_path,
            at: now,
        });
        Ok(())
    }

    pub fn fail_upload(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), PipelineError> {
        self.task.append_error(&format!("upload failed: {reason}"), now);
        self.transition_to(TaskStatus::UploadError, now)
    }
}

fn review_gate_status(stage: StageKind) -> TaskStatus {
    if stage == StageKind::Assembly {
        TaskStatus::FinalReview
    } else {
        TaskStatus::Ready(stage)
    }
}

fn stage_for_gate(status: TaskStatus) -> Option<StageKind> {
    match status {
        TaskStatus::Ready(stage) => Some(stage),
        TaskStatus::FinalReview => Some(StageKind::Assembly),
        _ => None,
    }
}

/// Composites has no board-facing error state of its own; its failures
/// are folded into `asset_error` (see module docs and DESIGN.md).
fn error_status_for_stage(stage: StageKind) -> TaskStatus {
    match stage {
        StageKind::Composites => TaskStatus::StageError(StageKind::Assets),
        other => TaskStatus::StageError(other),
    }
}

/// The full transition-validity check (§4.6: "Any other transition is
/// rejected with `InvalidTransition`"). The aggregate's methods above are
/// the only callers; this function is the single place the state machine
/// is written down.
fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), PipelineError> {
    use StageKind::*;
    use TaskStatus::*;

    let valid = match (from, to) {
        (Draft, Queued) => true,
        (Queued, Claimed) => true,
        (Retry, Claimed) => true,
        (Retry, Queued) => true,

        (Claimed, Generating(Assets)) => true,
        (Claimed, Generating(other)) => other != Assets && is_resume_target(other),

        (Generating(s), Ready(s2)) if s == s2 && s.has_review_gate() && s != Assembly => true,
        (Generating(Assembly), FinalReview) => true,
        (Generating(Composites), Generating(Video)) => true,

        (Ready(s), StageApproved(s2)) if s == s2 => true,
        (FinalReview, Approved) => true,

        (StageApproved(s), Generating(next)) => s.next() == Some(next),
        (Approved, Uploading) => true,

        (Uploading, Published) => true,
        (Uploading, UploadError) => true,
        (UploadError, Queued) => true,

        (Generating(_), Retry) => true,
        (Generating(s2), StageError(s))
            if s2 == s || (s2 == Composites && s == Assets) => true,
        (Ready(s2), StageError(s)) if s == s2 => true,
        (FinalReview, StageError(Assembly)) => true,

        (StageError(_), Queued) => true,
        (StageError(s), Generating(s2)) if s == s2 => true,

        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(PipelineError::invalid_transition(format!("{from} -> {to}")))
    }
}

fn is_resume_target(stage: StageKind) -> bool {
    StageKind::ORDER.contains(&stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Task;
    use crate::value_objects::{BoardPageId, ChannelId, Priority, TaskId};

    fn new_aggregate() -> TaskAggregate {
        let task = Task::new_from_board(
            TaskId::new(),
            ChannelId::parse("c1").unwrap(),
            BoardPageId::new("page-1"),
            "Title",
            "Topic",
            "Direction",
            Priority::Normal,
            Utc::now(),
        );
        TaskAggregate::new(task)
    }

    #[test]
    fn happy_path_through_assets_review_gate() {
        let mut agg = new_aggregate();
        let now = Utc::now();
        agg.claim(now).unwrap();
        agg.begin_stage(StageKind::Assets, now).unwrap();
        agg.record_index_progress(StageKind::Assets, 0);
        agg.complete_stage(StageKind::Assets, 12.0, now).unwrap();
        assert_eq!(agg.task().status, TaskStatus::Ready(StageKind::Assets));
        assert!(agg.task().review_started_at.is_some());

        agg.approve(now).unwrap();
        assert_eq!(agg.task().status, TaskStatus::Generating(StageKind::Composites));
    }

    #[test]
    fn composites_has_no_gate_and_falls_through_to_video() {
        let mut agg = new_aggregate();
        let now = Utc::now();
        agg.claim(now).unwrap();
        agg.begin_stage(StageKind::Assets, now).unwrap();
        agg.complete_stage(StageKind::Assets, 1.0, now).unwrap();
        agg.approve(now).unwrap();
        assert_eq!(agg.task().status, TaskStatus::Generating(StageKind::Composites));

        agg.begin_stage(StageKind::Composites, now).unwrap();
        agg.complete_stage(StageKind::Composites, 1.0, now).unwrap();
        assert_eq!(agg.task().status, TaskStatus::Generating(StageKind::Video));
    }

    #[test]
    fn composites_permanent_failure_routes_to_asset_error() {
        let mut agg = new_aggregate();
        let now = Utc::now();
        agg.claim(now).unwrap();
        agg.begin_stage(StageKind::Assets, now).unwrap();
        agg.complete_stage(StageKind::Assets, 1.0, now).unwrap();
        agg.approve(now).unwrap();
        agg.begin_stage(StageKind::Composites, now).unwrap();

        agg.fail_permanent(StageKind::Composites, "missing manifest", now).unwrap();
        assert_eq!(agg.task().status, TaskStatus::StageError(StageKind::Assets));
    }

    #[test]
    fn rejection_at_assembly_uses_final_review_and_assembly_error() {
        let mut agg = new_aggregate();
        let now = Utc::now();
        agg.claim(now).unwrap();
        // Fast-forward straight into final review for this test.
        agg.task.status = TaskStatus::Generating(StageKind::Assembly);
        agg.complete_stage(StageKind::Assembly, 5.0, now).unwrap();
        assert_eq!(agg.task().status, TaskStatus::FinalReview);

        let annotations = FailedAudioClipNumbers {
            narration: vec![5, 12],
            sfx: vec![],
        };
        agg.reject(annotations, "Bad narration: 5,12", now).unwrap();
        assert_eq!(agg.task().status, TaskStatus::StageError(StageKind::Assembly));
        assert_eq!(agg.task().ledger.failed_audio_clip_numbers.narration, vec![5, 12]);
    }

    #[test]
    fn transient_failure_parks_in_retry_without_touching_ledger() {
        let mut agg = new_aggregate();
        let now = Utc::now();
        agg.claim(now).unwrap();
        agg.begin_stage(StageKind::Video, now).unwrap();
        agg.record_index_progress(StageKind::Video, 3);

        agg.fail_transient(StageKind::Video, "503 from generator", now + chrono::Duration::seconds(30), now)
            .unwrap();
        assert_eq!(agg.task().status, TaskStatus::Retry);
        assert_eq!(agg.task().attempt_count, 1);
        assert!(agg.task().ledger.video.progress.completed_indices.contains(&3));
        assert!(!agg.task().ledger.video.completed);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut agg = new_aggregate();
        let now = Utc::now();
        assert!(agg.begin_stage(StageKind::Video, now).is_err());
    }

    #[test]
    fn manual_retry_from_error_requeues_without_resetting_ledger() {
        let mut agg = new_aggregate();
        let now = Utc::now();
        agg.claim(now).unwrap();
        agg.begin_stage(StageKind::Assets, now).unwrap();
        agg.record_index_progress(StageKind::Assets, 0);
        agg.fail_permanent(StageKind::Assets, "bad input", now).unwrap();
        assert_eq!(agg.task().status, TaskStatus::StageError(StageKind::Assets));

        agg.retry_from_error(now).unwrap();
        assert_eq!(agg.task().status, TaskStatus::Queued);
        assert!(agg.task().ledger.assets.progress.completed_indices.contains(&0));
    }
}
