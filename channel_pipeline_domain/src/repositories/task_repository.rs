// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Repository
//!
//! The Task Store's public contract (§4.1). Every method is a short,
//! self-contained transaction — callers never hold a connection across a
//! Stage Driver invocation or an HTTP call to the board.

use async_trait::async_trait;

use crate::entities::{ResumeLedger, Task};
use crate::value_objects::{BoardPageId, ChannelId, Priority, StageKind, TaskId, TaskStatus};
use crate::PipelineError;

/// User-supplied content for a new Task, as lifted from the board page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInputs {
    pub title: String,
    pub topic: String,
    pub narrative_direction: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(TaskId),
    /// An active Task already exists for this `page_id` (§4.1: idempotent
    /// on page id).
    Skipped,
}

/// The Fair Scheduler's admission filter, evaluated by the caller before
/// `claim_next_task` is invoked, and the claim-eligibility constraints
/// passed down to the query itself (§4.5, §4.4).
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    /// Stage classes currently at their concurrency cap; Tasks whose next
    /// pending stage falls in one of these classes are skipped without
    /// being mutated.
    pub saturated_stage_classes: Vec<StageKind>,
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Idempotent on `page_id` (§4.1). Returns `UpsertOutcome::Skipped`
    /// rather than an error when an active Task for the page already
    /// exists — this is an expected, frequent outcome of polling, not a
    /// failure.
    async fn upsert_task_from_board(
        &self,
        page_id: BoardPageId,
        channel_id: ChannelId,
        content: ContentInputs,
        priority: Priority,
    ) -> Result<UpsertOutcome, PipelineError>;

    /// Atomically claims and locks the next eligible Task honoring the
    /// ordering and fairness rules of §4.5. Returns `None` when no
    /// candidate is admissible right now.
    async fn claim_next_task(&self, filter: &ClaimFilter) -> Result<Option<Task>, PipelineError>;

    async fn find_by_id(&self, task_id: TaskId) -> Result<Option<Task>, PipelineError>;

    async fn find_by_board_page_id(&self, page_id: &BoardPageId) -> Result<Option<Task>, PipelineError>;

    /// Conditional update (§4.1): fails with `InvalidTransition` if
    /// `from_status` no longer matches the stored row, so two writers
    /// racing on the same Task produce exactly one winner and one no-op.
    async fn transition(&self, task_id: TaskId, from_status: TaskStatus, to_status: TaskStatus) -> Result<(), PipelineError>;

    /// Persists the full Task, including the Resume Ledger, in one
    /// transaction. Used by the Orchestrator after a Ledger-mutating step
    /// (§4.3: "the Ledger is rewritten atomically with stage status").
    async fn save(&self, task: &Task) -> Result<(), PipelineError>;

    async fn append_error(&self, task_id: TaskId, text: &str) -> Result<(), PipelineError>;

    async fn record_cost(&self, task_id: TaskId, stage: StageKind, amount_usd: f64, units: u32) -> Result<(), PipelineError>;

    async fn load_resume_ledger(&self, task_id: TaskId) -> Result<ResumeLedger, PipelineError>;

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, PipelineError>;

    async fn list_by_channel(&self, channel_id: &ChannelId) -> Result<Vec<Task>, PipelineError>;
}
