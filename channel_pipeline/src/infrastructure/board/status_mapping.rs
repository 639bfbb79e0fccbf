// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Board Page Translation
//!
//! The wire shape of one board page document (§6.2) and the pure
//! classification of what the inbound sync loop should do with it
//! (§4.7: new page / approval / rejection), kept separate from the HTTP
//! client and the loop that drives it so the decision logic is testable
//! without a mock server.

use channel_pipeline_domain::repositories::ContentInputs;
use channel_pipeline_domain::value_objects::{Priority, StageKind, TaskStatus};
use serde::Deserialize;

/// One page as the board's document-store API represents it. Field names
/// match the properties enumerated in §6.2 (Title, Channel, Topic, Story
/// Direction, Status, Priority).
#[derive(Debug, Clone, Deserialize)]
pub struct BoardPage {
    pub page_id: String,
    pub title: String,
    pub channel_id: String,
    pub topic: String,
    pub story_direction: String,
    pub status: String,
    pub priority: String,
    /// Free-text rejection feedback, present only on pages the reviewer
    /// rejected at a gate (§4.7.1).
    #[serde(default)]
    pub feedback: Option<String>,
}

impl BoardPage {
    pub fn content_inputs(&self) -> ContentInputs {
        ContentInputs {
            title: self.title.clone(),
            topic: self.topic.clone(),
            narrative_direction: self.story_direction.clone(),
        }
    }

    pub fn parsed_status(&self) -> Option<TaskStatus> {
        TaskStatus::parse_board_name(&self.status)
    }

    pub fn parsed_priority(&self) -> Priority {
        Priority::parse(&self.priority).unwrap_or_default()
    }
}

/// What the inbound sync loop should do with one polled page, decided
/// purely from the board's reported status (§4.7 steps 2-4).
#[derive(Debug, Clone, PartialEq)]
pub enum InboundAction {
    /// A fresh page in `queued`: upsert a Task for it.
    UpsertNew,
    /// Human approval at a stage's review gate, or at final review.
    Approval { gate_stage: StageKind },
    /// Human rejection at a stage's review gate, carrying the raw
    /// feedback text to parse into Ledger annotations.
    Rejection { gate_stage: StageKind, feedback: String },
    /// Status the core doesn't act on inbound (e.g. `draft`,
    /// `generating_*`, `uploading` — those are core-driven, not
    /// board-driven).
    Ignore,
}

/// Classifies a polled board status into the action the inbound loop
/// should take. `feedback` is the page's feedback field, consulted only
/// for rejection statuses.
pub fn classify_inbound(status: TaskStatus, feedback: Option<&str>) -> InboundAction {
    match status {
        TaskStatus::Queued => InboundAction::UpsertNew,
        TaskStatus::StageApproved(stage) => InboundAction::Approval { gate_stage: stage },
        TaskStatus::Approved => InboundAction::Approval { gate_stage: StageKind::Assembly },
        TaskStatus::StageError(stage) => InboundAction::Rejection {
            gate_stage: stage,
            feedback: feedback.unwrap_or_default().to_string(),
        },
        _ => InboundAction::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_status_upserts_a_new_task() {
        assert_eq!(classify_inbound(TaskStatus::Queued, None), InboundAction::UpsertNew);
    }

    #[test]
    fn stage_approved_maps_to_approval_at_that_stage() {
        let action = classify_inbound(TaskStatus::StageApproved(StageKind::Video), None);
        assert_eq!(action, InboundAction::Approval { gate_stage: StageKind::Video });
    }

    #[test]
    fn final_review_approval_maps_to_assembly_gate() {
        let action = classify_inbound(TaskStatus::Approved, None);
        assert_eq!(action, InboundAction::Approval { gate_stage: StageKind::Assembly });
    }

    #[test]
    fn stage_error_carries_feedback_text_forward() {
        let action = classify_inbound(TaskStatus::StageError(StageKind::Audio), Some("narration: 1,2"));
        assert_eq!(
            action,
            InboundAction::Rejection {
                gate_stage: StageKind::Audio,
                feedback: "narration: 1,2".to_string(),
            }
        );
    }

    #[test]
    fn core_driven_statuses_are_ignored_inbound() {
        assert_eq!(classify_inbound(TaskStatus::Generating(StageKind::Assets), None), InboundAction::Ignore);
        assert_eq!(classify_inbound(TaskStatus::Uploading, None), InboundAction::Ignore);
    }

    #[test]
    fn board_page_parses_priority_with_default_fallback() {
        let page = BoardPage {
            page_id: "p1".to_string(),
            title: "T".to_string(),
            channel_id: "c1".to_string(),
            topic: "topic".to_string(),
            story_direction: "direction".to_string(),
            status: "queued".to_string(),
            priority: "bogus".to_string(),
            feedback: None,
        };
        assert_eq!(page.parsed_priority(), Priority::Normal);
    }
}
