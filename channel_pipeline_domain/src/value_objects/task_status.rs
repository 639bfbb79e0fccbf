// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Status — the board-facing vocabulary
//!
//! §6.2's count of 26 named values undercounts `assembly_error` by one —
//! §4.6 step 8 lists it explicitly alongside the other five stage error
//! states, so it is kept as a real, distinct board value here; the true
//! count is 27 board-facing names. See DESIGN.md for the full enumeration
//! and the reconciliation note. `Retry` is a 28th, core-only sentinel: it
//! never reaches the board (outbound sync maps it to the same display name
//! as `Queued`), it only exists so the Fair Scheduler's candidate set
//! (`status ∈ {queued, retry}`, §4.5) can tell a fresh task apart from one
//! backing off after a transient failure.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::StageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Draft,
    Queued,
    /// Waiting out a transient-failure backoff window before becoming
    /// claimable again. Candidate set member alongside `Queued` (§4.5).
    Retry,
    Claimed,
    Generating(StageKind),
    /// The post-gate state for a gated stage. Never constructed for
    /// `Composites`, which has no gate.
    Ready(StageKind),
    /// Human-approved at a review gate. For `Assembly` this is represented
    /// by the dedicated [`TaskStatus::Approved`] variant instead, since the
    /// board names that state `approved`, not `assembly_approved`.
    StageApproved(StageKind),
    /// Permanent failure (or human rejection) at a stage. Never
    /// constructed for `Composites` — see DESIGN.md for how composite
    /// failures are classified.
    StageError(StageKind),
    /// Assembly's review gate. Named `final_review` rather than
    /// `assembly_ready` by the board.
    FinalReview,
    /// All review gates cleared; ready for publish handoff.
    Approved,
    Uploading,
    Published,
    UploadError,
}

impl TaskStatus {
    /// The exact board status string for every board-facing variant.
    /// `Retry` has no board name of its own (see module docs) and returns
    /// the same string as `Queued`.
    pub fn board_name(&self) -> String {
        match self {
            TaskStatus::Draft => "draft".to_string(),
            TaskStatus::Queued | TaskStatus::Retry => "queued".to_string(),
            TaskStatus::Claimed => "claimed".to_string(),
            TaskStatus::Generating(s) => format!("generating_{s}"),
            TaskStatus::Ready(s) => format!("{s}_ready"),
            TaskStatus::StageApproved(s) => format!("{s}_approved"),
            // The board names the Assets error state "asset_error"
            // (singular), unlike every other stage's "{stage}_error".
            TaskStatus::StageError(StageKind::Assets) => "asset_error".to_string(),
            TaskStatus::StageError(s) => format!("{s}_error"),
            TaskStatus::FinalReview => "final_review".to_string(),
            TaskStatus::Approved => "approved".to_string(),
            TaskStatus::Uploading => "uploading".to_string(),
            TaskStatus::Published => "published".to_string(),
            TaskStatus::UploadError => "upload_error".to_string(),
        }
    }

    pub fn parse_board_name(name: &str) -> Option<Self> {
        use StageKind::*;
        Some(match name {
            "draft" => TaskStatus::Draft,
            "queued" => TaskStatus::Queued,
            "claimed" => TaskStatus::Claimed,
            "generating_assets" => TaskStatus::Generating(Assets),
            "generating_composites" => TaskStatus::Generating(Composites),
            "generating_video" => TaskStatus::Generating(Video),
            "generating_audio" => TaskStatus::Generating(Audio),
            "generating_sfx" => TaskStatus::Generating(Sfx),
            "generating_assembly" => TaskStatus::Generating(Assembly),
            "assets_ready" => TaskStatus::Ready(Assets),
            "video_ready" => TaskStatus::Ready(Video),
            "audio_ready" => TaskStatus::Ready(Audio),
            "sfx_ready" => TaskStatus::Ready(Sfx),
            "assets_approved" => TaskStatus::StageApproved(Assets),
            "video_approved" => TaskStatus::StageApproved(Video),
            "audio_approved" => TaskStatus::StageApproved(Audio),
            "sfx_approved" => TaskStatus::StageApproved(Sfx),
            "asset_error" => TaskStatus::StageError(Assets),
            "video_error" => TaskStatus::StageError(Video),
            "audio_error" => TaskStatus::StageError(Audio),
            "sfx_error" => TaskStatus::StageError(Sfx),
            "assembly_error" => TaskStatus::StageError(Assembly),
            "final_review" => TaskStatus::FinalReview,
            "approved" => TaskStatus::Approved,
            "uploading" => TaskStatus::Uploading,
            "published" => TaskStatus::Published,
            "upload_error" => TaskStatus::UploadError,
            _ => return None,
        })
    }

    /// The hard-coded set of review-gate statuses (§4.6): reaching one of
    /// these halts the Orchestrator until a human flips the board.
    pub fn is_review_gate(&self) -> bool {
        matches!(
            self,
            TaskStatus::Ready(StageKind::Assets)
                | TaskStatus::Ready(StageKind::Video)
                | TaskStatus::Ready(StageKind::Audio)
                | TaskStatus::Ready(StageKind::Sfx)
                | TaskStatus::FinalReview
        )
    }

    /// True for the statuses the Fair Scheduler's claim query considers
    /// (§4.5: `status ∈ {queued, retry}`).
    pub fn is_claimable(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Retry)
    }

    pub fn is_terminal_error(&self) -> bool {
        matches!(self, TaskStatus::StageError(_) | TaskStatus::UploadError)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.board_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_vocabulary_has_twenty_seven_distinct_names() {
        use StageKind::*;
        let statuses = [
            TaskStatus::Draft,
            TaskStatus::Queued,
            TaskStatus::Claimed,
            TaskStatus::Generating(Assets),
            TaskStatus::Ready(Assets),
            TaskStatus::StageApproved(Assets),
            TaskStatus::StageError(Assets),
            TaskStatus::Generating(Composites),
            TaskStatus::Generating(Video),
            TaskStatus::Ready(Video),
            TaskStatus::StageApproved(Video),
            TaskStatus::StageError(Video),
            TaskStatus::Generating(Audio),
            TaskStatus::Ready(Audio),
            TaskStatus::StageApproved(Audio),
            TaskStatus::StageError(Audio),
            TaskStatus::Generating(Sfx),
            TaskStatus::Ready(Sfx),
            TaskStatus::StageApproved(Sfx),
            TaskStatus::StageError(Sfx),
            TaskStatus::Generating(Assembly),
            TaskStatus::StageError(Assembly),
            TaskStatus::FinalReview,
            TaskStatus::Approved,
            TaskStatus::Uploading,
            TaskStatus::Published,
            TaskStatus::UploadError,
        ];
        assert_eq!(statuses.len(), 27);
        let names: std::collections::HashSet<_> = statuses.iter().map(|s| s.board_name()).collect();
        assert_eq!(names.len(), 27, "board status names must be unique");
    }

    #[test]
    fn retry_is_claimable_but_not_a_distinct_board_name() {
        assert!(TaskStatus::Retry.is_claimable());
        assert_eq!(TaskStatus::Retry.board_name(), TaskStatus::Queued.board_name());
    }

    #[test]
    fn parse_board_name_round_trips_every_named_status() {
        for name in [
            "draft",
            "queued",
            "claimed",
            "generating_assets",
            "assets_ready",
            "assets_approved",
            "asset_error",
            "assembly_error",
            "generating_composites",
            "generating_video",
            "video_ready",
            "final_review",
            "approved",
            "uploading",
            "published",
            "upload_error",
        ] {
            let status = TaskStatus::parse_board_name(name).expect("known status name");
            assert_eq!(status.board_name(), name);
        }
    }

    #[test]
    fn review_gates_match_the_hard_coded_set() {
        assert!(TaskStatus::Ready(StageKind::Assets).is_review_gate());
        assert!(TaskStatus::Ready(StageKind::Video).is_review_gate());
        assert!(TaskStatus::Ready(StageKind::Audio).is_review_gate());
        assert!(TaskStatus::Ready(StageKind::Sfx).is_review_gate());
        assert!(TaskStatus::FinalReview.is_review_gate());
        assert!(!TaskStatus::Generating(StageKind::Assets).is_review_gate());
    }
}
