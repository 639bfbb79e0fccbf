// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Stage Identifier
//!
//! The six fixed stages of the pipeline, in execution order. Unlike the
//! teacher's `StageType`, these are not user-composable — the sequence is
//! hard-coded by the orchestrator (§4.6), so this is a closed enum rather
//! than a configuration record.
//!
//! Board status names use `audio` for the narration stage (a historical
//! holdover from when narration and SFX were a single "audio" stage — see
//! DESIGN.md), so [`StageKind::Audio`] is the narration stage; SFX is
//! tracked separately.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Assets,
    Composites,
    Video,
    /// Narration. Named `Audio` to match the board's `audio_ready` /
    /// `audio_error` status vocabulary.
    Audio,
    Sfx,
    Assembly,
}

impl StageKind {
    pub const ORDER: [StageKind; 6] = [
        StageKind::Assets,
        StageKind::Composites,
        StageKind::Video,
        StageKind::Audio,
        StageKind::Sfx,
        StageKind::Assembly,
    ];

    pub fn next(&self) -> Option<StageKind> {
        let idx = Self::ORDER.iter().position(|s| s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }

    /// Whether this stage halts at a human review gate on success (§4.6).
    /// Composites is the one stage in the pipeline with no gate: it falls
    /// straight through into the next `generating_*` state.
    pub fn has_review_gate(&self) -> bool {
        !matches!(self, StageKind::Composites)
    }

    /// The Concurrency Governor counter this stage consumes (§4.4):
    /// narration and SFX share the `audio` counter.
    pub fn concurrency_class(&self) -> ConcurrencyClass {
        match self {
            StageKind::Assets | StageKind::Composites => ConcurrencyClass::Asset,
            StageKind::Video => ConcurrencyClass::Video,
            StageKind::Audio | StageKind::Sfx => ConcurrencyClass::Audio,
            StageKind::Assembly => ConcurrencyClass::Assembly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Assets => "assets",
            StageKind::Composites => "composites",
            StageKind::Video => "video",
            StageKind::Audio => "audio",
            StageKind::Sfx => "sfx",
            StageKind::Assembly => "assembly",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concurrency class consulted by the Governor (§4.4). `Assembly` has no
/// configured worker-local cap in the distilled spec (only asset/video/
/// audio are named); it is gated solely by whole-task serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcurrencyClass {
    Asset,
    Video,
    Audio,
    Assembly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_fixed_and_six_long() {
        assert_eq!(StageKind::ORDER.len(), 6);
        assert_eq!(StageKind::Assets.next(), Some(StageKind::Composites));
        assert_eq!(StageKind::Assembly.next(), None);
    }

    #[test]
    fn composites_has_no_review_gate() {
        assert!(!StageKind::Composites.has_review_gate());
        for s in StageKind::ORDER {
            if s != StageKind::Composites {
                assert!(s.has_review_gate());
            }
        }
    }

    #[test]
    fn narration_and_sfx_share_the_audio_concurrency_class() {
        assert_eq!(StageKind::Audio.concurrency_class(), ConcurrencyClass::Audio);
        assert_eq!(StageKind::Sfx.concurrency_class(), ConcurrencyClass::Audio);
    }
}
