// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Rejection feedback parser
//!
//! The board's review-gate rejection is free text, e.g. `"Bad narration:
//! 5,12; Bad SFX: 7,9,15"`. §4.7.1 leaves the exact grammar as an open
//! question for implementations to document, so here is ours:
//!
//! - Clauses are separated by `;`.
//! - Each clause matches `label: n, n, n`, where `label` is letters and
//!   spaces and `n` is a non-negative integer.
//! - The label is matched by case-insensitive substring, not exact value,
//!   against four categories: `narration`, `sfx`, `asset`, and
//!   `video`/`clip` (either word selects the video category). Order of
//!   checks is narration, sfx, asset, video/clip — "narration" is checked
//!   first so a label like "Bad narration assets" (unlikely, but
//!   unambiguous either way) resolves predictably.
//! - A clause whose label matches none of the four categories, or whose
//!   number list fails to parse, makes the *whole* feedback unparsable —
//!   callers must not apply a partial result (§4.7.1: "unparsable
//!   feedback MUST result in ... no Ledger mutation").

use once_cell::sync::Lazy;
use regex::Regex;

use crate::entities::FailedAudioClipNumbers;

static CLAUSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([A-Za-z ]+?)\s*:\s*([0-9]+(?:\s*,\s*[0-9]+)*)\s*$").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRejectionFeedback {
    pub narration: Vec<u32>,
    pub sfx: Vec<u32>,
    pub assets: Vec<u32>,
    pub video_clips: Vec<u32>,
}

impl ParsedRejectionFeedback {
    pub fn into_failed_audio_clip_numbers(self) -> FailedAudioClipNumbers {
        FailedAudioClipNumbers {
            narration: self.narration,
            sfx: self.sfx,
        }
    }
}

/// Parses free-text rejection feedback into per-category index lists.
/// Returns `None` for anything that doesn't fully match the documented
/// grammar — the caller must treat that as "unparsable": log the raw
/// text, leave the Ledger untouched.
pub fn parse_rejection_feedback(raw: &str) -> Option<ParsedRejectionFeedback> {
    if raw.trim().is_empty() {
        return None;
    }

    let mut parsed = ParsedRejectionFeedback::default();
    for clause in raw.split(';') {
        if clause.trim().is_empty() {
            continue;
        }
        let captures = CLAUSE_RE.captures(clause)?;
        let label = captures.get(1)?.as_str().to_ascii_lowercase();
        let numbers: Vec<u32> = captures
            .get(2)?
            .as_str()
            .split(',')
            .map(|n| n.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .ok()?;

        if label.contains("narration") {
            parsed.narration.extend(numbers);
        } else if label.contains("sfx") {
            parsed.sfx.extend(numbers);
        } else if label.contains("asset") {
            parsed.assets.extend(numbers);
        } else if label.contains("video") || label.contains("clip") {
            parsed.video_clips.extend(numbers);
        } else {
            return None;
        }
    }

    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_example() {
        let parsed = parse_rejection_feedback("Bad narration: 5,12; Bad SFX: 7,9,15").unwrap();
        assert_eq!(parsed.narration, vec![5, 12]);
        assert_eq!(parsed.sfx, vec![7, 9, 15]);
    }

    #[test]
    fn tolerates_irregular_whitespace() {
        let parsed = parse_rejection_feedback("  narration :1, 2 ,3 ").unwrap();
        assert_eq!(parsed.narration, vec![1, 2, 3]);
    }

    #[test]
    fn matches_label_by_substring_case_insensitively() {
        let parsed = parse_rejection_feedback("Video clip issues: 4").unwrap();
        assert_eq!(parsed.video_clips, vec![4]);
    }

    #[test]
    fn rejects_unknown_label() {
        assert!(parse_rejection_feedback("Bad lighting: 1,2").is_none());
    }

    #[test]
    fn rejects_malformed_number_list() {
        assert!(parse_rejection_feedback("Bad narration: 5, abc").is_none());
    }

    #[test]
    fn rejects_entirely_freeform_text() {
        assert!(parse_rejection_feedback("please redo the whole thing").is_none());
    }

    #[test]
    fn a_single_bad_clause_invalidates_the_whole_feedback() {
        assert!(parse_rejection_feedback("narration: 1,2; nonsense here").is_none());
    }
}
