// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Channel identifier value object. Also doubles as the filesystem-safe
//! component of the per-channel workspace path (§6.3), so it is validated
//! against the identifier allowlist at construction time rather than left
//! to the filesystem helper to reject late.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::PipelineError;

/// Identifiers that become filesystem path components must match this
/// pattern — shared by `ChannelId` and task project identifiers.
pub(crate) fn is_safe_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn parse(s: impl Into<String>) -> Result<Self, PipelineError> {
        let s = s.into();
        if !is_safe_identifier(&s) {
            return Err(PipelineError::InvalidIdentifier(format!(
                "channel id '{s}' must match ^[a-zA-Z0-9_-]+$"
            )));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_alphanumeric_dash_underscore() {
        assert!(ChannelId::parse("my-channel_01").is_ok());
    }

    #[test]
    fn rejects_path_traversal_attempts() {
        assert!(ChannelId::parse("../etc").is_err());
        assert!(ChannelId::parse("a/b").is_err());
        assert!(ChannelId::parse("").is_err());
    }
}
