// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Per-stage Stage Driver timeouts (§4.2). Defaults come straight from
//! the table in the design spec; a channel's configuration may override
//! any of them.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::value_objects::StageKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTimeoutPolicy {
    defaults: BTreeMap<StageKind, Duration>,
}

impl Default for StageTimeoutPolicy {
    fn default() -> Self {
        let mut defaults = BTreeMap::new();
        defaults.insert(StageKind::Assets, Duration::from_secs(60));
        defaults.insert(StageKind::Composites, Duration::from_secs(10));
        defaults.insert(StageKind::Video, Duration::from_secs(600));
        defaults.insert(StageKind::Audio, Duration::from_secs(120));
        defaults.insert(StageKind::Sfx, Duration::from_secs(120));
        defaults.insert(StageKind::Assembly, Duration::from_secs(180));
        Self { defaults }
    }
}

impl StageTimeoutPolicy {
    /// Resolves the effective timeout for a stage: a channel-level
    /// override, if present, otherwise the built-in default.
    pub fn timeout_for(&self, stage: StageKind, channel_override: Option<Duration>) -> Duration {
        channel_override.unwrap_or_else(|| self.defaults[&stage])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_default_when_no_override_given() {
        let policy = StageTimeoutPolicy::default();
        assert_eq!(policy.timeout_for(StageKind::Video, None), Duration::from_secs(600));
    }

    #[test]
    fn channel_override_takes_precedence() {
        let policy = StageTimeoutPolicy::default();
        assert_eq!(
            policy.timeout_for(StageKind::Video, Some(Duration::from_secs(900))),
            Duration::from_secs(900)
        );
    }
}
