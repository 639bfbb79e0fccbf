// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Per-unit dollar cost for a stage invocation (invariant 5:
//! `pipeline_cost_usd` is the sum of a task's cost entries). The
//! generators print no structured cost on stdout (§6.1), only diagnostics,
//! so there is no per-invocation figure to read back — the Orchestrator
//! instead charges a fixed per-unit rate for every successful sub-item and
//! records one `CostEntry` per invocation. Rates are the kind of number
//! that changes with a vendor's pricing page, not the pipeline's logic, so
//! a channel override works the same way [`crate::services::StageTimeoutPolicy`]'s
//! does; see DESIGN.md.

use std::collections::BTreeMap;

use crate::value_objects::StageKind;

#[derive(Debug, Clone, PartialEq)]
pub struct StageCostPolicy {
    defaults: BTreeMap<StageKind, f64>,
}

impl Default for StageCostPolicy {
    fn default() -> Self {
        let mut defaults = BTreeMap::new();
        defaults.insert(StageKind::Assets, 0.04);
        defaults.insert(StageKind::Composites, 0.01);
        defaults.insert(StageKind::Video, 0.50);
        defaults.insert(StageKind::Audio, 0.02);
        defaults.insert(StageKind::Sfx, 0.02);
        defaults.insert(StageKind::Assembly, 0.00);
        Self { defaults }
    }
}

impl StageCostPolicy {
    /// Resolves the effective per-unit rate for a stage: a channel-level
    /// override, if present, otherwise the built-in default.
    pub fn unit_cost_for(&self, stage: StageKind, channel_override: Option<f64>) -> f64 {
        channel_override.unwrap_or_else(|| self.defaults[&stage])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_default_when_no_override_given() {
        let policy = StageCostPolicy::default();
        assert_eq!(policy.unit_cost_for(StageKind::Video, None), 0.50);
    }

    #[test]
    fn channel_override_takes_precedence() {
        let policy = StageCostPolicy::default();
        assert_eq!(policy.unit_cost_for(StageKind::Video, Some(0.75)), 0.75);
    }

    #[test]
    fn assembly_is_free_by_default() {
        let policy = StageCostPolicy::default();
        assert_eq!(policy.unit_cost_for(StageKind::Assembly, None), 0.0);
    }
}
