// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Cost entry: an append-only child record of a Task. `pipeline_cost_usd`
//! is always the sum of a task's entries (invariant 5); nothing ever
//! updates or deletes an entry once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{StageKind, TaskId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub task_id: TaskId,
    pub stage: StageKind,
    pub amount_usd: f64,
    pub units: u32,
    pub recorded_at: DateTime<Utc>,
}

impl CostEntry {
    pub fn new(task_id: TaskId, stage: StageKind, amount_usd: f64, units: u32, recorded_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            stage,
            amount_usd,
            units,
            recorded_at,
        }
    }
}
