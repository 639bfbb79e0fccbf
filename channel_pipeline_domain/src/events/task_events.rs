// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{StageKind, TaskId, TaskStatus};

/// Something that happened to a Task, raised by the Orchestrator as it
/// drives the state machine. Consumed by tracing and by the outbound half
/// of the Board Synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    Created {
        task_id: TaskId,
        at: DateTime<Utc>,
    },
    StageStarted {
        task_id: TaskId,
        stage: StageKind,
        at: DateTime<Utc>,
    },
    StageCompleted {
        task_id: TaskId,
        stage: StageKind,
        duration_secs: f64,
        at: DateTime<Utc>,
    },
    ReviewGateEntered {
        task_id: TaskId,
        status: TaskStatus,
        at: DateTime<Utc>,
    },
    Approved {
        task_id: TaskId,
        status: TaskStatus,
        at: DateTime<Utc>,
    },
    Rejected {
        task_id: TaskId,
        status: TaskStatus,
        feedback: String,
        at: DateTime<Utc>,
    },
    TransientFailure {
        task_id: TaskId,
        stage: StageKind,
        attempt: u32,
        retry_after: DateTime<Utc>,
    },
    PermanentFailure {
        task_id: TaskId,
        stage: StageKind,
        reason: String,
        at: DateTime<Utc>,
    },
    Published {
        task_id: TaskId,
        output_path: String,
        at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Created { task_id, .. }
            | TaskEvent::StageStarted { task_id, .. }
            | TaskEvent::StageCompleted { task_id, .. }
            | TaskEvent::ReviewGateEntered { task_id, .. }
            | TaskEvent::Approved { task_id, .. }
            | TaskEvent::Rejected { task_id, .. }
            | TaskEvent::TransientFailure { task_id, .. }
            | TaskEvent::PermanentFailure { task_id, .. }
            | TaskEvent::Published { task_id, .. } => *task_id,
        }
    }
}
