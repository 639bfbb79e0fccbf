// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Repository traits: the Task Store's contract (§4.1). The domain layer
//! only sees these traits; SQLite-backed implementations live in the
//! `channel_pipeline` crate so the domain stays free of any storage
//! technology.

pub mod channel_repository;
pub mod task_repository;

pub use channel_repository::ChannelRepository;
pub use task_repository::{ClaimFilter, ContentInputs, TaskRepository, UpsertOutcome};
