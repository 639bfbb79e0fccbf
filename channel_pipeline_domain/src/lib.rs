// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Channel Pipeline Domain
//!
//! The core business rules of the channel video pipeline orchestrator,
//! independent of any database, HTTP client, or subprocess runner. This
//! crate implements Domain-Driven Design patterns:
//!
//! - **Entities** ([`entities`]) — `Task` and `Channel`, identity-bearing
//!   objects that change state over time. The Resume Ledger lives inside
//!   `Task`.
//! - **Value objects** ([`value_objects`]) — `TaskId`, `ChannelId`,
//!   `TaskStatus`, `StageKind`, `Priority`, `BoardPageId`: immutable,
//!   self-validating, compared by value.
//! - **Aggregates** ([`aggregates`]) — `TaskAggregate` enforces the
//!   pipeline state machine; every status change goes through it.
//! - **Domain events** ([`events`]) — a record of what happened to a
//!   Task, for tracing and for the Board Synchronizer's outbound queue.
//! - **Repositories** ([`repositories`]) — `TaskRepository` and
//!   `ChannelRepository`, the Task Store's contract. Implemented against
//!   SQLite in the `channel_pipeline` crate.
//! - **Domain services** ([`services`]) — rejection feedback parsing,
//!   backoff math, stage timeout resolution.
//!
//! ## Error handling
//!
//! A single [`PipelineError`] enum (see [`error`]) covers every domain
//! failure mode; `category()` gives a stable string for metrics labels
//! without downcasting.

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod events;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use aggregates::TaskAggregate;
pub use entities::{Channel, CostEntry, ResumeLedger, Task};
pub use error::PipelineError;
pub use events::TaskEvent;
pub use repositories::{ChannelRepository, ClaimFilter, ContentInputs, TaskRepository, UpsertOutcome};
pub use value_objects::{BoardPageId, ChannelId, Priority, StageKind, TaskId, TaskStatus};
