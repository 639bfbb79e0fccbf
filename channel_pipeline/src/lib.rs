// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Channel Pipeline
//!
//! Infrastructure and application layers for the channel video pipeline
//! worker: a daemon that drives Tasks queued from an external project
//! board through a fixed sequence of generation stages (image assets,
//! composites, video clips, narration, sound effects, and final assembly),
//! each backed by an external generator subprocess, with human review
//! gates between stages and automatic retry/backoff on transient failure.
//!
//! ## Architecture
//!
//! This crate builds on [`channel_pipeline_domain`], which owns the
//! pipeline's entities, value objects, the Task Aggregate's state machine,
//! and repository contracts, and has no dependency on any of the
//! infrastructure below it:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (Orchestrator, Stage Planning, Asset Publishing,            │
//! │   Worker Claim Loop)                                         │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! │  (channel_pipeline_domain: Entities, Value Objects,          │
//! │   the Task Aggregate, Domain Services, Events)               │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (SQLite persistence, the board HTTP client and              │
//! │   synchronizer, the Stage Driver, the Concurrency            │
//! │   Governor, credential encryption, metrics, logging)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Process-level bootstrap concerns — CLI parsing, signal handling,
//! graceful shutdown, platform abstraction, exit codes — live in the
//! separate [`channel_pipeline_bootstrap`] crate, which this crate depends
//! on but which deliberately has no dependency back.
//!
//! ## Core Concepts
//!
//! ### Task
//! A Task is one video under production for one Channel. Its lifecycle is
//! entirely owned by [`channel_pipeline_domain::aggregates::TaskAggregate`]:
//! every status change — claiming, entering a stage, clearing or failing a
//! review gate, parking for retry — goes through one of its methods, never
//! through a direct field write.
//!
//! ### Stages
//! Six stages run in a fixed order: Assets, Composites, Video, Audio, Sfx,
//! Assembly. All but Composites end at a human review gate; a rejection at
//! any gate can target specific sub-items for regeneration rather than the
//! whole stage (§4.3's resume semantics).
//!
//! ### Resume Ledger
//! Embedded in each Task, the Ledger records per-stage, per-sub-item
//! completion so a crash or a worker restart resumes exactly where it left
//! off instead of re-running finished work.
//!
//! ## Concurrency
//!
//! The Concurrency Governor enforces per-concurrency-class caps
//! (asset/video/audio generation; assembly is unbounded) as non-blocking
//! admission control, reloadable at runtime on `SIGHUP` without
//! restarting the worker. The Fair Scheduler — the ordering and admission
//! logic behind [`channel_pipeline_domain::repositories::TaskRepository::claim_next_task`]
//! — combines with the Governor so a worker never claims a Task it cannot
//! immediately make progress on.
//!
//! ## Board Synchronization
//!
//! Two independent loops keep this worker's view of Task status in sync
//! with the external board: an outbound debounced push whenever a Task
//! crosses a board-visible status, and an inbound poll that applies new
//! pages, approvals, and rejections. The Task Store's conditional
//! `transition` arbitrates any race between the two.

pub mod application;
pub mod infrastructure;

// Tests are organized as:
// - Unit tests: #[cfg(test)] modules within each source file
// - Integration tests: separate files in tests/ directory

pub use channel_pipeline_domain::{
    aggregates::TaskAggregate,
    entities::{Channel, CostEntry, ResumeLedger, Task},
    repositories::{ChannelRepository, ClaimFilter, ContentInputs, TaskRepository, UpsertOutcome},
    value_objects::{BoardPageId, ChannelId, Priority, StageKind, TaskId, TaskStatus},
    PipelineError, TaskEvent,
};

pub use crate::application::{AssetPublisher, LocalAssetPublisher, Orchestrator, WorkerLoop};
pub use crate::infrastructure::board::{BoardClient, BoardSynchronizer, OutboundHandle, RateLimiter};
pub use crate::infrastructure::config::{BoardSyncConfig, GeneratorBinaries, GovernorConfig, WorkerConfig};
pub use crate::infrastructure::credentials::CredentialCipher;
pub use crate::infrastructure::filesystem::{StageDirectory, WorkspaceLayout};
pub use crate::infrastructure::governor::{Governor, GovernorPermit};
pub use crate::infrastructure::heartbeat::{reclaim_stale_claims, HeartbeatWriter};
pub use crate::infrastructure::metrics::{MetricsEndpoint, MetricsService};
pub use crate::infrastructure::persistence::{SqliteChannelRepository, SqliteTaskRepository};
pub use crate::infrastructure::stage_driver::{StageDriver, StageFailure, StageInvocation, StageSuccess};
