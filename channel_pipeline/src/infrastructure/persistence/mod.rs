// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite-backed implementations of the domain's `TaskRepository` and
//! `ChannelRepository` (§4.1). `schema` owns migration and connection
//! bring-up; the two repository modules each wrap one `SqlitePool`.

pub mod schema;
pub mod sqlite_channel_repository;
pub mod sqlite_task_repository;

pub use schema::{create_database_if_missing, database_err, ensure_schema, initialize_database};
pub use sqlite_channel_repository::SqliteChannelRepository;
pub use sqlite_task_repository::SqliteTaskRepository;
