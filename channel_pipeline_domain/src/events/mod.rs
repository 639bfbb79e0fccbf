// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain events. These are not an event-sourcing log — the Task Store is
//! the single source of truth (§4.1) and nothing is ever rebuilt by
//! replaying events. They exist so the Orchestrator can emit a uniform,
//! structured record of "something happened" for tracing and for the
//! Board Synchronizer's outbound queue to consume.

pub mod task_events;

pub use task_events::TaskEvent;
