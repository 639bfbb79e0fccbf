// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Entities: identity-bearing domain objects. Two `Task`s with identical
//! field values but different ids are different tasks.

pub mod channel;
pub mod cost_entry;
pub mod task;

pub use channel::Channel;
pub use cost_entry::CostEntry;
pub use task::{ResumeLedger, StagePartialProgress, Task};
