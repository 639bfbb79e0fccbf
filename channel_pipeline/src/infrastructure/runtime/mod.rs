// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Runtime Support
//!
//! Task supervision helpers shared by every long-lived loop the worker
//! spawns (claim loop, outbound/inbound board sync, metrics endpoint).

pub mod supervisor;

pub use supervisor::{join_supervised, spawn_supervised, AppResult};
