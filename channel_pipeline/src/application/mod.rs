// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Layer
//!
//! Coordinates the domain and infrastructure layers into the running
//! worker: stage sub-item planning, the orchestrator that drives one
//! claimed Task through its current stage, the asset-publishing seam the
//! Video stage depends on, and the claim loop that ties the Task Store,
//! Concurrency Governor, and Board Synchronizer together (§4.6, §4.8).

pub mod asset_publisher;
pub mod orchestrator;
pub mod stage_plan;
pub mod worker_loop;

pub use asset_publisher::{AssetPublisher, LocalAssetPublisher};
pub use orchestrator::Orchestrator;
pub use worker_loop::WorkerLoop;
