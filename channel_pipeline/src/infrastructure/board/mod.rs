// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Board Integration
//!
//! Everything that talks to the external project-management board (§4.7,
//! §6.2): the rate-limited HTTP client, the wire-to-domain translation,
//! and the two synchronizer loops that drive them.

mod client;
mod rate_limiter;
mod status_mapping;
mod sync;

pub use client::BoardClient;
pub use rate_limiter::RateLimiter;
pub use status_mapping::{classify_inbound, BoardPage, InboundAction};
pub use sync::{BoardSynchronizer, OutboundHandle};
