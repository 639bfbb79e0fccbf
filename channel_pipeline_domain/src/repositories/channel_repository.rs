// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::Channel;
use crate::value_objects::ChannelId;
use crate::PipelineError;

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn find_by_id(&self, id: &ChannelId) -> Result<Option<Channel>, PipelineError>;

    async fn list_active(&self) -> Result<Vec<Channel>, PipelineError>;

    /// Stamps the per-channel round-robin marker the Fair Scheduler
    /// orders on (§4.5).
    async fn mark_claimed(&self, id: &ChannelId, at: DateTime<Utc>) -> Result<(), PipelineError>;

    /// Stores the channel's encrypted credential blob for a provider.
    /// The plaintext never reaches this trait — encryption happens in
    /// the infrastructure layer, against the configured key (§6.4).
    async fn store_encrypted_credential(&self, id: &ChannelId, provider: &str, ciphertext: Vec<u8>) -> Result<(), PipelineError>;

    async fn encrypted_credential(&self, id: &ChannelId, provider: &str) -> Result<Option<Vec<u8>>, PipelineError>;
}
