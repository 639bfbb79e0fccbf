// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Channel
//!
//! A YouTube channel the orchestrator produces videos for. Channels are
//! created out of band (through whatever onboarding tool manages the
//! external board) and are never cascade-deleted by the core: Tasks
//! reference a Channel by id with a `RESTRICT` foreign key, so historical
//! Tasks survive a channel being deactivated.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ChannelId, Priority, StageKind};

/// Per-channel configuration that doesn't belong on the generic Channel
/// record itself — kept as a nested struct so new fields don't churn the
/// entity's constructor signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// TTS voice identifier. `None` falls back to `DEFAULT_VOICE_ID`;
    /// absence of both is a configuration error surfaced at stage time,
    /// not at channel creation.
    pub voice_id: Option<String>,
    pub branding_asset_paths: Vec<String>,
    /// Storage strategy key, e.g. `"local"` or `"s3"`. Opaque to the
    /// domain — the infrastructure layer interprets it.
    pub storage_strategy: String,
    /// Per-channel overrides of [`crate::services::StageTimeoutPolicy`]'s
    /// defaults (§4.2: "overridable by channel configuration"), in
    /// seconds. A channel whose video generator is known to run long can
    /// raise just that one entry without touching the global default.
    #[serde(default)]
    pub stage_timeout_overrides_secs: BTreeMap<StageKind, u64>,
    /// Per-channel overrides of [`crate::services::StageCostPolicy`]'s
    /// per-unit dollar rates, for a channel whose generator contract is
    /// billed at a different rate than the fleet default.
    #[serde(default)]
    pub stage_cost_overrides_usd: BTreeMap<StageKind, f64>,
    /// Number of narrated shots (and therefore video clips, narration
    /// clips, and SFX clips) a single video for this channel is planned
    /// around. Drives sub-item counts for the Video/Audio/Sfx stages.
    /// Not named anywhere in §4/§6 — the distilled spec describes the
    /// sub-item shape of a stage but not what decides its cardinality for
    /// a given Task; see DESIGN.md.
    #[serde(default = "default_shots_per_video")]
    pub shots_per_video: u32,
    /// Number of still assets (backgrounds, b-roll stills, branding
    /// plates) generated ahead of compositing. Typically larger than
    /// `shots_per_video` since a shot's composite often draws on more
    /// than one asset.
    #[serde(default = "default_assets_per_video")]
    pub assets_per_video: u32,
}

fn default_shots_per_video() -> u32 {
    18
}

fn default_assets_per_video() -> u32 {
    22
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            voice_id: None,
            branding_asset_paths: Vec::new(),
            storage_strategy: "local".to_string(),
            stage_timeout_overrides_secs: BTreeMap::new(),
            stage_cost_overrides_usd: BTreeMap::new(),
            shots_per_video: default_shots_per_video(),
            assets_per_video: default_assets_per_video(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub display_name: String,
    pub active: bool,
    pub priority: Priority,
    pub config: ChannelConfig,
    /// AEAD ciphertext blobs for third-party credentials, keyed by
    /// provider name (e.g. `"tts"`, `"image_gen"`). Decrypted on demand
    /// into a short-lived value that is never logged (§6.4).
    pub encrypted_credentials: std::collections::BTreeMap<String, Vec<u8>>,
    /// Last time a task owned by this channel was claimed by a worker.
    /// Drives the Fair Scheduler's per-channel round-robin ordering
    /// (`last_claimed_at ASC NULLS FIRST`, §4.5).
    pub last_claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(id: ChannelId, display_name: impl Into<String>, priority: Priority, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            active: true,
            priority,
            config: ChannelConfig::default(),
            encrypted_credentials: std::collections::BTreeMap::new(),
            last_claimed_at: None,
            created_at,
        }
    }

    pub fn voice_id<'a>(&'a self, default_voice_id: Option<&'a str>) -> Option<&'a str> {
        self.config.voice_id.as_deref().or(default_voice_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_voice_when_channel_omits_one() {
        let channel = Channel::new(ChannelId::parse("c1").unwrap(), "Test Channel", Priority::Normal, Utc::now());
        assert_eq!(channel.voice_id(Some("fallback-voice")), Some("fallback-voice"));
    }

    #[test]
    fn channel_voice_overrides_default() {
        let mut channel = Channel::new(ChannelId::parse("c1").unwrap(), "Test Channel", Priority::Normal, Utc::now());
        channel.config.voice_id = Some("channel-voice".to_string());
        assert_eq!(channel.voice_id(Some("fallback-voice")), Some("channel-voice"));
    }
}
