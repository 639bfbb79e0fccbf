// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Configuration
//!
//! Assembles the worker's runtime configuration from, in increasing
//! precedence: built-in defaults, an optional TOML file, then environment
//! variables (§6.4, §6.5). Layering goes through the `config` crate; the
//! env vars named explicitly in §6.4 are also read directly by name so a
//! deployment that only sets `MAX_CONCURRENT_VIDEO_GEN` (rather than the
//! `config` crate's `APP__...` nested form) still works.

use std::time::Duration;

use channel_pipeline_domain::PipelineError;
use serde::Deserialize;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Concurrency Governor caps (§4.4, §6.4). Reloadable at runtime via
/// [`crate::infrastructure::governor::Governor::reload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GovernorConfig {
    pub max_concurrent_asset_gen: usize,
    pub max_concurrent_video_gen: usize,
    pub max_concurrent_audio_gen: usize,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_asset_gen: 12,
            max_concurrent_video_gen: 3,
            max_concurrent_audio_gen: 6,
        }
    }
}

/// Board Synchronizer configuration (§4.7, §6.4).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BoardSyncConfig {
    pub database_ids: Vec<String>,
    pub sync_interval_secs: u64,
}

impl BoardSyncConfig {
    pub const MIN_INTERVAL_SECS: u64 = 10;
    pub const MAX_INTERVAL_SECS: u64 = 600;
    pub const DEFAULT_INTERVAL_SECS: u64 = 60;

    /// Clamps to [10, 600] per §6.4, regardless of source.
    pub fn clamped_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.clamp(Self::MIN_INTERVAL_SECS, Self::MAX_INTERVAL_SECS))
    }

    /// Inbound sync is disabled when the database id list is empty
    /// (§6.4: "empty means inbound sync disabled").
    pub fn inbound_enabled(&self) -> bool {
        !self.database_ids.is_empty()
    }
}

impl Default for BoardSyncConfig {
    fn default() -> Self {
        Self {
            database_ids: Vec::new(),
            sync_interval_secs: Self::DEFAULT_INTERVAL_SECS,
        }
    }
}

/// Paths to the five external generator executables (§6.1). The CLI
/// contract for each is fixed by spec; which binary on disk implements it
/// is a deployment detail §6.4 is silent on, so each is resolved from its
/// own env var with a bare-name fallback that relies on `PATH` — see
/// DESIGN.md.
#[derive(Debug, Clone)]
pub struct GeneratorBinaries {
    pub image: String,
    pub video_clip: String,
    pub narration: String,
    pub sfx: String,
    pub assembly: String,
}

impl Default for GeneratorBinaries {
    fn default() -> Self {
        Self {
            image: env_var("ASSET_GENERATOR_BIN").unwrap_or_else(|| "generate-image".to_string()),
            video_clip: env_var("VIDEO_GENERATOR_BIN").unwrap_or_else(|| "generate-video-clip".to_string()),
            narration: env_var("NARRATION_GENERATOR_BIN").unwrap_or_else(|| "generate-narration".to_string()),
            sfx: env_var("SFX_GENERATOR_BIN").unwrap_or_else(|| "generate-sfx".to_string()),
            assembly: env_var("ASSEMBLY_GENERATOR_BIN").unwrap_or_else(|| "assemble-video".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub board_sync: BoardSyncConfig,
    pub governor: GovernorConfig,
    pub default_voice_id: Option<String>,
    pub encryption_key: Option<String>,
    pub workspace_root: std::path::PathBuf,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    /// Base URL of the external board's document-store API. §6.4 doesn't
    /// name an env var for this (the distilled spec only lists the
    /// database ids to poll), so `BOARD_API_BASE_URL` is an addition of
    /// ours — see DESIGN.md.
    pub board_api_base_url: String,
    /// Bearer credential for the board API. Like the base URL, not named
    /// by §6.4; resolved the same way `FERNET_KEY` is.
    pub board_api_token: Option<String>,
    pub generators: GeneratorBinaries,
    /// Base URL composite images are published under before the video
    /// stage is invoked with `--image <public URL>` (§6.1). Only
    /// meaningful when a channel's `storage_strategy` is `"local"` and
    /// the workspace root is served by something reachable at this URL;
    /// see `AssetPublisher` in the application layer and DESIGN.md.
    pub public_asset_base_url: Option<String>,
}

impl WorkerConfig {
    /// Loads configuration the way §6.5 describes: defaults, then an
    /// optional TOML file, then environment.
    pub fn load(config_file: Option<&std::path::Path>) -> Result<Self, PipelineError> {
        let mut builder = config::Config::builder()
            .set_default("board_sync.sync_interval_secs", BoardSyncConfig::DEFAULT_INTERVAL_SECS as i64)
            .map_err(config_err)?
            .set_default("governor.max_concurrent_asset_gen", 12i64)
            .map_err(config_err)?
            .set_default("governor.max_concurrent_video_gen", 3i64)
            .map_err(config_err)?
            .set_default("governor.max_concurrent_audio_gen", 6i64)
            .map_err(config_err)?
            .set_default("workspace_root", "./workspace")
            .map_err(config_err)?;

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("APP").separator("__"));
        let layered = builder.build().map_err(config_err)?;

        let database_url = env_var("DATABASE_URL")
            .or_else(|| layered.get_string("database_url").ok())
            .ok_or_else(|| PipelineError::InvalidConfiguration("DATABASE_URL is required".to_string()))?;

        let database_ids = env_var("BOARD_DATABASE_IDS")
            .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_else(|| layered.get_array("board_sync.database_ids").map(to_string_vec).unwrap_or_default());

        let sync_interval_secs = env_var("BOARD_SYNC_INTERVAL_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| layered.get_int("board_sync.sync_interval_secs").unwrap_or(60) as u64);

        let governor = GovernorConfig {
            max_concurrent_asset_gen: env_var("MAX_CONCURRENT_ASSET_GEN")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| layered.get_int("governor.max_concurrent_asset_gen").unwrap_or(12) as usize),
            max_concurrent_video_gen: env_var("MAX_CONCURRENT_VIDEO_GEN")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| layered.get_int("governor.max_concurrent_video_gen").unwrap_or(3) as usize),
            max_concurrent_audio_gen: env_var("MAX_CONCURRENT_AUDIO_GEN")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| layered.get_int("governor.max_concurrent_audio_gen").unwrap_or(6) as usize),
        };

        let workspace_root = env_var("WORKSPACE_ROOT")
            .or_else(|| layered.get_string("workspace_root").ok())
            .unwrap_or_else(|| "./workspace".to_string())
            .into();

        Ok(Self {
            database_url,
            board_sync: BoardSyncConfig {
                database_ids,
                sync_interval_secs,
            },
            governor,
            default_voice_id: env_var("DEFAULT_VOICE_ID"),
            encryption_key: env_var("FERNET_KEY"),
            workspace_root,
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(90),
            board_api_base_url: env_var("BOARD_API_BASE_URL").unwrap_or_else(|| "https://api.board.internal".to_string()),
            board_api_token: env_var("BOARD_API_TOKEN"),
            generators: GeneratorBinaries::default(),
            public_asset_base_url: env_var("PUBLIC_ASSET_BASE_URL"),
        })
    }
}

fn to_string_vec(values: Vec<config::Value>) -> Vec<String> {
    values.into_iter().filter_map(|v| v.into_string().ok()).collect()
}

fn config_err(e: config::ConfigError) -> PipelineError {
    PipelineError::InvalidConfiguration(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_interval_clamps_below_minimum() {
        let cfg = BoardSyncConfig {
            database_ids: vec![],
            sync_interval_secs: 1,
        };
        assert_eq!(cfg.clamped_interval(), Duration::from_secs(BoardSyncConfig::MIN_INTERVAL_SECS));
    }

    #[test]
    fn sync_interval_clamps_above_maximum() {
        let cfg = BoardSyncConfig {
            database_ids: vec![],
            sync_interval_secs: 100_000,
        };
        assert_eq!(cfg.clamped_interval(), Duration::from_secs(BoardSyncConfig::MAX_INTERVAL_SECS));
    }

    #[test]
    fn inbound_disabled_when_no_database_ids() {
        let cfg = BoardSyncConfig::default();
        assert!(!cfg.inbound_enabled());
    }
}
