// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface
//!
//! The worker is a long-running daemon, not a multi-command tool, so its
//! CLI surface is small: where to find configuration, and how chatty to
//! be. Security validation (path traversal, dangerous characters) still
//! matters for the one path argument it does take.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(name = "channel_pipeline_worker", about = "Channel video pipeline orchestrator worker")]
pub struct Cli {
    /// Path to an optional TOML configuration file, layered under environment variables.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Port the Prometheus metrics endpoint listens on.
    #[arg(long, default_value_t = 9898)]
    pub metrics_port: u16,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid value for --{arg}: {reason}")]
    InvalidValue { arg: String, reason: String },
    #[error("path contains unsafe characters: {0}")]
    UnsafePath(String),
}

/// Rejects path traversal sequences and NUL bytes; clap/`PathBuf` accept
/// both structurally, so the check belongs here rather than in the type.
fn validate_path_argument(path: &std::path::Path) -> Result<(), ParseError> {
    let raw = path.to_string_lossy();
    if raw.contains('\0') {
        return Err(ParseError::UnsafePath(raw.into_owned()));
    }
    if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(ParseError::UnsafePath(raw.into_owned()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub config: Option<PathBuf>,
    pub verbose: bool,
    pub metrics_port: u16,
}

pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = Cli::parse();
    validate_cli(cli)
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    if let Some(ref path) = cli.config {
        validate_path_argument(path)?;
    }
    if cli.metrics_port == 0 {
        return Err(ParseError::InvalidValue {
            arg: "metrics-port".to_string(),
            reason: "must be nonzero".to_string(),
        });
    }
    Ok(ValidatedCli {
        config: cli.config,
        verbose: cli.verbose,
        metrics_port: cli.metrics_port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_dir_traversal() {
        let err = validate_path_argument(std::path::Path::new("../../etc/passwd")).unwrap_err();
        assert!(matches!(err, ParseError::UnsafePath(_)));
    }

    #[test]
    fn accepts_ordinary_relative_path() {
        assert!(validate_path_argument(std::path::Path::new("config/worker.toml")).is_ok());
    }

    #[test]
    fn rejects_zero_metrics_port() {
        let cli = Cli {
            config: None,
            verbose: false,
            metrics_port: 0,
        };
        assert!(validate_cli(cli).is_err());
    }
}
