// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Driver
//!
//! Thin, uniform wrapper around each external generator (§4.2, §6.1): one
//! subprocess invocation, a declared timeout, and a typed outcome. The
//! core never interprets generator stdout beyond diagnostics — success is
//! judged purely by exit code plus output-file verification.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use channel_pipeline_domain::PipelineError;
use tokio::process::Command;
use tracing::{instrument, warn};

use super::filesystem::WorkspaceLayout;
use super::logging::redact_secrets;

fn is_safe_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// One successfully produced output.
#[derive(Debug, Clone)]
pub struct StageSuccess {
    pub output_path: PathBuf,
    pub duration: Duration,
}

/// The classified failure of a single driver invocation (§4.2.5, §7).
#[derive(Debug, Clone)]
pub enum StageFailure {
    Timeout,
    RateLimited(String),
    QuotaExhausted(String),
    AuthFailed(String),
    BadInput(String),
    Transient(String),
}

impl StageFailure {
    pub fn outcome_label(&self) -> &'static str {
        match self {
            StageFailure::Timeout => "timeout",
            StageFailure::RateLimited(_) => "rate_limited",
            StageFailure::QuotaExhausted(_) => "quota_exhausted",
            StageFailure::AuthFailed(_) => "auth_failed",
            StageFailure::BadInput(_) => "bad_input",
            StageFailure::Transient(_) => "transient",
        }
    }

    pub fn into_pipeline_error(self) -> PipelineError {
        match self {
            StageFailure::Timeout => PipelineError::Timeout("stage driver subprocess exceeded timeout".to_string()),
            StageFailure::RateLimited(msg) => PipelineError::RateLimited(msg),
            StageFailure::QuotaExhausted(msg) => PipelineError::QuotaExhausted(msg),
            StageFailure::AuthFailed(msg) => PipelineError::AuthFailed(msg),
            StageFailure::BadInput(msg) => PipelineError::BadInput(msg),
            StageFailure::Transient(msg) => PipelineError::Transient(msg),
        }
    }
}

/// Classifies non-zero exit stderr into one of the six failure kinds
/// (§4.2.5). Pattern matching is deliberately conservative: anything that
/// doesn't look like a recognized signal falls back to `Transient`, which
/// is retried rather than silently treated as permanent.
fn classify_stderr(stderr: &str) -> StageFailure {
    let lower = stderr.to_ascii_lowercase();
    let redacted = redact_secrets(stderr);
    if lower.contains("rate limit") || lower.contains("429") || lower.contains("too many requests") {
        StageFailure::RateLimited(redacted)
    } else if lower.contains("quota") {
        StageFailure::QuotaExhausted(redacted)
    } else if lower.contains("unauthorized") || lower.contains("forbidden") || lower.contains("auth") || lower.contains("401") || lower.contains("403") {
        StageFailure::AuthFailed(redacted)
    } else if lower.contains("invalid") || lower.contains("bad request") || lower.contains("400") {
        StageFailure::BadInput(redacted)
    } else {
        StageFailure::Transient(redacted)
    }
}

/// One invocation of an external generator: argv template plus declared
/// timeout for the sub-item's output, resolved by [`super::filesystem::WorkspaceLayout`].
pub struct StageInvocation<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    pub output_path: PathBuf,
    pub timeout: Duration,
}

/// Executes one stage generator invocation (§4.2 steps 1-6).
pub struct StageDriver;

impl StageDriver {
    /// Validates `stage` against the identifier allowlist before any
    /// subprocess is spawned (§4.2.1).
    pub fn validate_stage_name(stage: &str) -> Result<(), PipelineError> {
        if !is_safe_identifier(stage) {
            return Err(PipelineError::InvalidIdentifier(format!(
                "stage name '{stage}' must match ^[a-zA-Z0-9_-]+$"
            )));
        }
        Ok(())
    }

    #[instrument(skip(invocation), fields(program = invocation.program, timeout_secs = invocation.timeout.as_secs()))]
    pub async fn invoke(invocation: StageInvocation<'_>) -> Result<StageSuccess, StageFailure> {
        let start = std::time::Instant::now();

        let mut command = Command::new(invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return Err(StageFailure::Transient(format!("failed to spawn generator: {e}"))),
        };

        let output = match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(StageFailure::Transient(format!("generator subprocess I/O error: {e}"))),
            Err(_) => return Err(StageFailure::Timeout),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let truncated: String = stderr.chars().take(500).collect();
            let failure = classify_stderr(&truncated);
            warn!(outcome = failure.outcome_label(), stderr = %redact_secrets(&truncated), "stage generator exited non-zero");
            return Err(failure);
        }

        if !WorkspaceLayout::output_verified(&invocation.output_path).await {
            return Err(StageFailure::Transient(format!(
                "generator exited 0 but expected output is missing or empty: {}",
                invocation.output_path.display()
            )));
        }

        Ok(StageSuccess {
            output_path: invocation.output_path,
            duration: start.elapsed(),
        })
    }
}

/// §6.1 manifest shape for the assembly generator.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AssemblyManifest {
    pub clips: Vec<AssemblyClip>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AssemblyClip {
    pub clip_number: u32,
    pub video_path: String,
    pub narration_path: String,
    pub sfx_path: String,
    pub narration_duration: f64,
}

/// Writes the assembly manifest to `path` as JSON, returning the path for
/// the `--manifest` argument.
pub async fn write_assembly_manifest(path: &Path, manifest: &AssemblyManifest) -> Result<(), PipelineError> {
    let json = serde_json::to_vec_pretty(manifest)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_stderr() {
        assert!(matches!(classify_stderr("Error: rate limit exceeded, retry later"), StageFailure::RateLimited(_)));
    }

    #[test]
    fn classifies_quota_stderr() {
        assert!(matches!(classify_stderr("monthly quota exhausted for this API key"), StageFailure::QuotaExhausted(_)));
    }

    #[test]
    fn classifies_auth_stderr() {
        assert!(matches!(classify_stderr("401 Unauthorized: invalid api key"), StageFailure::AuthFailed(_)));
    }

    #[test]
    fn classifies_bad_input_stderr() {
        assert!(matches!(classify_stderr("400 Bad Request: invalid prompt"), StageFailure::BadInput(_)));
    }

    #[test]
    fn unrecognized_stderr_is_transient() {
        assert!(matches!(classify_stderr("connection reset by peer"), StageFailure::Transient(_)));
    }

    #[test]
    fn rejects_unsafe_stage_name() {
        assert!(StageDriver::validate_stage_name("assets; rm -rf /").is_err());
        assert!(StageDriver::validate_stage_name("assets").is_ok());
    }

    #[tokio::test]
    async fn invoke_reports_transient_when_output_missing() {
        let invocation = StageInvocation {
            program: "true",
            args: vec![],
            output_path: PathBuf::from("/nonexistent/output/path.png"),
            timeout: Duration::from_secs(5),
        };
        let result = StageDriver::invoke(invocation).await;
        assert!(matches!(result, Err(StageFailure::Transient(_))));
    }

    #[tokio::test]
    async fn invoke_reports_timeout_on_slow_process() {
        let invocation = StageInvocation {
            program: "sleep",
            args: vec!["5".to_string()],
            output_path: PathBuf::from("/nonexistent/output/path.png"),
            timeout: Duration::from_millis(50),
        };
        let result = StageDriver::invoke(invocation).await;
        assert!(matches!(result, Err(StageFailure::Timeout)));
    }
}
