// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! A single hierarchical error type for the orchestrator domain. Every error
//! kind named by the component design (Task Store, Stage Driver, Board
//! Synchronizer, credential access) maps to exactly one variant here, so
//! callers can match on `category()` without downcasting.
//!
//! ## Recovery policy
//!
//! - [`PipelineError::is_transient`] — worth retrying with backoff.
//! - [`PipelineError::is_permanent`] — transitions the task to an error
//!   state; no automatic retry.
//! - Everything else (`InvalidTransition`, `AlreadyExists`, ...) is handled
//!   explicitly by the caller; see §7 of the design spec.

use thiserror::Error;

/// Domain-specific errors for the channel pipeline orchestrator.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// A requested `(from, to)` status transition is not in the state
    /// machine, or `from` no longer matches the stored row.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// `upsert_task_from_board` found an existing active task for the page.
    #[error("task already exists for board page: {0}")]
    AlreadyExists(String),

    /// A Stage Driver subprocess exceeded its timeout.
    #[error("stage timed out: {0}")]
    Timeout(String),

    /// The external generator or board reported a rate limit.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A per-channel or account-wide quota has been exhausted.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Generator or board authentication failed. Permanent.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The generator rejected its input. Permanent.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Network or 5xx-class failure. Transient.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Resume Ledger or stage output state is inconsistent.
    #[error("invalid ledger state: {0}")]
    InvalidLedger(String),

    /// Free-text rejection feedback from the board did not parse.
    #[error("unparsable rejection feedback: {0}")]
    UnparsableFeedback(String),

    /// A channel, task, or stage identifier failed the allowlist pattern.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A filesystem path resolved outside the workspace root.
    #[error("path traversal rejected: {0}")]
    PathTraversal(String),

    /// `FERNET_KEY` (or equivalent) is not configured.
    #[error("encryption key missing")]
    EncryptionKeyMissing,

    /// Credential ciphertext failed to decrypt under the configured key.
    #[error("credential decryption failed")]
    DecryptionFailed,

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("configuration error: {0}")]
    InvalidConfiguration(String),

    #[error("io error: {0}")]
    IoError(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl PipelineError {
    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn cancelled() -> Self {
        Self::Cancelled("operation cancelled".to_string())
    }

    /// Errors that a caller should retry with backoff (§7 of the design
    /// spec: `Timeout | RateLimited | QuotaExhausted | Transient`).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::Timeout(_)
                | PipelineError::RateLimited(_)
                | PipelineError::QuotaExhausted(_)
                | PipelineError::Transient(_)
        )
    }

    /// Errors that move a task straight to its `*_error` state with no
    /// automatic retry (`AuthFailed | BadInput`, plus the credential
    /// failures, which are always fatal for the affected task).
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            PipelineError::AuthFailed(_)
                | PipelineError::BadInput(_)
                | PipelineError::EncryptionKeyMissing
                | PipelineError::DecryptionFailed
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::InvalidTransition(_) => "invalid_transition",
            PipelineError::AlreadyExists(_) => "already_exists",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::RateLimited(_) => "rate_limited",
            PipelineError::QuotaExhausted(_) => "quota_exhausted",
            PipelineError::AuthFailed(_) => "auth_failed",
            PipelineError::BadInput(_) => "bad_input",
            PipelineError::Transient(_) => "transient",
            PipelineError::InvalidLedger(_) => "ledger",
            PipelineError::UnparsableFeedback(_) => "feedback",
            PipelineError::InvalidIdentifier(_) => "identifier",
            PipelineError::PathTraversal(_) => "path_traversal",
            PipelineError::EncryptionKeyMissing => "encryption_key_missing",
            PipelineError::DecryptionFailed => "decryption_failed",
            PipelineError::ValidationError(_) => "validation",
            PipelineError::InvalidConfiguration(_) => "configuration",
            PipelineError::IoError(_) => "io",
            PipelineError::DatabaseError(_) => "database",
            PipelineError::SerializationError(_) => "serialization",
            PipelineError::TaskNotFound(_) => "task_not_found",
            PipelineError::ChannelNotFound(_) => "channel_not_found",
            PipelineError::InternalError(_) => "internal",
            PipelineError::Cancelled(_) => "cancelled",
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(PipelineError::Timeout("x".into()).is_transient());
        assert!(PipelineError::RateLimited("x".into()).is_transient());
        assert!(PipelineError::QuotaExhausted("x".into()).is_transient());
        assert!(PipelineError::Transient("x".into()).is_transient());
        assert!(!PipelineError::AuthFailed("x".into()).is_transient());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(PipelineError::AuthFailed("x".into()).is_permanent());
        assert!(PipelineError::BadInput("x".into()).is_permanent());
        assert!(PipelineError::EncryptionKeyMissing.is_permanent());
        assert!(!PipelineError::Timeout("x".into()).is_permanent());
    }
}
