// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Supervision
//!
//! The worker runtime spawns several long-lived loops (claim loop,
//! outbound/inbound board sync, metrics endpoint). A plain `tokio::spawn`
//! would let any of them die silently; `spawn_supervised` logs start and
//! outcome, and `join_supervised` turns a panic or cancellation into the
//! same [`PipelineError`] vocabulary the rest of the worker already uses,
//! so a crashed loop surfaces through ordinary error handling rather than
//! through a missing log line days later.

use channel_pipeline_domain::PipelineError;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub type AppResult<T> = Result<T, PipelineError>;

/// Spawns `fut` under `name`, logging its start and outcome. The returned
/// handle must be joined with [`join_supervised`] for errors to surface.
pub fn spawn_supervised<F, T>(name: &'static str, fut: F) -> JoinHandle<AppResult<T>>
where
    F: std::future::Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    debug!(task = name, "task starting");
    tokio::spawn(async move {
        let result = fut.await;
        match &result {
            Ok(_) => debug!(task = name, "task completed"),
            Err(e) => error!(task = name, error = %e, "task failed"),
        }
        result
    })
}

/// Joins a handle from [`spawn_supervised`], mapping a panic or
/// cancellation to [`PipelineError::internal_error`] / [`PipelineError::cancelled`].
pub async fn join_supervised<T>(handle: JoinHandle<AppResult<T>>) -> AppResult<T> {
    match handle.await {
        Ok(task_result) => task_result,
        Err(e) if e.is_panic() => Err(PipelineError::internal_error(format!("task panicked: {e}"))),
        Err(e) if e.is_cancelled() => Err(PipelineError::cancelled()),
        Err(e) => Err(PipelineError::internal_error(format!("task join failed: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn supervised_success_round_trips_the_value() {
        let handle = spawn_supervised("test-success", async { Ok::<i32, PipelineError>(42) });
        let result = join_supervised(handle).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn supervised_error_is_propagated() {
        let handle = spawn_supervised("test-error", async { Err::<(), _>(PipelineError::validation_error("bad")) });
        assert!(join_supervised(handle).await.is_err());
    }

    #[tokio::test]
    async fn panicking_task_is_reported_as_internal_error() {
        let handle: JoinHandle<AppResult<()>> = tokio::spawn(async { panic!("boom") });
        let result = join_supervised(handle).await;
        assert!(result.unwrap_err().to_string().contains("panicked"));
    }
}
