// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Board HTTP Client
//!
//! Thin `reqwest` wrapper around the external board's document-store API
//! (§6.2). Every call goes through the shared [`RateLimiter`] first — the
//! board's 3 req/s cap is enforced here, not left to callers to
//! remember. Failures are classified the same way Stage Driver failures
//! are (§7): a 429 is `RateLimited`, a 5xx is `Transient`, anything else
//! surfaces as `Transient` too, since the Synchronizer's retry policy
//! doesn't need finer granularity than "retry" vs "give up".

use channel_pipeline_domain::value_objects::TaskStatus;
use channel_pipeline_domain::PipelineError;
use reqwest::{Client, StatusCode};
use tracing::{instrument, warn};

use super::rate_limiter::RateLimiter;
use super::status_mapping::BoardPage;
use crate::infrastructure::logging::redact_secrets;

pub struct BoardClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    rate_limiter: RateLimiter,
}

impl BoardClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, rate_limiter: RateLimiter) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            token,
            rate_limiter,
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Lists every page currently tracked under `database_id`.
    #[instrument(skip(self))]
    pub async fn list_pages(&self, database_id: &str) -> Result<Vec<BoardPage>, PipelineError> {
        self.rate_limiter.acquire().await;
        let url = format!("{}/databases/{}/pages", self.base_url, database_id);
        let response = self.authed(self.http.get(&url)).send().await.map_err(map_request_error)?;
        let response = check_status(response).await?;
        response.json::<Vec<BoardPage>>().await.map_err(|e| PipelineError::Transient(format!("unreadable board response: {e}")))
    }

    /// Pushes a single status write for `page_id` (§4.7 outbound loop:
    /// one API call per debounced status update).
    #[instrument(skip(self))]
    pub async fn push_status(&self, page_id: &str, status: TaskStatus) -> Result<(), PipelineError> {
        self.rate_limiter.acquire().await;
        let url = format!("{}/pages/{}", self.base_url, page_id);
        let body = serde_json::json!({ "status": status.board_name() });
        let response = self.authed(self.http.patch(&url).json(&body)).send().await.map_err(map_request_error)?;
        check_status(response).await?;
        Ok(())
    }
}

fn map_request_error(err: reqwest::Error) -> PipelineError {
    PipelineError::Transient(format!("board request failed: {}", redact_secrets(&err.to_string())))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PipelineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let redacted = redact_secrets(&body);
    warn!(%status, body = %redacted, "board API returned an error");

    if status == StatusCode::TOO_MANY_REQUESTS {
        Err(PipelineError::RateLimited(format!("board rate limited: {redacted}")))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(PipelineError::AuthFailed(format!("board authentication failed: {redacted}")))
    } else {
        Err(PipelineError::Transient(format!("board returned {status}: {redacted}")))
    }
}
