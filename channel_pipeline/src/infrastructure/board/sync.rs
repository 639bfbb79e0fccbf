// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Board Synchronizer
//!
//! Two independent loops (§4.7), both owned by the worker runtime:
//!
//! - **Outbound**: the Orchestrator enqueues a status write whenever a
//!   Task crosses a board-visible status; this loop debounces rapid
//!   repeats of the same Task to its latest status and pushes one API
//!   call per Task per debounce window, through the shared rate limiter.
//! - **Inbound**: polls every configured board database id on an
//!   interval, translates each page's status, and applies new-page
//!   upserts, gate approvals, and gate rejections against the Task
//!   Store. The Task Store's conditional `transition` arbitrates any race
//!   with the Orchestrator's own writes (§4.7: "a lost race results in a
//!   no-op with a debug log line").

use std::collections::HashMap;
use std::sync::Arc;

use channel_pipeline_domain::aggregates::TaskAggregate;
use channel_pipeline_domain::repositories::{ChannelRepository, TaskRepository};
use channel_pipeline_domain::services::parse_rejection_feedback;
use channel_pipeline_domain::value_objects::{BoardPageId, ChannelId, TaskId, TaskStatus};
use channel_pipeline_bootstrap::shutdown::CancellationToken;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, instrument, warn};

use super::client::BoardClient;
use super::status_mapping::{classify_inbound, InboundAction};
use crate::infrastructure::config::BoardSyncConfig;
use crate::infrastructure::metrics::MetricsService;

/// Handle the rest of the worker uses to queue an outbound status push
/// without blocking on the rate limiter itself.
#[derive(Clone)]
pub struct OutboundHandle {
    tx: mpsc::UnboundedSender<(TaskId, TaskStatus)>,
}

impl OutboundHandle {
    pub fn enqueue(&self, task_id: TaskId, status: TaskStatus) {
        // The receiver only goes away at shutdown, by which point no one
        // should be enqueueing; a failed send is silently dropped rather
        // than propagated, matching §4.7's "persistent failure ...
        // eventually gives up without blocking the pipeline".
        let _ = self.tx.send((task_id, status));
    }
}

pub struct BoardSynchronizer {
    client: Arc<BoardClient>,
    task_repo: Arc<dyn TaskRepository>,
    channel_repo: Arc<dyn ChannelRepository>,
    metrics: Arc<MetricsService>,
}

impl BoardSynchronizer {
    pub fn new(
        client: Arc<BoardClient>,
        task_repo: Arc<dyn TaskRepository>,
        channel_repo: Arc<dyn ChannelRepository>,
        metrics: Arc<MetricsService>,
    ) -> (Self, OutboundHandle, mpsc::UnboundedReceiver<(TaskId, TaskStatus)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                task_repo,
                channel_repo,
                metrics,
            },
            OutboundHandle { tx },
            rx,
        )
    }

    /// Drains queued status writes until `shutdown` fires, collapsing
    /// same-Task repeats arriving in the same batch to the latest value.
    pub async fn run_outbound(&self, mut rx: mpsc::UnboundedReceiver<(TaskId, TaskStatus)>, shutdown: CancellationToken) {
        loop {
            let first = tokio::select! {
                _ = shutdown.cancelled() => return,
                maybe = rx.recv() => maybe,
            };
            let Some((task_id, status)) = first else { return };

            let mut latest: HashMap<TaskId, TaskStatus> = HashMap::new();
            latest.insert(task_id, status);
            while let Ok((id, st)) = rx.try_recv() {
                latest.insert(id, st);
            }

            for (id, st) in latest {
                self.push_one(id, st).await;
            }
        }
    }

    #[instrument(skip(self))]
    async fn push_one(&self, task_id: TaskId, status: TaskStatus) {
        match self.client.push_status(&task_id.to_string(), status).await {
            Ok(()) => self.metrics.record_board_request("success"),
            Err(e) if e.is_transient() => {
                warn!(%task_id, error = %e, "outbound board push failed, will not be retried this cycle");
                self.metrics.record_board_request("transient_failure");
            }
            Err(e) => {
                warn!(%task_id, error = %e, "outbound board push failed permanently");
                self.metrics.record_board_request("error");
            }
        }
    }

    /// Polls every configured database id on `config_rx`'s current
    /// interval until `shutdown` fires. `config_rx` is re-read on every
    /// tick, so a SIGHUP-driven reload (§4.8) takes effect without
    /// restarting the loop.
    pub async fn run_inbound(&self, config_rx: watch::Receiver<BoardSyncConfig>, shutdown: CancellationToken) {
        loop {
            let config = config_rx.borrow().clone();
            if !config.inbound_enabled() {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(config.clamped_interval()) => continue,
                }
            }

            let start = std::time::Instant::now();
            for database_id in &config.database_ids {
                if let Err(e) = self.poll_database(database_id).await {
                    warn!(database_id, error = %e, "inbound board poll failed");
                }
            }
            self.metrics.record_inbound_poll_duration(start.elapsed().as_secs_f64());

            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(config.clamped_interval()) => {}
            }
        }
    }

    async fn poll_database(&self, database_id: &str) -> Result<(), channel_pipeline_domain::PipelineError> {
        let pages = self.client.list_pages(database_id).await?;
        for page in pages {
            let Some(status) = page.parsed_status() else {
                debug!(page_id = %page.page_id, status = %page.status, "unrecognized board status, skipping");
                continue;
            };
            if let Err(e) = self.apply_inbound_page(&page, status).await {
                warn!(page_id = %page.page_id, error = %e, "failed to apply inbound board page");
            }
        }
        Ok(())
    }

    async fn apply_inbound_page(
        &self,
        page: &super::status_mapping::BoardPage,
        status: TaskStatus,
    ) -> Result<(), channel_pipeline_domain::PipelineError> {
        let now = Utc::now();
        match classify_inbound(status, page.feedback.as_deref()) {
            InboundAction::UpsertNew => {
                let channel_id = ChannelId::parse(page.channel_id.clone())?;
                self.task_repo
                    .upsert_task_from_board(BoardPageId::new(page.page_id.clone()), channel_id, page.content_inputs(), page.parsed_priority())
                    .await?;
            }
            InboundAction::Approval { .. } => {
                let Some(task) = self.task_repo.find_by_board_page_id(&BoardPageId::new(page.page_id.clone())).await? else {
                    return Ok(());
                };
                let mut aggregate = TaskAggregate::new(task);
                match aggregate.approve(now) {
                    Ok(()) => {
                        self.task_repo.save(aggregate.task()).await?;
                        self.channel_repo.mark_claimed(&aggregate.task().channel_id, now).await.ok();
                    }
                    Err(e) => debug!(page_id = %page.page_id, error = %e, "approval raced with a concurrent transition, ignored"),
                }
            }
            InboundAction::Rejection { feedback, .. } => {
                let Some(task) = self.task_repo.find_by_board_page_id(&BoardPageId::new(page.page_id.clone())).await? else {
                    return Ok(());
                };
                let Some(parsed) = parse_rejection_feedback(&feedback) else {
                    let mut aggregate = TaskAggregate::new(task);
                    match aggregate.reject_unparsable(&feedback, now) {
                        Ok(()) => self.task_repo.save(aggregate.task()).await?,
                        Err(e) => debug!(page_id = %page.page_id, error = %e, "unparsable rejection raced with a concurrent transition, ignored"),
                    }
                    return Ok(());
                };
                let mut aggregate = TaskAggregate::new(task);
                match aggregate.reject(parsed.into_failed_audio_clip_numbers(), &feedback, now) {
                    Ok(()) => self.task_repo.save(aggregate.task()).await?,
                    Err(e) => debug!(page_id = %page.page_id, error = %e, "rejection raced with a concurrent transition, ignored"),
                }
            }
            InboundAction::Ignore => {}
        }
        Ok(())
    }
}
