// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Claim Loop
//!
//! Ties the Fair Scheduler, the Concurrency Governor's admission filter,
//! and the Orchestrator together into the worker's main loop (§4.5, §4.8):
//! compute which stage classes are saturated, ask the Task Store for the
//! next eligible Task under that filter, and hand whatever comes back to
//! the Orchestrator. An idle tick (no claimable Task) also sweeps
//! `Approved` Tasks through the upload handoff, since that path isn't
//! reachable through `claim_next_task` at all (§4.5 only admits
//! Queued/Retry).

use std::sync::Arc;
use std::time::Duration;

use channel_pipeline_domain::repositories::{ClaimFilter, TaskRepository};
use channel_pipeline_domain::value_objects::{StageKind, TaskStatus};
use channel_pipeline_domain::PipelineError;
use channel_pipeline_bootstrap::shutdown::CancellationToken;
use tracing::{debug, error, warn};

use super::orchestrator::Orchestrator;
use crate::infrastructure::governor::Governor;
use crate::infrastructure::metrics::MetricsService;

use channel_pipeline_domain::repositories::ChannelRepository;
use tokio::sync::RwLock;

/// Poll interval used when the Task Store reports no claimable Task —
/// deliberately short since the claim query itself is cheap and the
/// worker should notice newly-queued work quickly.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct WorkerLoop {
    task_repo: Arc<dyn TaskRepository>,
    channel_repo: Arc<dyn ChannelRepository>,
    governor: Arc<RwLock<Governor>>,
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<MetricsService>,
}

impl WorkerLoop {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        channel_repo: Arc<dyn ChannelRepository>,
        governor: Arc<RwLock<Governor>>,
        orchestrator: Arc<Orchestrator>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            task_repo,
            channel_repo,
            governor,
            orchestrator,
            metrics,
        }
    }

    /// Runs until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), PipelineError> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let filter = ClaimFilter {
                saturated_stage_classes: self.saturated_classes().await,
            };

            match self.task_repo.claim_next_task(&filter).await {
                Ok(Some(task)) => {
                    self.metrics.record_scheduler_claim("claimed");
                    self.run_one(task, &shutdown).await;
                }
                Ok(None) => {
                    self.metrics.record_scheduler_claim("idle");
                    self.sweep_uploads().await;
                    if self.wait_or_shutdown(&shutdown).await {
                        return Ok(());
                    }
                }
                Err(e) => {
                    error!(error = %e, "claim_next_task failed");
                    if self.wait_or_shutdown(&shutdown).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn run_one(&self, task: channel_pipeline_domain::entities::Task, shutdown: &CancellationToken) {
        let channel_id = task.channel_id.clone();
        let task_id = task.id;
        let channel = match self.channel_repo.find_by_id(&channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                warn!(%task_id, %channel_id, "claimed task references a channel that no longer exists, skipping");
                return;
            }
            Err(e) => {
                error!(%task_id, error = %e, "failed to load channel for claimed task");
                return;
            }
        };

        if let Err(e) = self.orchestrator.run_claimed_task(task, &channel, shutdown).await {
            error!(%task_id, error = %e, "orchestrator failed to run claimed task");
        }
    }

    async fn sweep_uploads(&self) {
        let approved = match self.task_repo.list_by_status(TaskStatus::Approved).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "failed to list Approved tasks for upload sweep");
                return;
            }
        };
        for task in approved {
            let task_id = task.id;
            if let Err(e) = self.orchestrator.run_upload(task).await {
                error!(%task_id, error = %e, "upload handoff failed");
            }
        }
    }

    /// Determines which concurrency classes have no free capacity right
    /// now, so `claim_next_task` can skip Tasks it would only have to put
    /// straight back (§4.5's admission filter). Assembly is never
    /// saturated — it has no configured cap.
    async fn saturated_classes(&self) -> Vec<StageKind> {
        let governor = self.governor.read().await;
        StageKind::ORDER
            .into_iter()
            .filter(|stage| {
                let class = stage.concurrency_class();
                if class == channel_pipeline_domain::value_objects::stage_kind::ConcurrencyClass::Assembly {
                    return false;
                }
                governor.try_admit(class).is_none()
            })
            .collect()
    }

    /// Waits out the idle poll interval, or returns `true` immediately if
    /// shutdown fires first.
    async fn wait_or_shutdown(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => true,
            _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {
                debug!("worker loop idle tick");
                false
            }
        }
    }
}
