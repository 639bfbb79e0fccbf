// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Orchestrator
//!
//! Drives one claimed [`Task`] through its current stage (§4.6): plans the
//! outstanding sub-items, runs each through the Stage Driver under
//! Concurrency Governor admission, folds the results back into the Task
//! Aggregate's Resume Ledger, and persists the outcome. Every method is
//! built so a crash mid-stage leaves the Ledger at the last
//! sub-item-granularity checkpoint a future claim can resume from.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use channel_pipeline_domain::aggregates::TaskAggregate;
use channel_pipeline_domain::entities::{Channel, Task};
use channel_pipeline_domain::repositories::{ChannelRepository, TaskRepository};
use channel_pipeline_domain::services::{BackoffPolicy, StageCostPolicy, StageTimeoutPolicy};
use channel_pipeline_domain::value_objects::StageKind;
use channel_pipeline_domain::PipelineError;
use channel_pipeline_bootstrap::shutdown::CancellationToken;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::asset_publisher::AssetPublisher;
use super::stage_plan::{self, SubItemId};
use crate::infrastructure::board::OutboundHandle;
use crate::infrastructure::config::GeneratorBinaries;
use crate::infrastructure::filesystem::{StageDirectory, WorkspaceLayout};
use crate::infrastructure::governor::Governor;
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::stage_driver::{StageDriver, StageFailure, StageInvocation};

/// Period to wait before re-checking Governor admission for a sub-item
/// that was skipped because its concurrency class was momentarily at cap.
const ADMISSION_RETRY_INTERVAL: Duration = Duration::from_millis(200);

pub struct Orchestrator {
    task_repo: Arc<dyn TaskRepository>,
    channel_repo: Arc<dyn ChannelRepository>,
    governor: Arc<RwLock<Governor>>,
    outbound: OutboundHandle,
    metrics: Arc<MetricsService>,
    layout: WorkspaceLayout,
    generators: GeneratorBinaries,
    asset_publisher: Arc<dyn AssetPublisher>,
    timeout_policy: StageTimeoutPolicy,
    cost_policy: StageCostPolicy,
    backoff_policy: BackoffPolicy,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        channel_repo: Arc<dyn ChannelRepository>,
        governor: Arc<RwLock<Governor>>,
        outbound: OutboundHandle,
        metrics: Arc<MetricsService>,
        layout: WorkspaceLayout,
        generators: GeneratorBinaries,
        asset_publisher: Arc<dyn AssetPublisher>,
    ) -> Self {
        Self {
            task_repo,
            channel_repo,
            governor,
            outbound,
            metrics,
            layout,
            generators,
            asset_publisher,
            timeout_policy: StageTimeoutPolicy::default(),
            cost_policy: StageCostPolicy::default(),
            backoff_policy: BackoffPolicy::default(),
        }
    }

    fn project_id(task: &Task) -> String {
        task.id.to_string()
    }

    /// Entry point called by the worker claim loop (§4.8) for a Task the
    /// Fair Scheduler just claimed. Determines the stage due to run from
    /// the Resume Ledger and drives it to completion, a review gate, a
    /// retry park, or an error state.
    #[instrument(skip(self, task, channel, shutdown), fields(task_id = %task.id))]
    pub async fn run_claimed_task(&self, task: Task, channel: &Channel, shutdown: &CancellationToken) -> Result<(), PipelineError> {
        let now = Utc::now();
        let stage = task.ledger.next_incomplete_stage().unwrap_or(StageKind::Assembly);
        let mut aggregate = TaskAggregate::new(task);
        aggregate.begin_stage(stage, now)?;
        self.persist(&aggregate).await?;

        let result = if stage == StageKind::Assembly {
            self.run_assembly(&mut aggregate, channel, shutdown).await
        } else {
            self.run_subitem_stage(stage, &mut aggregate, channel, shutdown).await
        };

        // The Ledger's partial progress is saved regardless of outcome so a
        // later resume picks up only the sub-items still outstanding.
        self.persist(&aggregate).await?;

        match result {
            Ok(StageOutcome::Completed { duration_secs, successful_units }) => {
                aggregate.complete_stage(stage, duration_secs, Utc::now())?;
                self.persist(&aggregate).await?;
                self.record_cost(aggregate.task(), stage, successful_units).await;
                info!(%stage, duration_secs, "stage completed");
                Ok(())
            }
            Ok(StageOutcome::Empty) => {
                aggregate.complete_stage(stage, 0.0, Utc::now())?;
                self.persist(&aggregate).await?;
                Ok(())
            }
            Err(StageFault::Transient(reason)) => {
                let now = Utc::now();
                let next_attempt = aggregate.task().attempt_count + 1;
                if self.backoff_policy.has_attempts_remaining(next_attempt) {
                    let retry_after = now + self.backoff_policy.delay_for_attempt(next_attempt);
                    aggregate.fail_transient(stage, &reason, retry_after, now)?;
                    self.persist(&aggregate).await?;
                    warn!(%stage, reason, "stage failed transiently, parked for retry");
                } else {
                    aggregate.fail_permanent(stage, &format!("attempt cap exhausted after repeated transient failures: {reason}"), now)?;
                    self.persist(&aggregate).await?;
                    warn!(%stage, reason, attempts = next_attempt, "stage exhausted its transient-retry attempt cap, failing permanently");
                }
                Ok(())
            }
            Err(StageFault::Permanent(reason)) => {
                aggregate.fail_permanent(stage, &reason, Utc::now())?;
                self.persist(&aggregate).await?;
                warn!(%stage, reason, "stage failed permanently");
                Ok(())
            }
        }
    }

    /// Runs the Approved -> Uploading -> Published/UploadError handoff for
    /// a Task that has cleared every review gate. Not part of the Fair
    /// Scheduler's claim path (§4.5 only admits Queued/Retry); the worker
    /// loop sweeps `Approved` Tasks separately (§4.8).
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn run_upload(&self, task: Task) -> Result<(), PipelineError> {
        let now = Utc::now();
        let mut aggregate = TaskAggregate::new(task);
        aggregate.begin_upload(now)?;
        self.persist(&aggregate).await?;

        let project_id = Self::project_id(aggregate.task());
        let output_path = self.layout.final_output_path(aggregate.task().channel_id.as_str(), &project_id)?;
        let verified = WorkspaceLayout::output_verified(&output_path).await;

        if verified {
            let duration = aggregate.task().ledger.assembly.duration_secs.unwrap_or(0.0);
            aggregate.publish(output_path.display().to_string(), duration, Utc::now())?;
            info!("task published");
        } else {
            aggregate.fail_upload("final output missing or empty at upload time", Utc::now())?;
            warn!("upload failed: final output missing or empty");
        }
        self.persist(&aggregate).await
    }

    async fn persist(&self, aggregate: &TaskAggregate) -> Result<(), PipelineError> {
        self.task_repo.save(aggregate.task()).await?;
        self.outbound.enqueue(aggregate.task().id, aggregate.task().status);
        Ok(())
    }

    async fn record_cost(&self, task: &Task, stage: StageKind, units: u32) {
        if units == 0 {
            return;
        }
        let channel_override = self.channel_repo.find_by_id(&task.channel_id).await.ok().flatten().and_then(|c| c.config.stage_cost_overrides_usd.get(&stage).copied());
        let unit_cost = self.cost_policy.unit_cost_for(stage, channel_override);
        let amount = unit_cost * units as f64;
        if let Err(e) = self.task_repo.record_cost(task.id, stage, amount, units).await {
            warn!(error = %e, "failed to record stage cost");
        }
    }

    async fn acquire_permit(
        &self,
        class: channel_pipeline_domain::value_objects::stage_kind::ConcurrencyClass,
        shutdown: &CancellationToken,
    ) -> Option<crate::infrastructure::governor::GovernorPermit> {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }
            let permit = {
                let governor = self.governor.read().await;
                governor.try_admit(class)
            };
            if permit.is_some() {
                return permit;
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = tokio::time::sleep(ADMISSION_RETRY_INTERVAL) => {}
            }
        }
    }

    async fn run_subitem_stage(
        &self,
        stage: StageKind,
        aggregate: &mut TaskAggregate,
        channel: &Channel,
        shutdown: &CancellationToken,
    ) -> Result<StageOutcome, StageFault> {
        let outstanding = stage_plan::outstanding_sub_items(stage, aggregate.task(), channel);
        if outstanding.is_empty() {
            return Ok(StageOutcome::Empty);
        }

        let start = Instant::now();
        let futures = outstanding.iter().map(|&id| self.run_one_subitem(stage, id, aggregate.task(), channel, shutdown));
        let results = futures::future::join_all(futures).await;

        let mut fault: Option<StageFault> = None;
        let mut successful_units = 0u32;
        for (id, outcome) in outstanding.into_iter().zip(results) {
            match outcome {
                Ok(()) => {
                    match id {
                        SubItemId::Index(n) => aggregate.record_index_progress(stage, n),
                        SubItemId::Clip(n) => aggregate.record_clip_progress(stage, n),
                    }
                    successful_units += 1;
                    self.metrics.record_stage_attempt(stage.as_str(), "success");
                }
                Err(failure) => {
                    self.metrics.record_stage_attempt(stage.as_str(), failure.outcome_label());
                    if fault.is_none() {
                        fault = Some(classify_fault(failure));
                    }
                }
            }
        }

        match fault {
            Some(fault) => Err(fault),
            None => Ok(StageOutcome::Completed {
                duration_secs: start.elapsed().as_secs_f64(),
                successful_units,
            }),
        }
    }

    async fn run_one_subitem(
        &self,
        stage: StageKind,
        id: SubItemId,
        task: &Task,
        channel: &Channel,
        shutdown: &CancellationToken,
    ) -> Result<(), StageFailure> {
        let project_id = Self::project_id(task);
        let output_path = stage_plan::output_path_for(&self.layout, channel.id.as_str(), &project_id, stage, id)
            .map_err(|e| StageFailure::Transient(e.to_string()))?;

        let image_url = if stage == StageKind::Video {
            let composite_path = self
                .layout
                .stage_dir(channel.id.as_str(), &project_id, StageDirectory::Composites)
                .map_err(|e| StageFailure::Transient(e.to_string()))?
                .join(format!("{}.png", id.number()));
            Some(
                self.asset_publisher
                    .publish(&composite_path)
                    .await
                    .map_err(|e| StageFailure::Transient(e.to_string()))?,
            )
        } else {
            None
        };

        let invocation = stage_plan::plan_invocation(stage, id, task, output_path, &self.generators, image_url.as_deref());

        let class = stage.concurrency_class();
        let permit = self.acquire_permit(class, shutdown).await;
        if permit.is_none() {
            return Err(StageFailure::Transient("worker shutting down before admission".to_string()));
        }
        self.metrics.set_governor_active(class_label(class), 1);

        let timeout_override = channel.config.stage_timeout_overrides_secs.get(&stage).map(|s| Duration::from_secs(*s));
        let timeout = self.timeout_policy.timeout_for(stage, timeout_override);

        let result = StageDriver::invoke(StageInvocation {
            program: &invocation.program,
            args: invocation.args,
            output_path: invocation.output_path,
            timeout,
        })
        .await;

        drop(permit);
        result.map(|_success| ())
    }

    async fn run_assembly(&self, aggregate: &mut TaskAggregate, channel: &Channel, shutdown: &CancellationToken) -> Result<StageOutcome, StageFault> {
        let task = aggregate.task();
        let project_id = Self::project_id(task);
        let channel_id = channel.id.as_str();

        let narration_durations = self.probe_narration_durations(channel_id, &project_id, channel).await;

        let manifest = stage_plan::plan_assembly_manifest(&self.layout, channel_id, &project_id, channel, &narration_durations)
            .map_err(|e| StageFault::Permanent(e.to_string()))?;

        let project_root = self.layout.project_root(channel_id, &project_id).map_err(|e| StageFault::Permanent(e.to_string()))?;
        let manifest_path = project_root.join("assembly_manifest.json");
        crate::infrastructure::stage_driver::write_assembly_manifest(&manifest_path, &manifest)
            .await
            .map_err(|e| StageFault::Transient(e.to_string()))?;

        let output_path = self.layout.final_output_path(channel_id, &project_id).map_err(|e| StageFault::Permanent(e.to_string()))?;

        let permit = self.acquire_permit(StageKind::Assembly.concurrency_class(), shutdown).await;
        if permit.is_none() {
            return Err(StageFault::Transient("worker shutting down before admission".to_string()));
        }

        let timeout_override = channel.config.stage_timeout_overrides_secs.get(&StageKind::Assembly).map(|s| Duration::from_secs(*s));
        let timeout = self.timeout_policy.timeout_for(StageKind::Assembly, timeout_override);

        let args = vec![
            "--manifest".to_string(),
            manifest_path.display().to_string(),
            "--output".to_string(),
            output_path.display().to_string(),
        ];

        let start = Instant::now();
        let result = StageDriver::invoke(StageInvocation {
            program: &self.generators.assembly,
            args,
            output_path,
            timeout,
        })
        .await;
        drop(permit);

        match result {
            Ok(_) => {
                self.metrics.record_stage_attempt(StageKind::Assembly.as_str(), "success");
                Ok(StageOutcome::Completed {
                    duration_secs: start.elapsed().as_secs_f64(),
                    successful_units: 1,
                })
            }
            Err(failure) => {
                self.metrics.record_stage_attempt(StageKind::Assembly.as_str(), failure.outcome_label());
                Err(classify_fault(failure))
            }
        }
    }

    /// Reads each narration clip's duration via `ffprobe` so the assembly
    /// manifest can carry accurate per-clip timing (§6.1). A clip whose
    /// narration audio is unreadable contributes `0.0` rather than
    /// aborting the whole manifest — the assembly generator is expected to
    /// fall back to the video clip's own length in that case.
    async fn probe_narration_durations(&self, channel_id: &str, project_id: &str, channel: &Channel) -> BTreeMap<u32, f64> {
        let mut durations = BTreeMap::new();
        let Ok(audio_dir) = self.layout.stage_dir(channel_id, project_id, StageDirectory::Audio) else {
            return durations;
        };
        for clip_number in 0..channel.config.shots_per_video {
            let path = audio_dir.join(format!("{clip_number}.mp3"));
            if let Some(secs) = probe_duration_secs(&path).await {
                durations.insert(clip_number, secs);
            }
        }
        durations
    }
}

async fn probe_duration_secs(path: &PathBuf) -> Option<f64> {
    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).trim().parse::<f64>().ok()
}

fn class_label(class: channel_pipeline_domain::value_objects::stage_kind::ConcurrencyClass) -> &'static str {
    use channel_pipeline_domain::value_objects::stage_kind::ConcurrencyClass;
    match class {
        ConcurrencyClass::Asset => "asset",
        ConcurrencyClass::Video => "video",
        ConcurrencyClass::Audio => "audio",
        ConcurrencyClass::Assembly => "assembly",
    }
}

fn classify_fault(failure: StageFailure) -> StageFault {
    match &failure {
        StageFailure::Timeout | StageFailure::RateLimited(_) | StageFailure::QuotaExhausted(_) | StageFailure::Transient(_) => {
            StageFault::Transient(failure.into_pipeline_error().to_string())
        }
        StageFailure::AuthFailed(_) | StageFailure::BadInput(_) => StageFault::Permanent(failure.into_pipeline_error().to_string()),
    }
}

enum StageOutcome {
    Completed { duration_secs: f64, successful_units: u32 },
    Empty,
}

enum StageFault {
    Transient(String),
    Permanent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_classification_matches_transient_and_permanent_buckets() {
        assert!(matches!(classify_fault(StageFailure::Timeout), StageFault::Transient(_)));
        assert!(matches!(classify_fault(StageFailure::RateLimited("x".into())), StageFault::Transient(_)));
        assert!(matches!(classify_fault(StageFailure::AuthFailed("x".into())), StageFault::Permanent(_)));
        assert!(matches!(classify_fault(StageFailure::BadInput("x".into())), StageFault::Permanent(_)));
    }
}
