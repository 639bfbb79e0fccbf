// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Liveness and Stale-Claim Reclaim
//!
//! `tasks` carries no worker/owner column (§3), so there is nothing to
//! directly check a claimed Task's owner against. Liveness is tracked
//! fleet-wide instead, in `worker_heartbeats`: each worker periodically
//! upserts its own row, and a claimed or in-flight Task is only eligible
//! for reclaim once *every* row in `worker_heartbeats` is older than the
//! configured timeout — i.e. no worker in the fleet is still alive to be
//! holding it. This is conservative by design: a single live worker
//! anywhere blocks reclaim of everyone's claims, which is safe (no
//! double-claim) at the cost of a slower recovery when only one worker of
//! many has actually died. §4.8 describes the effect ("dead workers'
//! claims are released after a timeout") without mandating the mechanism.

use channel_pipeline_domain::value_objects::TaskStatus;
use channel_pipeline_domain::PipelineError;
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::persistence::schema::database_err;

/// Periodically upserts this worker's liveness row.
pub struct HeartbeatWriter {
    pool: SqlitePool,
    worker_id: String,
    interval: Duration,
}

impl HeartbeatWriter {
    pub fn new(pool: SqlitePool, worker_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            pool,
            worker_id: worker_id.into(),
            interval,
        }
    }

    async fn write_once(&self) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO worker_heartbeats (worker_id, last_heartbeat_at) VALUES (?, ?) \
             ON CONFLICT(worker_id) DO UPDATE SET last_heartbeat_at = excluded.last_heartbeat_at",
        )
        .bind(&self.worker_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(database_err)?;
        Ok(())
    }

    /// Runs until `shutdown` fires, writing a heartbeat row on `interval`.
    pub async fn run(&self, shutdown: channel_pipeline_bootstrap::shutdown::CancellationToken) {
        loop {
            if let Err(e) = self.write_once().await {
                warn!(worker_id = %self.worker_id, error = %e, "failed to write heartbeat");
            }
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

/// Transitions every `Claimed`/`Generating(*)` Task whose `updated_at` is
/// older than `timeout` back to `Queued`, provided no row in
/// `worker_heartbeats` has been refreshed within `timeout`. Returns the
/// number of Tasks reclaimed.
pub async fn reclaim_stale_claims(pool: &SqlitePool, timeout: Duration) -> Result<u64, PipelineError> {
    let cutoff = Utc::now() - chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::seconds(90));

    let live_workers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM worker_heartbeats WHERE last_heartbeat_at > ?")
        .bind(cutoff)
        .fetch_one(pool)
        .await
        .map_err(database_err)?;

    if live_workers > 0 {
        debug!(live_workers, "at least one worker heartbeat is still fresh, skipping reclaim");
        return Ok(0);
    }

    let claimed_name = serde_json::to_string(&TaskStatus::Claimed).expect("TaskStatus serialization is infallible");
    let queued_name = serde_json::to_string(&TaskStatus::Queued).expect("TaskStatus serialization is infallible");
    // `Generating(StageKind)` is a newtype-style tuple variant, so serde's
    // default external tagging serializes it as `{"Generating":"Assets"}`;
    // matching any stage only needs the tag prefix.
    let generating_prefix = "{\"Generating\":%";

    let result = sqlx::query(
        "UPDATE tasks SET status = ?, updated_at = ? \
         WHERE updated_at <= ? AND (status = ? OR status LIKE ?)",
    )
    .bind(&queued_name)
    .bind(Utc::now())
    .bind(cutoff)
    .bind(&claimed_name)
    .bind(generating_prefix)
    .execute(pool)
    .await
    .map_err(database_err)?;

    let reclaimed = result.rows_affected();
    if reclaimed > 0 {
        info!(reclaimed, "reclaimed stale Task claims with no live worker heartbeat");
    }
    Ok(reclaimed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::schema::initialize_database;
    use channel_pipeline_domain::repositories::{ContentInputs, TaskRepository};
    use channel_pipeline_domain::value_objects::{BoardPageId, ChannelId, Priority};
    use tempfile::NamedTempFile;

    async fn test_pool() -> (SqlitePool, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite://{}", temp.path().to_str().unwrap());
        let pool = initialize_database(&db_url).await.unwrap();
        sqlx::query("INSERT INTO channels (id, display_name, active, priority, created_at) VALUES ('c1', 'T', 1, 'normal', ?)")
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();
        (pool, temp)
    }

    #[tokio::test]
    async fn heartbeat_writer_upserts_idempotently() {
        let (pool, _temp) = test_pool().await;
        let writer = HeartbeatWriter::new(pool.clone(), "worker-1", Duration::from_secs(1));
        writer.write_once().await.unwrap();
        writer.write_once().await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM worker_heartbeats").fetch_one(&pool).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn reclaim_skips_while_a_worker_heartbeat_is_fresh() {
        let (pool, _temp) = test_pool().await;
        let repo = crate::infrastructure::persistence::SqliteTaskRepository::new(pool.clone());
        let inputs = ContentInputs {
            title: "T".into(),
            topic: "Topic".into(),
            narrative_direction: "Dir".into(),
        };
        repo.upsert_task_from_board(BoardPageId::new("p1"), ChannelId::parse("c1").unwrap(), inputs, Priority::Normal)
            .await
            .unwrap();
        repo.claim_next_task(&Default::default()).await.unwrap();

        let writer = HeartbeatWriter::new(pool.clone(), "worker-1", Duration::from_secs(1));
        writer.write_once().await.unwrap();

        let reclaimed = reclaim_stale_claims(&pool, Duration::from_secs(90)).await.unwrap();
        assert_eq!(reclaimed, 0);
    }

    #[tokio::test]
    async fn reclaim_requeues_stale_claim_with_no_live_heartbeat() {
        let (pool, _temp) = test_pool().await;
        let repo = crate::infrastructure::persistence::SqliteTaskRepository::new(pool.clone());
        let inputs = ContentInputs {
            title: "T".into(),
            topic: "Topic".into(),
            narrative_direction: "Dir".into(),
        };
        repo.upsert_task_from_board(BoardPageId::new("p1"), ChannelId::parse("c1").unwrap(), inputs, Priority::Normal)
            .await
            .unwrap();
        let claimed = repo.claim_next_task(&Default::default()).await.unwrap().unwrap();

        let stale_at = Utc::now() - chrono::Duration::hours(2);
        sqlx::query("UPDATE tasks SET updated_at = ? WHERE id = ?")
            .bind(stale_at)
            .bind(claimed.id.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let reclaimed = reclaim_stale_claims(&pool, Duration::from_secs(90)).await.unwrap();
        assert_eq!(reclaimed, 1);

        let reloaded = repo.find_by_id(claimed.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Queued);
    }
}
