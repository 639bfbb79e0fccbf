// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Task Repository
//!
//! Implements [`TaskRepository`] against the `tasks` / `cost_entries`
//! tables (§4.1). `claim_next_task` is the one method that needs more
//! than a single statement: SQLite has no `SELECT ... FOR UPDATE SKIP
//! LOCKED`, so a `BEGIN IMMEDIATE` transaction takes the writer lock up
//! front, the candidate list is walked in Rust to apply the Governor's
//! admission filter (§4.4, §4.5), and the first admissible candidate is
//! claimed with a conditional `UPDATE ... WHERE status = ?` before commit.

use async_trait::async_trait;
use channel_pipeline_domain::entities::{ResumeLedger, Task};
use channel_pipeline_domain::repositories::{ClaimFilter, ContentInputs, UpsertOutcome};
use channel_pipeline_domain::value_objects::{BoardPageId, ChannelId, Priority, StageKind, TaskId, TaskStatus};
use channel_pipeline_domain::{PipelineError, TaskRepository};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::schema::database_err;

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn status_to_db(status: TaskStatus) -> String {
    serde_json::to_string(&status).expect("TaskStatus serialization is infallible")
}

fn status_from_db(raw: &str) -> Result<TaskStatus, PipelineError> {
    serde_json::from_str(raw).map_err(|e| PipelineError::DatabaseError(format!("unreadable status '{raw}': {e}")))
}

fn priority_from_db(raw: &str) -> Result<Priority, PipelineError> {
    Priority::parse(raw).ok_or_else(|| PipelineError::DatabaseError(format!("unreadable priority '{raw}'")))
}

/// Next pipeline stage due to run for a candidate in `Queued` or `Retry`.
/// A fresh task starts at Assets; a task coming back from a transient
/// failure resumes wherever its Ledger left off (§4.8).
fn next_due_stage(status: TaskStatus, ledger: &ResumeLedger) -> Option<StageKind> {
    match status {
        TaskStatus::Queued => Some(StageKind::Assets),
        TaskStatus::Retry => ledger.next_incomplete_stage(),
        _ => None,
    }
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, PipelineError> {
    let id: String = row.try_get("id").map_err(database_err)?;
    let channel_id: String = row.try_get("channel_id").map_err(database_err)?;
    let board_page_id: String = row.try_get("board_page_id").map_err(database_err)?;
    let status_raw: String = row.try_get("status").map_err(database_err)?;
    let priority_raw: String = row.try_get("priority").map_err(database_err)?;
    let ledger_raw: String = row.try_get("ledger_json").map_err(database_err)?;

    Ok(Task {
        id: id.parse().map_err(|_| PipelineError::DatabaseError(format!("unreadable task id '{id}'")))?,
        channel_id: ChannelId::parse(channel_id)?,
        board_page_id: BoardPageId::new(board_page_id),
        title: row.try_get("title").map_err(database_err)?,
        topic: row.try_get("topic").map_err(database_err)?,
        narrative_direction: row.try_get("narrative_direction").map_err(database_err)?,
        priority: priority_from_db(&priority_raw)?,
        status: status_from_db(&status_raw)?,
        error_log: row.try_get("error_log").map_err(database_err)?,
        final_output_path: row.try_get("final_output_path").map_err(database_err)?,
        final_output_duration_secs: row.try_get("final_output_duration_secs").map_err(database_err)?,
        created_at: row.try_get("created_at").map_err(database_err)?,
        updated_at: row.try_get("updated_at").map_err(database_err)?,
        pipeline_start_time: row.try_get("pipeline_start_time").map_err(database_err)?,
        pipeline_end_time: row.try_get("pipeline_end_time").map_err(database_err)?,
        review_started_at: row.try_get("review_started_at").map_err(database_err)?,
        review_completed_at: row.try_get("review_completed_at").map_err(database_err)?,
        pipeline_cost_usd: row.try_get("pipeline_cost_usd").map_err(database_err)?,
        ledger: serde_json::from_str(&ledger_raw).map_err(|e| PipelineError::DatabaseError(format!("unreadable ledger: {e}")))?,
        retry_after: row.try_get("retry_after").map_err(database_err)?,
        attempt_count: row.try_get::<i64, _>("attempt_count").map_err(database_err)? as u32,
    })
}

const SELECT_TASK_COLUMNS: &str = "id, channel_id, board_page_id, title, topic, narrative_direction, priority, status, \
     error_log, final_output_path, final_output_duration_secs, created_at, updated_at, pipeline_start_time, \
     pipeline_end_time, review_started_at, review_completed_at, pipeline_cost_usd, ledger_json, retry_after, attempt_count";

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn upsert_task_from_board(
        &self,
        page_id: BoardPageId,
        channel_id: ChannelId,
        content: ContentInputs,
        priority: Priority,
    ) -> Result<UpsertOutcome, PipelineError> {
        if self.find_by_board_page_id(&page_id).await?.is_some() {
            return Ok(UpsertOutcome::Skipped);
        }

        let now = Utc::now();
        let task = Task::new_from_board(
            TaskId::new(),
            channel_id,
            page_id,
            content.title,
            content.topic,
            content.narrative_direction,
            priority,
            now,
        );

        let ledger_json = serde_json::to_string(&task.ledger)?;
        sqlx::query(
            "INSERT INTO tasks (id, channel_id, board_page_id, title, topic, narrative_direction, priority, status, \
             error_log, final_output_path, final_output_duration_secs, created_at, updated_at, pipeline_start_time, \
             pipeline_end_time, review_started_at, review_completed_at, pipeline_cost_usd, ledger_json, retry_after, \
             attempt_count) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(task.channel_id.as_str())
        .bind(task.board_page_id.as_str())
        .bind(&task.title)
        .bind(&task.topic)
        .bind(&task.narrative_direction)
        .bind(task.priority.as_str())
        .bind(status_to_db(task.status))
        .bind(&task.error_log)
        .bind(&task.final_output_path)
        .bind(task.final_output_duration_secs)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.pipeline_start_time)
        .bind(task.pipeline_end_time)
        .bind(task.review_started_at)
        .bind(task.review_completed_at)
        .bind(task.pipeline_cost_usd)
        .bind(ledger_json)
        .bind(task.retry_after)
        .bind(task.attempt_count as i64)
        .execute(&self.pool)
        .await
        .map_err(database_err)?;

        Ok(UpsertOutcome::Created(task.id))
    }

    async fn claim_next_task(&self, filter: &ClaimFilter) -> Result<Option<Task>, PipelineError> {
        let now = Utc::now();
        let mut conn = self.pool.acquire().await.map_err(database_err)?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await.map_err(database_err)?;

        let query = format!(
            "SELECT {SELECT_TASK_COLUMNS} FROM tasks \
             JOIN channels ON channels.id = tasks.channel_id \
             WHERE tasks.status IN (?, ?) \
               AND (tasks.retry_after IS NULL OR tasks.retry_after <= ?) \
               AND channels.active = 1 \
             ORDER BY CASE tasks.priority WHEN 'high' THEN 2 WHEN 'normal' THEN 1 ELSE 0 END DESC, \
                      channels.last_claimed_at ASC, tasks.created_at ASC"
        );
        let rows = sqlx::query(&query)
            .bind(status_to_db(TaskStatus::Queued))
            .bind(status_to_db(TaskStatus::Retry))
            .bind(now)
            .fetch_all(&mut *conn)
            .await
            .map_err(database_err)?;

        for row in &rows {
            let candidate = row_to_task(row)?;
            if let Some(stage) = next_due_stage(candidate.status, &candidate.ledger) {
                if filter.saturated_stage_classes.contains(&stage) {
                    continue;
                }
            }

            let result = sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(status_to_db(TaskStatus::Claimed))
                .bind(now)
                .bind(candidate.id.to_string())
                .bind(status_to_db(candidate.status))
                .execute(&mut *conn)
                .await
                .map_err(database_err)?;

            if result.rows_affected() == 1 {
                sqlx::query("UPDATE channels SET last_claimed_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(candidate.channel_id.as_str())
                    .execute(&mut *conn)
                    .await
                    .map_err(database_err)?;
                sqlx::query("COMMIT").execute(&mut *conn).await.map_err(database_err)?;

                let mut claimed = candidate;
                claimed.status = TaskStatus::Claimed;
                claimed.updated_at = now;
                return Ok(Some(claimed));
            }
        }

        sqlx::query("ROLLBACK").execute(&mut *conn).await.map_err(database_err)?;
        Ok(None)
    }

    async fn find_by_id(&self, task_id: TaskId) -> Result<Option<Task>, PipelineError> {
        let query = format!("SELECT {SELECT_TASK_COLUMNS} FROM tasks WHERE id = ?");
        let row = sqlx::query(&query).bind(task_id.to_string()).fetch_optional(&self.pool).await.map_err(database_err)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn find_by_board_page_id(&self, page_id: &BoardPageId) -> Result<Option<Task>, PipelineError> {
        let query = format!("SELECT {SELECT_TASK_COLUMNS} FROM tasks WHERE board_page_id = ?");
        let row = sqlx::query(&query).bind(page_id.as_str()).fetch_optional(&self.pool).await.map_err(database_err)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn transition(&self, task_id: TaskId, from_status: TaskStatus, to_status: TaskStatus) -> Result<(), PipelineError> {
        let now = Utc::now();
        let result = sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(status_to_db(to_status))
            .bind(now)
            .bind(task_id.to_string())
            .bind(status_to_db(from_status))
            .execute(&self.pool)
            .await
            .map_err(database_err)?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::invalid_transition(format!("{task_id}: {from_status} -> {to_status} (stale or missing row)")));
        }
        Ok(())
    }

    async fn save(&self, task: &Task) -> Result<(), PipelineError> {
        let ledger_json = serde_json::to_string(&task.ledger)?;
        sqlx::query(
            "UPDATE tasks SET channel_id = ?, board_page_id = ?, title = ?, topic = ?, narrative_direction = ?, \
             priority = ?, status = ?, error_log = ?, final_output_path = ?, final_output_duration_secs = ?, \
             updated_at = ?, pipeline_start_time = ?, pipeline_end_time = ?, review_started_at = ?, \
             review_completed_at = ?, pipeline_cost_usd = ?, ledger_json = ?, retry_after = ?, attempt_count = ? \
             WHERE id = ?",
        )
        .bind(task.channel_id.as_str())
        .bind(task.board_page_id.as_str())
        .bind(&task.title)
        .bind(&task.topic)
        .bind(&task.narrative_direction)
        .bind(task.priority.as_str())
        .bind(status_to_db(task.status))
        .bind(&task.error_log)
        .bind(&task.final_output_path)
        .bind(task.final_output_duration_secs)
        .bind(task.updated_at)
        .bind(task.pipeline_start_time)
        .bind(task.pipeline_end_time)
        .bind(task.review_started_at)
        .bind(task.review_completed_at)
        .bind(task.pipeline_cost_usd)
        .bind(ledger_json)
        .bind(task.retry_after)
        .bind(task.attempt_count as i64)
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(database_err)?;
        Ok(())
    }

    async fn append_error(&self, task_id: TaskId, text: &str) -> Result<(), PipelineError> {
        let now = Utc::now();
        let mut task = self
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| PipelineError::TaskNotFound(task_id.to_string()))?;
        task.append_error(text, now);

        sqlx::query("UPDATE tasks SET error_log = ?, updated_at = ? WHERE id = ?")
            .bind(&task.error_log)
            .bind(now)
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(database_err)?;
        Ok(())
    }

    async fn record_cost(&self, task_id: TaskId, stage: StageKind, amount_usd: f64, units: u32) -> Result<(), PipelineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(database_err)?;

        sqlx::query("INSERT INTO cost_entries (task_id, stage, amount_usd, units, recorded_at) VALUES (?, ?, ?, ?, ?)")
            .bind(task_id.to_string())
            .bind(stage.as_str())
            .bind(amount_usd)
            .bind(units as i64)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(database_err)?;

        sqlx::query("UPDATE tasks SET pipeline_cost_usd = pipeline_cost_usd + ?, updated_at = ? WHERE id = ?")
            .bind(amount_usd)
            .bind(now)
            .bind(task_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(database_err)?;

        tx.commit().await.map_err(database_err)?;
        Ok(())
    }

    async fn load_resume_ledger(&self, task_id: TaskId) -> Result<ResumeLedger, PipelineError> {
        let row = sqlx::query("SELECT ledger_json FROM tasks WHERE id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(database_err)?
            .ok_or_else(|| PipelineError::TaskNotFound(task_id.to_string()))?;
        let ledger_raw: String = row.try_get("ledger_json").map_err(database_err)?;
        serde_json::from_str(&ledger_raw).map_err(|e| PipelineError::DatabaseError(format!("unreadable ledger: {e}")))
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, PipelineError> {
        let query = format!("SELECT {SELECT_TASK_COLUMNS} FROM tasks WHERE status = ? ORDER BY created_at ASC");
        let rows = sqlx::query(&query).bind(status_to_db(status)).fetch_all(&self.pool).await.map_err(database_err)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn list_by_channel(&self, channel_id: &ChannelId) -> Result<Vec<Task>, PipelineError> {
        let query = format!("SELECT {SELECT_TASK_COLUMNS} FROM tasks WHERE channel_id = ? ORDER BY created_at ASC");
        let rows = sqlx::query(&query).bind(channel_id.as_str()).fetch_all(&self.pool).await.map_err(database_err)?;
        rows.iter().map(row_to_task).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::schema::initialize_database;
    use channel_pipeline_domain::value_objects::Priority;
    use tempfile::NamedTempFile;

    async fn test_repo() -> (SqliteTaskRepository, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite://{}", temp.path().to_str().unwrap());
        let pool = initialize_database(&db_url).await.unwrap();

        sqlx::query("INSERT INTO channels (id, display_name, active, priority, created_at) VALUES (?, 'Test', 1, 'normal', ?)")
            .bind("c1")
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();

        (SqliteTaskRepository::new(pool), temp)
    }

    fn inputs() -> ContentInputs {
        ContentInputs {
            title: "Title".to_string(),
            topic: "Topic".to_string(),
            narrative_direction: "Direction".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_page_id() {
        let (repo, _temp) = test_repo().await;
        let channel = ChannelId::parse("c1").unwrap();
        let page = BoardPageId::new("page-1");

        let first = repo.upsert_task_from_board(page.clone(), channel.clone(), inputs(), Priority::Normal).await.unwrap();
        assert!(matches!(first, UpsertOutcome::Created(_)));

        let second = repo.upsert_task_from_board(page, channel, inputs(), Priority::Normal).await.unwrap();
        assert_eq!(second, UpsertOutcome::Skipped);
    }

    #[tokio::test]
    async fn claim_next_task_respects_priority_order() {
        let (repo, _temp) = test_repo().await;
        let channel = ChannelId::parse("c1").unwrap();

        repo.upsert_task_from_board(BoardPageId::new("low"), channel.clone(), inputs(), Priority::Low).await.unwrap();
        repo.upsert_task_from_board(BoardPageId::new("high"), channel, inputs(), Priority::High).await.unwrap();

        let claimed = repo.claim_next_task(&ClaimFilter::default()).await.unwrap().unwrap();
        assert_eq!(claimed.board_page_id.as_str(), "high");
        assert_eq!(claimed.status, TaskStatus::Claimed);
    }

    #[tokio::test]
    async fn claim_next_task_skips_saturated_concurrency_class() {
        let (repo, _temp) = test_repo().await;
        let channel = ChannelId::parse("c1").unwrap();
        repo.upsert_task_from_board(BoardPageId::new("page-1"), channel, inputs(), Priority::Normal).await.unwrap();

        let filter = ClaimFilter {
            saturated_stage_classes: vec![StageKind::Assets],
        };
        let claimed = repo.claim_next_task(&filter).await.unwrap();
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn transition_fails_when_status_is_stale() {
        let (repo, _temp) = test_repo().await;
        let channel = ChannelId::parse("c1").unwrap();
        let outcome = repo.upsert_task_from_board(BoardPageId::new("page-1"), channel, inputs(), Priority::Normal).await.unwrap();
        let UpsertOutcome::Created(task_id) = outcome else { panic!("expected created") };

        let err = repo.transition(task_id, TaskStatus::Claimed, TaskStatus::Generating(StageKind::Assets)).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn record_cost_accumulates_on_the_task_row() {
        let (repo, _temp) = test_repo().await;
        let channel = ChannelId::parse("c1").unwrap();
        let outcome = repo.upsert_task_from_board(BoardPageId::new("page-1"), channel, inputs(), Priority::Normal).await.unwrap();
        let UpsertOutcome::Created(task_id) = outcome else { panic!("expected created") };

        repo.record_cost(task_id, StageKind::Assets, 0.50, 3).await.unwrap();
        repo.record_cost(task_id, StageKind::Video, 1.25, 1).await.unwrap();

        let task = repo.find_by_id(task_id).await.unwrap().unwrap();
        assert!((task.pipeline_cost_usd - 1.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn save_persists_ledger_mutations() {
        let (repo, _temp) = test_repo().await;
        let channel = ChannelId::parse("c1").unwrap();
        let outcome = repo.upsert_task_from_board(BoardPageId::new("page-1"), channel, inputs(), Priority::Normal).await.unwrap();
        let UpsertOutcome::Created(task_id) = outcome else { panic!("expected created") };

        let mut task = repo.find_by_id(task_id).await.unwrap().unwrap();
        task.ledger.assets.completed = true;
        task.ledger.assets.progress.completed_indices.insert(0);
        repo.save(&task).await.unwrap();

        let reloaded = repo.load_resume_ledger(task_id).await.unwrap();
        assert!(reloaded.assets.completed);
        assert!(reloaded.assets.progress.completed_indices.contains(&0));
    }
}
