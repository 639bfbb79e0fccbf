// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Schema Helpers
//!
//! Applies migrations on start-up so the worker and its integration tests
//! always see a consistent `tasks` / `channels` / `cost_entries` /
//! `worker_heartbeats` schema (§3, §4.1).

use channel_pipeline_domain::PipelineError;
use sqlx::migrate::MigrateDatabase;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Maps a raw `sqlx::Error` into the domain's error vocabulary. Lives here,
/// not in `channel_pipeline_domain`, since the domain crate deliberately
/// carries no sqlx dependency.
pub fn database_err(err: sqlx::Error) -> PipelineError {
    PipelineError::DatabaseError(err.to_string())
}

/// Runs pending migrations against the provided pool.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), PipelineError> {
    debug!("ensuring database schema is up to date");
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
    info!("database schema is up to date");
    Ok(())
}

/// Creates the SQLite database file if it doesn't already exist.
/// `SqlitePool::connect` fails outright against a missing file unless the
/// connect options opt into `create_if_missing`, so this runs first.
pub async fn create_database_if_missing(database_url: &str) -> Result<(), PipelineError> {
    if !sqlx::Sqlite::database_exists(database_url).await.map_err(database_err)? {
        debug!(database_url, "database does not exist, creating");
        sqlx::Sqlite::create_database(database_url).await.map_err(database_err)?;
        info!(database_url, "created new sqlite database");
    } else {
        debug!(database_url, "database already exists");
    }
    Ok(())
}

/// Creates (if missing), connects, and migrates in one call. The worker's
/// main entrypoint calls this once at start-up.
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, PipelineError> {
    create_database_if_missing(database_url).await?;
    let pool = SqlitePool::connect(database_url).await.map_err(database_err)?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn creates_database_file_idempotently() {
        let temp = NamedTempFile::new().unwrap();
        let db_path = temp.path().to_str().unwrap();
        let db_url = format!("sqlite://{db_path}");
        drop(temp);

        create_database_if_missing(&db_url).await.unwrap();
        create_database_if_missing(&db_url).await.unwrap();
    }

    #[tokio::test]
    async fn initialize_database_creates_tasks_table() {
        let temp = NamedTempFile::new().unwrap();
        let db_path = temp.path().to_str().unwrap();
        let db_url = format!("sqlite://{db_path}");
        drop(temp);

        let pool = initialize_database(&db_url).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='tasks'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1, "tasks table should exist after migration");
    }

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let temp = NamedTempFile::new().unwrap();
        let db_path = temp.path().to_str().unwrap();
        let db_url = format!("sqlite://{db_path}");
        drop(temp);

        create_database_if_missing(&db_url).await.unwrap();
        let pool = SqlitePool::connect(&db_url).await.unwrap();

        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();
    }
}
