// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Channel Repository
//!
//! Implements [`ChannelRepository`] against the `channels` table. Encrypted
//! credentials are stored one row's worth of ciphertext blobs deep, keyed
//! by provider, as a JSON object of base64 strings — the plaintext never
//! reaches this layer; [`crate::infrastructure::credentials::CredentialCipher`]
//! handles encryption before a blob is handed to `store_encrypted_credential`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use channel_pipeline_domain::entities::{Channel, ChannelConfig};
use channel_pipeline_domain::value_objects::{ChannelId, Priority};
use channel_pipeline_domain::{ChannelRepository, PipelineError};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::schema::database_err;

pub struct SqliteChannelRepository {
    pool: SqlitePool,
}

impl SqliteChannelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn priority_from_db(raw: &str) -> Result<Priority, PipelineError> {
    Priority::parse(raw).ok_or_else(|| PipelineError::DatabaseError(format!("unreadable priority '{raw}'")))
}

fn encode_credentials(credentials: &BTreeMap<String, Vec<u8>>) -> Result<String, PipelineError> {
    let encoded: BTreeMap<&String, String> = credentials.iter().map(|(k, v)| (k, BASE64.encode(v))).collect();
    Ok(serde_json::to_string(&encoded)?)
}

fn decode_credentials(raw: &str) -> Result<BTreeMap<String, Vec<u8>>, PipelineError> {
    let encoded: BTreeMap<String, String> =
        serde_json::from_str(raw).map_err(|e| PipelineError::DatabaseError(format!("unreadable credentials: {e}")))?;
    encoded
        .into_iter()
        .map(|(k, v)| {
            BASE64
                .decode(v)
                .map(|bytes| (k, bytes))
                .map_err(|e| PipelineError::DatabaseError(format!("unreadable credential ciphertext: {e}")))
        })
        .collect()
}

fn row_to_channel(row: &sqlx::sqlite::SqliteRow) -> Result<Channel, PipelineError> {
    let id: String = row.try_get("id").map_err(database_err)?;
    let priority_raw: String = row.try_get("priority").map_err(database_err)?;
    let config_raw: String = row.try_get("config_json").map_err(database_err)?;
    let credentials_raw: String = row.try_get("encrypted_credentials_json").map_err(database_err)?;

    let config: ChannelConfig =
        serde_json::from_str(&config_raw).map_err(|e| PipelineError::DatabaseError(format!("unreadable channel config: {e}")))?;

    Ok(Channel {
        id: ChannelId::parse(id)?,
        display_name: row.try_get("display_name").map_err(database_err)?,
        active: row.try_get::<i64, _>("active").map_err(database_err)? != 0,
        priority: priority_from_db(&priority_raw)?,
        config,
        encrypted_credentials: decode_credentials(&credentials_raw)?,
        last_claimed_at: row.try_get("last_claimed_at").map_err(database_err)?,
        created_at: row.try_get("created_at").map_err(database_err)?,
    })
}

const SELECT_CHANNEL_COLUMNS: &str =
    "id, display_name, active, priority, config_json, encrypted_credentials_json, last_claimed_at, created_at";

#[async_trait]
impl ChannelRepository for SqliteChannelRepository {
    async fn find_by_id(&self, id: &ChannelId) -> Result<Option<Channel>, PipelineError> {
        let query = format!("SELECT {SELECT_CHANNEL_COLUMNS} FROM channels WHERE id = ?");
        let row = sqlx::query(&query).bind(id.as_str()).fetch_optional(&self.pool).await.map_err(database_err)?;
        row.as_ref().map(row_to_channel).transpose()
    }

    async fn list_active(&self) -> Result<Vec<Channel>, PipelineError> {
        let query = format!("SELECT {SELECT_CHANNEL_COLUMNS} FROM channels WHERE active = 1 ORDER BY id ASC");
        let rows = sqlx::query(&query).fetch_all(&self.pool).await.map_err(database_err)?;
        rows.iter().map(row_to_channel).collect()
    }

    async fn mark_claimed(&self, id: &ChannelId, at: DateTime<Utc>) -> Result<(), PipelineError> {
        sqlx::query("UPDATE channels SET last_claimed_at = ? WHERE id = ?")
            .bind(at)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(database_err)?;
        Ok(())
    }

    async fn store_encrypted_credential(&self, id: &ChannelId, provider: &str, ciphertext: Vec<u8>) -> Result<(), PipelineError> {
        let channel = self.find_by_id(id).await?.ok_or_else(|| PipelineError::ChannelNotFound(id.to_string()))?;
        let mut credentials = channel.encrypted_credentials;
        credentials.insert(provider.to_string(), ciphertext);
        let encoded = encode_credentials(&credentials)?;

        sqlx::query("UPDATE channels SET encrypted_credentials_json = ? WHERE id = ?")
            .bind(encoded)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(database_err)?;
        Ok(())
    }

    async fn encrypted_credential(&self, id: &ChannelId, provider: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        let channel = self.find_by_id(id).await?.ok_or_else(|| PipelineError::ChannelNotFound(id.to_string()))?;
        Ok(channel.encrypted_credentials.get(provider).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::schema::initialize_database;
    use tempfile::NamedTempFile;

    async fn test_repo() -> (SqliteChannelRepository, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite://{}", temp.path().to_str().unwrap());
        let pool = initialize_database(&db_url).await.unwrap();
        (SqliteChannelRepository::new(pool), temp)
    }

    async fn insert_channel(repo: &SqliteChannelRepository, id: &str, active: bool) {
        sqlx::query("INSERT INTO channels (id, display_name, active, priority, created_at) VALUES (?, ?, ?, 'normal', ?)")
            .bind(id)
            .bind(format!("Channel {id}"))
            .bind(active as i64)
            .bind(Utc::now())
            .execute(&repo.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_active_excludes_inactive_channels() {
        let (repo, _temp) = test_repo().await;
        insert_channel(&repo, "active-1", true).await;
        insert_channel(&repo, "inactive-1", false).await;

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id.as_str(), "active-1");
    }

    #[tokio::test]
    async fn mark_claimed_updates_timestamp() {
        let (repo, _temp) = test_repo().await;
        insert_channel(&repo, "c1", true).await;
        let id = ChannelId::parse("c1").unwrap();

        assert!(repo.find_by_id(&id).await.unwrap().unwrap().last_claimed_at.is_none());

        let now = Utc::now();
        repo.mark_claimed(&id, now).await.unwrap();
        let channel = repo.find_by_id(&id).await.unwrap().unwrap();
        assert!(channel.last_claimed_at.is_some());
    }

    #[tokio::test]
    async fn stores_and_retrieves_encrypted_credential_roundtrip() {
        let (repo, _temp) = test_repo().await;
        insert_channel(&repo, "c1", true).await;
        let id = ChannelId::parse("c1").unwrap();

        let ciphertext = vec![1, 2, 3, 4, 5];
        repo.store_encrypted_credential(&id, "tts", ciphertext.clone()).await.unwrap();

        let retrieved = repo.encrypted_credential(&id, "tts").await.unwrap();
        assert_eq!(retrieved, Some(ciphertext));
        assert_eq!(repo.encrypted_credential(&id, "image_gen").await.unwrap(), None);
    }
}
