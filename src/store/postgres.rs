use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{RefreshRecord, RefreshStore};
use crate::error::StoreError;

/// Refresh store backed by the `refresh_tokens` table
#[derive(Debug, Clone)]
pub struct PgRefreshStore {
    pool: PgPool,
}

impl PgRefreshStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: i64,
    user_id: i64,
    token: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<RefreshTokenRow> for RefreshRecord {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: row.id,
            subject_id: row.user_id,
            token: row.token,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl RefreshStore for PgRefreshStore {
    async fn get_latest(&self, subject_id: i64) -> Result<Option<RefreshRecord>, StoreError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, token, created_at, expires_at
            FROM refresh_tokens
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RefreshRecord::from))
    }

    async fn insert(
        &self,
        subject_id: i64,
        token: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(subject_id)
        .bind(token)
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_latest(
        &self,
        subject_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET token = $2, expires_at = $3
            WHERE id = (
                SELECT id FROM refresh_tokens
                WHERE user_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            )
            "#,
        )
        .bind(subject_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(subject_id = subject_id, "No refresh token to update");
        }
        Ok(())
    }

    async fn replace_latest_if(
        &self,
        subject_id: i64,
        expected_token: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET token = $3, expires_at = $4
            WHERE token = $2
              AND id = (
                SELECT id FROM refresh_tokens
                WHERE user_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT 1
              )
            "#,
        )
        .bind(subject_id)
        .bind(expected_token)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        tracing::info!(removed = result.rows_affected(), "Pruned expired refresh tokens");
        Ok(result.rows_affected())
    }
}
