/// Refresh Token Storage
///
/// The store owns every `RefreshRecord`. Several records may exist for a
/// subject but only the most recently created one is ever read or updated.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

pub use memory::InMemoryRefreshStore;
pub use postgres::PgRefreshStore;

/// One persisted refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    pub id: i64,
    pub subject_id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait RefreshStore: Send + Sync {
    /// Newest record for the subject (by `created_at`, then id)
    async fn get_latest(&self, subject_id: i64) -> Result<Option<RefreshRecord>, StoreError>;

    async fn insert(
        &self,
        subject_id: i64,
        token: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Overwrite token and expiry of the newest record. `created_at` is kept.
    async fn update_latest(
        &self,
        subject_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Like `update_latest`, but only if the newest record still holds
    /// `expected_token`. Returns whether the row was written.
    async fn replace_latest_if(
        &self,
        subject_id: i64,
        expected_token: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Delete every record with `expires_at <= now`
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
