use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{RefreshRecord, RefreshStore};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    // subject id -> every record ever inserted for it
    by_subject: HashMap<i64, Vec<RefreshRecord>>,
    next_id: i64,
}

impl Inner {
    fn latest_mut(&mut self, subject_id: i64) -> Option<&mut RefreshRecord> {
        self.by_subject
            .get_mut(&subject_id)?
            .iter_mut()
            .max_by_key(|r| (r.created_at, r.id))
    }
}

/// Process-local store, used for tests and single-node development
#[derive(Default)]
pub struct InMemoryRefreshStore {
    inner: RwLock<Inner>,
}

impl InMemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held for a subject, history included
    pub async fn count(&self, subject_id: i64) -> usize {
        self.inner
            .read()
            .await
            .by_subject
            .get(&subject_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl RefreshStore for InMemoryRefreshStore {
    async fn get_latest(&self, subject_id: i64) -> Result<Option<RefreshRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_subject
            .get(&subject_id)
            .and_then(|records| records.iter().max_by_key(|r| (r.created_at, r.id)))
            .cloned())
    }

    async fn insert(
        &self,
        subject_id: i64,
        token: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let record = RefreshRecord {
            id: inner.next_id,
            subject_id,
            token: token.to_string(),
            created_at,
            expires_at,
        };
        inner.by_subject.entry(subject_id).or_default().push(record);
        Ok(())
    }

    async fn update_latest(
        &self,
        subject_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(latest) = inner.latest_mut(subject_id) {
            latest.token = token.to_string();
            latest.expires_at = expires_at;
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
        let mut inner = self.inner.write().await;
        match inner.latest_mut(subject_id) {
            Some(latest) if latest.token == expected_token => {
                latest.token = token.to_string();
                latest.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let mut removed = 0u64;
        inner.by_subject.retain(|_, records| {
            let before = records.len();
            records.retain(|r| r.expires_at > now);
            removed += (before - records.len()) as u64;
            !records.is_empty()
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_get_latest_on_empty_store() {
        let store = InMemoryRefreshStore::new();
        assert_eq!(store.get_latest(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_latest_returns_newest_record() {
        let store = InMemoryRefreshStore::new();
        let now = Utc::now();

        store.insert(1, "old", now - Duration::hours(1), now).await.unwrap();
        store.insert(1, "new", now, now + Duration::days(1)).await.unwrap();
        store.insert(2, "other", now, now + Duration::days(1)).await.unwrap();

        let latest = store.get_latest(1).await.unwrap().expect("record expected");
        assert_eq!(latest.token, "new");
        assert_eq!(latest.subject_id, 1);
        assert_eq!(store.count(1).await, 2);
    }

    #[tokio::test]
    async fn test_same_created_at_prefers_last_inserted() {
        let store = InMemoryRefreshStore::new();
        let now = Utc::now();

        store.insert(1, "first", now, now).await.unwrap();
        store.insert(1, "second", now, now).await.unwrap();

        assert_eq!(store.get_latest(1).await.unwrap().unwrap().token, "second");
    }

    #[tokio::test]
    async fn test_update_latest_keeps_created_at() {
        let store = InMemoryRefreshStore::new();
        let created = Utc::now() - Duration::days(3);
        let new_expiry = Utc::now() + Duration::days(30);

        store.insert(1, "a", created, created + Duration::days(1)).await.unwrap();
        store.update_latest(1, "b", new_expiry).await.unwrap();

        let latest = store.get_latest(1).await.unwrap().unwrap();
        assert_eq!(latest.token, "b");
        assert_eq!(latest.expires_at, new_expiry);
        assert_eq!(latest.created_at, created);
        assert_eq!(store.count(1).await, 1);
    }

    #[tokio::test]
    async fn test_update_latest_leaves_history_alone() {
        let store = InMemoryRefreshStore::new();
        let now = Utc::now();

        store.insert(1, "old", now - Duration::hours(1), now).await.unwrap();
        store.insert(1, "new", now, now).await.unwrap();
        store.update_latest(1, "newer", now).await.unwrap();

        let inner = store.inner.read().await;
        let tokens: Vec<&str> = inner.by_subject[&1].iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, vec!["old", "newer"]);
    }

    #[tokio::test]
    async fn test_update_latest_without_record_is_noop() {
        let store = InMemoryRefreshStore::new();
        store.update_latest(1, "x", Utc::now()).await.unwrap();
        assert_eq!(store.get_latest(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replace_latest_if_detects_lost_race() {
        let store = InMemoryRefreshStore::new();
        let now = Utc::now();
        store.insert(1, "seen", now, now).await.unwrap();

        // Another request replaced the token first
        store.update_latest(1, "winner", now).await.unwrap();

        let written = store.replace_latest_if(1, "seen", "loser", now).await.unwrap();
        assert!(!written);
        assert_eq!(store.get_latest(1).await.unwrap().unwrap().token, "winner");

        let written = store.replace_latest_if(1, "winner", "next", now).await.unwrap();
        assert!(written);
        assert_eq!(store.get_latest(1).await.unwrap().unwrap().token, "next");
    }

    #[tokio::test]
    async fn test_prune_expired() {
        let store = InMemoryRefreshStore::new();
        let now = Utc::now();

        store.insert(1, "dead", now - Duration::days(2), now - Duration::days(1)).await.unwrap();
        store.insert(1, "edge", now - Duration::days(1), now).await.unwrap();
        store.insert(2, "alive", now, now + Duration::days(1)).await.unwrap();

        assert_eq!(store.prune_expired(now).await.unwrap(), 2);
        assert_eq!(store.get_latest(1).await.unwrap(), None);
        assert_eq!(store.get_latest(2).await.unwrap().unwrap().token, "alive");
    }
}
