/// Token Manager
///
/// Decides, per request, whether the presented access token can be rotated
/// against the subject's stored refresh token or whether a fresh
/// access/refresh pair has to be issued.
///
/// Rotation never touches the refresh token: it only mints a new access
/// token. Every rotation failure except a storage error falls back to fresh
/// issuance (or, under `RefreshExpiryPolicy::ForceLogout`, an expired refresh
/// token is reported to the caller).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::codec::{SignedToken, TokenCodec};
use crate::auth::transport::TokenSink;
use crate::configuration::{JwtSettings, RefreshExpiryPolicy};
use crate::error::{AppError, TokenError};
use crate::store::{RefreshRecord, RefreshStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A new access/refresh pair was minted
    Issued,
    /// A new access token was minted against the existing refresh token
    Rotated,
}

/// Result of a successful authorization
#[derive(Debug, Clone)]
pub struct Authorized {
    pub subject_id: i64,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub outcome: Outcome,
}

impl Authorized {
    fn new(access: SignedToken, outcome: Outcome) -> Self {
        Self {
            subject_id: access.claims.subject_id,
            expires_at: access.claims.expires_at(),
            access_token: access.token,
            outcome,
        }
    }
}

#[derive(Clone)]
pub struct TokenManager {
    codec: TokenCodec,
    store: Arc<dyn RefreshStore>,
    access_ttl: i64,
    refresh_ttl: i64,
    refresh_expiry_policy: RefreshExpiryPolicy,
}

impl TokenManager {
    pub fn new(codec: TokenCodec, store: Arc<dyn RefreshStore>, settings: &JwtSettings) -> Self {
        Self {
            codec,
            store,
            access_ttl: settings.access_token_expiry,
            refresh_ttl: settings.refresh_token_expiry,
            refresh_expiry_policy: settings.refresh_expiry_policy,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn access_ttl(&self) -> i64 {
        self.access_ttl
    }

    /// Return a valid access token for `subject_id`
    ///
    /// `subject_id` comes from the caller's already-authenticated session;
    /// `presented` is the access token the client sent, if any.
    ///
    /// # Errors
    /// - `AppError::Store` when the refresh store is unavailable
    /// - `AppError::Token(TokenError::Expired)` when the refresh token has
    ///   expired and the policy is `ForceLogout`
    /// - `AppError::Internal` if signing fails
    pub async fn ensure_authorized(
        &self,
        subject_id: i64,
        presented: Option<&str>,
    ) -> Result<Authorized, AppError> {
        let current = self.store.get_latest(subject_id).await?;

        let presented = presented.filter(|t| !t.is_empty());
        let (access_token, record) = match (presented, current) {
            (Some(token), Some(record)) => (token, record),
            (None, current) => {
                tracing::debug!(subject_id = subject_id, "No access token presented");
                return self.issue_fresh_pair(subject_id, current).await;
            }
            (Some(_), None) => {
                tracing::debug!(subject_id = subject_id, "No refresh token on record");
                return self.issue_fresh_pair(subject_id, None).await;
            }
        };

        match self.check_rotation(subject_id, access_token, &record.token) {
            Ok(()) => {
                let access = self.codec.issue(subject_id, self.access_ttl)?;
                tracing::info!(subject_id = subject_id, "Access token rotated");
                Ok(Authorized::new(access, Outcome::Rotated))
            }
            Err(TokenError::Expired)
                if self.refresh_expiry_policy == RefreshExpiryPolicy::ForceLogout =>
            {
                tracing::info!(subject_id = subject_id, "Refresh token expired, forcing logout");
                Err(AppError::Token(TokenError::Expired))
            }
            Err(reason) => {
                tracing::info!(
                    subject_id = subject_id,
                    reason = %reason,
                    "Rotation failed, issuing a fresh token pair"
                );
                self.issue_fresh_pair(subject_id, Some(record)).await
            }
        }
    }

    /// `ensure_authorized`, then hand the access token to `sink`
    pub async fn authorize_and_publish(
        &self,
        subject_id: i64,
        presented: Option<&str>,
        sink: &mut dyn TokenSink,
    ) -> Result<Authorized, AppError> {
        let authorized = self.ensure_authorized(subject_id, presented).await?;
        sink.publish(&authorized.access_token);
        Ok(authorized)
    }

    /// Drop refresh records that have already expired
    pub async fn prune_expired(&self) -> Result<u64, AppError> {
        Ok(self.store.prune_expired(self.codec.clock().now()).await?)
    }

    // Only the refresh token's expiry is checked, so `Expired` here always
    // means the stored refresh token ran out.
    fn check_rotation(
        &self,
        subject_id: i64,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), TokenError> {
        let refresh = self.codec.verify(refresh_token)?;
        let access = self.codec.decode_ignoring_expiry(access_token)?;

        if refresh.subject_id != access.subject_id || refresh.subject_id != subject_id {
            return Err(TokenError::SubjectMismatch);
        }
        Ok(())
    }

    async fn issue_fresh_pair(
        &self,
        subject_id: i64,
        current: Option<RefreshRecord>,
    ) -> Result<Authorized, AppError> {
        let access = self.codec.issue(subject_id, self.access_ttl)?;
        let refresh = self.codec.issue(subject_id, self.refresh_ttl)?;
        let expires_at = refresh.claims.expires_at();

        match current {
            None => {
                let now = self.codec.clock().now();
                self.store
                    .insert(subject_id, &refresh.token, now, expires_at)
                    .await?;
            }
            Some(record) => {
                let written = self
                    .store
                    .replace_latest_if(subject_id, &record.token, &refresh.token, expires_at)
                    .await?;
                if !written {
                    // Another request replaced it first; theirs is just as valid
                    tracing::debug!(
                        subject_id = subject_id,
                        "Refresh token changed concurrently, keeping the newer one"
                    );
                }
            }
        }

        tracing::info!(subject_id = subject_id, "Issued fresh token pair");
        Ok(Authorized::new(access, Outcome::Issued))
    }
}
