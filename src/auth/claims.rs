/// Token claims
///
/// Access and refresh tokens carry the same payload: the subject they were
/// issued for and when they stop being valid.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Identifier of the authenticated principal
    pub subject_id: i64,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,
}

impl Claims {
    /// Claims for `subject_id` expiring `ttl_seconds` after `now`
    ///
    /// `None` when the expiry falls outside the representable time range.
    pub fn new(subject_id: i64, now: DateTime<Utc>, ttl_seconds: i64) -> Option<Self> {
        let exp = now.timestamp().checked_add(ttl_seconds)?;
        Utc.timestamp_opt(exp, 0).single()?;
        Some(Self { subject_id, exp })
    }

    /// A token is expired once `exp` is at or before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_claims_creation() {
        let now = Utc::now();
        let claims = Claims::new(42, now, 7200).unwrap();

        assert_eq!(claims.subject_id, 42);
        assert_eq!(claims.exp, now.timestamp() + 7200);
        assert!(!claims.is_expired_at(now));
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let claims = Claims::new(1, now, 10).unwrap();

        assert!(!claims.is_expired_at(now + Duration::seconds(9)));
        assert!(claims.is_expired_at(now + Duration::seconds(10)));
    }

    #[test]
    fn test_out_of_range_expiry_is_rejected() {
        let now = Utc::now();

        assert_eq!(Claims::new(1, now, i64::MAX), None);
        let beyond = DateTime::<Utc>::MAX_UTC.timestamp() - now.timestamp() + 1;
        assert_eq!(Claims::new(1, now, beyond), None);
        assert!(Claims::new(1, now, beyond - 1).is_some());
    }

    #[test]
    fn test_wire_field_names() {
        let claims = Claims { subject_id: 7, exp: 100 };
        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json, serde_json::json!({ "subject_id": 7, "exp": 100 }));
    }
}
