/// JWT Token Codec
///
/// Signs and verifies HS256 tokens carrying `Claims`. The key is injected
/// at construction and never changes afterwards.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::Claims;
use crate::auth::clock::{Clock, SystemClock};
use crate::error::{AppError, TokenError};

/// A freshly signed token together with the claims it carries
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: Claims,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(key: &[u8]) -> Self {
        Self::with_clock(key, Arc::new(SystemClock))
    }

    pub fn with_clock(key: &[u8], clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against our own clock with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            validation,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sign a token for `subject_id` valid for `ttl_seconds` from now
    ///
    /// # Errors
    /// Returns `AppError::Internal` if the expiry is out of range or signing fails
    pub fn issue(&self, subject_id: i64, ttl_seconds: i64) -> Result<SignedToken, AppError> {
        let claims = Claims::new(subject_id, self.clock.now(), ttl_seconds).ok_or_else(|| {
            AppError::Internal(format!("Token lifetime out of range: {}s", ttl_seconds))
        })?;

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(SignedToken { token, claims })
    }

    /// Check signature and expiry, returning the claims
    ///
    /// # Errors
    /// `Malformed`, `InvalidSignature`, or `Expired` when `exp <= now`
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode_ignoring_expiry(token)?;
        if claims.is_expired_at(self.clock.now()) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Check the signature only; an expired token still yields its claims
    pub fn decode_ignoring_expiry(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(classify)
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed(err.to_string()),
    }
}
