use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AuthError, Authenticator};
use crate::models::ParticipantId;
use crate::services::auth_service::validate_jwt;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user_id: String,
    sub: String,
    exp: usize,
}

/// Validates HS256 tokens signed with a shared secret.
#[derive(Debug, Clone)]
pub struct JwtAuthenticator {
    secret: String,
}

impl JwtAuthenticator {
    pub fn new(secret: impl Into<String>) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AuthError::Misconfigured("JWT secret is empty".to_string()));
        }
        Ok(Self { secret })
    }

    /// Sign a token for `user_id` that expires after `ttl`.
    pub fn issue_token(&self, user_id: &str, ttl: Duration) -> Result<String, AuthError> {
        let expiration = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::Misconfigured("token lifetime out of range".to_string()))?
            .timestamp();

        let claims = Claims {
            user_id: user_id.to_string(),
            sub: user_id.to_string(),
            exp: expiration.max(0) as usize,
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| AuthError::Misconfigured(format!("failed to sign token: {}", e)))
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn validate(&self, credential: &str) -> Result<ParticipantId, AuthError> {
        let token_data = validate_jwt(credential, &self.secret).map_err(|e| {
            warn!("JWT validation failed: {}", e);
            AuthError::InvalidCredential(e.to_string())
        })?;

        let claims = &token_data.claims;
        let uid = claims
            .get("user_id")
            .and_then(|v| v.as_str())
            .or_else(|| claims.get("sub").and_then(|v| v.as_str()))
            .and_then(|id| ParticipantId::new(id))
            .ok_or_else(|| AuthError::InvalidCredential("token carries no user identity".to_string()))?;

        debug!("JWT token validated successfully for user: {}", uid);
        Ok(uid)
    }
}
