use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{AuthError, Authenticator};
use crate::models::ParticipantId;

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    valid: bool,
    user: Option<ValidatedUser>,
}

#[derive(Debug, Deserialize)]
struct ValidatedUser {
    id: String,
}

/// Delegates validation to the auth service and caches positive answers.
pub struct RemoteAuthenticator {
    client: Client,
    validate_url: String,
    cache: Cache<String, ParticipantId>,
}

impl RemoteAuthenticator {
    pub fn new(base_url: &str, cache_ttl: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::Misconfigured(format!("failed to build HTTP client: {}", e)))?;

        let validate_url = format!("{}/api/v1/auth/validate", base_url.trim_end_matches('/'));
        info!("Validating credentials against {}", validate_url);

        Ok(Self {
            client,
            validate_url,
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(cache_ttl)
                .build(),
        })
    }

    async fn fetch_identity(&self, credential: &str) -> Result<ParticipantId, AuthError> {
        let response = self
            .client
            .post(&self.validate_url)
            .json(&ValidateRequest { token: credential })
            .send()
            .await
            .map_err(|e| {
                error!("Auth service request failed: {}", e);
                AuthError::Unavailable(e.to_string())
            })?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST => {
                return Err(AuthError::InvalidCredential("rejected by auth service".to_string()));
            }
            status => {
                error!("Auth service answered with unexpected status {}", status);
                return Err(AuthError::Unavailable(format!("auth service returned {}", status)));
            }
        }

        let body: ValidateResponse = response.json().await.map_err(|e| {
            error!("Auth service returned an unreadable body: {}", e);
            AuthError::Unavailable(e.to_string())
        })?;

        if !body.valid {
            return Err(AuthError::InvalidCredential("rejected by auth service".to_string()));
        }
        body.user
            .and_then(|user| ParticipantId::new(user.id))
            .ok_or_else(|| AuthError::InvalidCredential("auth service returned no user id".to_string()))
    }
}

#[async_trait]
impl Authenticator for RemoteAuthenticator {
    async fn validate(&self, credential: &str) -> Result<ParticipantId, AuthError> {
        if let Some(uid) = self.cache.get(credential).await {
            debug!("Credential for user {} served from cache", uid);
            return Ok(uid);
        }

        let uid = self.fetch_identity(credential).await?;
        self.cache.insert(credential.to_string(), uid.clone()).await;
        Ok(uid)
    }
}
