pub mod jwt;
pub mod remote;

use async_trait::async_trait;
use axum::http::StatusCode;
use thiserror::Error;

use crate::models::{ApiError, ErrorResponse, ParticipantId};

pub use jwt::JwtAuthenticator;
pub use remote::RemoteAuthenticator;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credential supplied")]
    MissingCredential,
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("authenticator misconfigured: {0}")]
    Misconfigured(String),
    #[error("auth service unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredential | AuthError::InvalidCredential(_) => StatusCode::UNAUTHORIZED,
            AuthError::Misconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Client-facing rejection. The detail stays in the logs.
    pub fn to_api_error(&self) -> ApiError {
        let status = self.status_code();
        let message = match self {
            AuthError::MissingCredential => "Authentication required",
            AuthError::InvalidCredential(_) => "Invalid or expired token",
            AuthError::Misconfigured(_) => "Authentication is not configured",
            AuthError::Unavailable(_) => "Authentication service is unavailable",
        };
        ErrorResponse::reply(status, message)
    }
}

/// Turns a raw credential into the identity of a participant.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn validate(&self, credential: &str) -> Result<ParticipantId, AuthError>;
}
