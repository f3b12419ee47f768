use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};

use crate::auth::AuthError;

pub const AUTH_COOKIE: &str = "auth_token";

// Get the credential of a request: Bearer header, then `token` query param, then cookie.
// An unreadable header falls through to the next source and is only reported
// when no other source has a credential.
pub fn get_auth_token(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, AuthError> {
    let mut unreadable = None;

    // 1. Authorization header
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        match auth_header.to_str() {
            Ok(auth_str) => {
                let token = auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).trim();
                if !token.is_empty() {
                    return Ok(token.to_string());
                }
            }
            Err(_) => {
                unreadable = Some(AuthError::InvalidCredential("Invalid Authorization header".to_string()));
            }
        }
    }

    // 2. Query parameter, for browser WebSocket clients that can't set headers
    if let Some(token) = query_token.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    // 3. Cookie
    if let Some(cookie_header) = headers.get(header::COOKIE) {
        match cookie_header.to_str() {
            Ok(cookie_str) => {
                for cookie in cookie::Cookie::split_parse(cookie_str).flatten() {
                    if cookie.name() == AUTH_COOKIE && !cookie.value().is_empty() {
                        return Ok(cookie.value().to_string());
                    }
                }
            }
            Err(_) => {
                if unreadable.is_none() {
                    unreadable = Some(AuthError::InvalidCredential("Invalid Cookie header".to_string()));
                }
            }
        }
    }

    Err(unreadable.unwrap_or(AuthError::MissingCredential))
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}
