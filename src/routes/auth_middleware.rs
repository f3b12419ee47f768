use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::services::auth_service::get_auth_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    // 1. Get the auth token from the request
    let query_token = Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.token);
    let token = match get_auth_token(req.headers(), query_token.as_deref()) {
        Ok(token) => token,
        Err(e) => {
            debug!("Request to {} without credential: {}", req.uri().path(), e);
            return e.to_api_error().into_response();
        }
    };

    // 2. Validate it
    let participant = match state.authenticator.validate(&token).await {
        Ok(participant) => participant,
        Err(e) => {
            warn!("Authentication failed for {}: {}", req.uri().path(), e);
            return e.to_api_error().into_response();
        }
    };

    // 3. Hand the identity to downstream handlers
    req.extensions_mut().insert(participant);
    next.run(req).await
}
