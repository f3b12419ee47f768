use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::session;
use crate::auth::AuthError;
use crate::models::ErrorResponse;
use crate::services::auth_service::get_auth_token;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AttachParams {
    pub token: Option<String>,
}

/// Attach to a document's live session.
///
/// The credential and the document are checked first; only then is the
/// connection upgraded.
pub async fn attach_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    Query(params): Query<AttachParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let document = match Uuid::parse_str(&doc_id) {
        Ok(uuid) => uuid,
        Err(e) => {
            warn!("Invalid document UUID '{}': {}", doc_id, e);
            return ErrorResponse::reply(StatusCode::BAD_REQUEST, "Invalid document ID").into_response();
        }
    };

    let credential = match get_auth_token(&headers, params.token.as_deref()) {
        Ok(token) => Some(token),
        Err(AuthError::MissingCredential) => None,
        Err(e) => {
            warn!("Rejected connection to document {}: {}", document, e);
            return e.to_api_error().into_response();
        }
    };
    let pending = match session::prepare(&state, document, credential.as_deref()).await {
        Ok(pending) => pending,
        Err(e) => return e.to_api_error().into_response(),
    };

    info!("Upgrading connection of {} to document {}", pending.participant(), document);
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        session::run(state, pending, stream, sink).await;
    })
}
