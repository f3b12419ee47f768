use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::{parse_doc_id, store_error};
use crate::models::{ApiError, DocumentResponse, DocumentUpdateRequest, ErrorResponse, ParticipantId};
use crate::state::AppState;

/// Edit a document outside of a live session and tell its attendees
pub async fn doc_update(
    State(state): State<AppState>,
    Extension(participant): Extension<ParticipantId>,
    Path(doc_id): Path<String>,
    Json(request): Json<DocumentUpdateRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    let doc_uuid = parse_doc_id(&doc_id)?;

    if request.title.trim().is_empty() {
        return Err(ErrorResponse::reply(StatusCode::BAD_REQUEST, "Title is required"));
    }

    let snapshot = state
        .store
        .update(doc_uuid, &participant, &request.title, &request.content)
        .await
        .map_err(|e| store_error(doc_uuid, e))?;
    info!("Document '{}' updated by {}", doc_uuid, participant);

    let notified = state
        .relay
        .notify_external_update(doc_uuid, &participant, snapshot.clone());
    if notified > 0 {
        info!("Notified {} attendee(s) of document '{}'", notified, doc_uuid);
    }

    Ok((
        StatusCode::OK,
        Json(DocumentResponse {
            success: true,
            document: snapshot,
        }),
    ))
}
