use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::{parse_doc_id, store_error};
use crate::models::{ApiError, DocumentDeleteResponse, ParticipantId};
use crate::state::AppState;

/// Delete a document and force close its live session
pub async fn doc_delete(
    State(state): State<AppState>,
    Extension(participant): Extension<ParticipantId>,
    Path(doc_id): Path<String>,
) -> Result<(StatusCode, Json<DocumentDeleteResponse>), ApiError> {
    let doc_uuid = parse_doc_id(&doc_id)?;

    state
        .store
        .delete(doc_uuid, &participant)
        .await
        .map_err(|e| store_error(doc_uuid, e))?;
    info!("Document '{}' deleted by {}", doc_uuid, participant);

    // Evict connected users
    let closed = state.relay.notify_deleted(doc_uuid, &participant);
    if closed > 0 {
        info!(
            "Force closed {} connection(s) to document '{}' after deletion",
            closed, doc_uuid
        );
    }

    Ok((
        StatusCode::OK,
        Json(DocumentDeleteResponse {
            success: true,
            message: "Document deleted successfully".to_string(),
        }),
    ))
}
