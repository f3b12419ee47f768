pub mod health;
pub mod doc_update;
pub mod doc_delete;
pub mod diagnostics;

pub use health::*;
pub use doc_update::*;
pub use doc_delete::*;
pub use diagnostics::*;

use axum::http::StatusCode;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::{ApiError, ErrorResponse};
use crate::services::StoreError;

// Parse a document id path segment
fn parse_doc_id(doc_id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(doc_id).map_err(|e| {
        warn!("Invalid document UUID '{}': {}", doc_id, e);
        ErrorResponse::reply(StatusCode::BAD_REQUEST, format!("Invalid document UUID '{}'", doc_id))
    })
}

// Map a store failure to a response without leaking backend detail
fn store_error(doc_id: Uuid, e: StoreError) -> ApiError {
    if e.is_not_found_or_forbidden() {
        warn!("Document '{}' not available: {}", doc_id, e);
        ErrorResponse::reply(StatusCode::NOT_FOUND, "Document not found")
    } else {
        error!("Document store failure for '{}': {}", doc_id, e);
        ErrorResponse::reply(
            StatusCode::SERVICE_UNAVAILABLE,
            "Document service is unavailable - please try again later",
        )
    }
}
