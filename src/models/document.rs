use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::DocumentSnapshot;

/// Request payload for editing a document outside of a live session
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DocumentUpdateRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Response returned after a successful edit
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DocumentResponse {
    pub success: bool,
    pub document: DocumentSnapshot,
}

/// Response returned after deleting a document
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DocumentDeleteResponse {
    pub success: bool,
    pub message: String,
}
