use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Attach to the live session of a document (WebSocket upgrade)
#[utoipa::path(
    get,
    path = "/api/v1/documents/{id}/ws",
    params(
        ("id" = String, Path, description = "Document UUID"),
        ("token" = Option<String>, Query, description = "Credential, for clients that cannot set headers")
    ),
    responses(
        (status = 101, description = "Switching to the collaboration protocol"),
        (status = 400, description = "Invalid document ID", body = ErrorResponse),
        (status = 401, description = "Missing or invalid credential", body = ErrorResponse),
        (status = 404, description = "Document not found or access denied", body = ErrorResponse),
        (status = 503, description = "Document service unavailable", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn attach_doc() {}

/// Edit a document outside of a live session
#[utoipa::path(
    put,
    path = "/api/v1/documents/{id}",
    params(("id" = String, Path, description = "Document UUID")),
    request_body = DocumentUpdateRequest,
    responses(
        (status = 200, description = "Document updated", body = DocumentResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 503, description = "Document service unavailable", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_update_doc() {}

/// Delete a document and close its live session
#[utoipa::path(
    delete,
    path = "/api/v1/documents/{id}",
    params(("id" = String, Path, description = "Document UUID")),
    responses(
        (status = 200, description = "Document deleted", body = DocumentDeleteResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_delete_doc() {}

/// Session and host diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics", body = DiagnosticsResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        attach_doc,
        doc_update_doc,
        doc_delete_doc,
        diagnostics_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            DocumentSnapshot,
            DocumentUpdateRequest,
            DocumentResponse,
            DocumentDeleteResponse,
            DiagnosticsResponse
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
