use crate::{
    handlers::{diagnostics, doc_delete, doc_update, health_check, ready_check},
    routes::auth_middleware::auth_middleware,
    state::AppState,
    ws::attach_handler,
};
use axum::{
    middleware,
    routing::{get, put},
    Router,
};

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router {
    let protected = Router::<AppState>::new()
        .route("/v1/documents/:id", put(doc_update).delete(doc_delete))
        .route("/v1/diagnostics", get(diagnostics))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::<AppState>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        // Authenticates on its own so it can refuse before upgrading
        .route("/v1/documents/:id/ws", get(attach_handler))
        .merge(protected)
        .with_state(state)
}
