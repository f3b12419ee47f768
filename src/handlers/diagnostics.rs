use crate::{models::{ApiError, DiagnosticsResponse, ParticipantId}, state::AppState};
use axum::{extract::{State, Extension}, http::StatusCode, Json};
use parking_lot::Mutex;
use std::sync::OnceLock;
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Live session counts plus host load
pub async fn diagnostics(
    State(state): State<AppState>,
    Extension(participant): Extension<ParticipantId>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), ApiError> {
    let n_conn = state.registry.connection_count() as u32;
    let n_sessions = state.registry.session_count() as u32;
    let stats = state.broadcaster.stats();

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let mut sys = SYSTEM_MONITOR
            .get_or_init(|| Mutex::new(System::new_all()))
            .lock();
        sys.refresh_cpu();
        sys.refresh_memory();
        (
            sys.global_cpu_info().cpu_usage(),
            sys.used_memory(),
            sys.free_memory(),
            sys.total_memory(),
        )
    };

    info!(
        "Diagnostics for {}: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Sessions: {}",
        participant,
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_conn,
        n_sessions
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn,
            n_sessions,
            n_messages_sent: stats.messages_sent,
            n_messages_dropped: stats.messages_dropped,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
