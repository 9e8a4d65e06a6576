// src/handlers/sessions.rs

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::json;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::session::{SessionLog, SessionStats},
};

// Sessões ativas do próprio usuário, mais recentes primeiro.
pub async fn list_my_sessions(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<SessionLog>>, AppError> {
    let sessions = app_state.session_service.list_active(user.id).await?;
    Ok(Json(sessions))
}

pub async fn my_session_stats(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<SessionStats>, AppError> {
    let stats = app_state.session_service.stats(user.id).await?;
    Ok(Json(stats))
}

// Revoga uma sessão específica. O service barra sessão alheia com 403.
pub async fn revoke_session(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(session_id): Path<String>,
) -> Result<Json<SessionLog>, AppError> {
    let session = app_state
        .session_service
        .revoke(&session_id, user.id)
        .await?;
    Ok(Json(session))
}

pub async fn revoke_all_sessions(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = app_state.session_service.revoke_all(user.id).await?;
    Ok(Json(json!({ "revoked": count })))
}
