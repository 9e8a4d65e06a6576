// src/handlers/auth.rs

use axum::{Json, extract::State, http::HeaderMap};
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::{AuthenticatedUser, CurrentSession},
    models::{
        auth::{AuthResponse, LoginUserPayload, RegisterUserPayload, User, UserRole},
        session::SessionMetadata,
    },
};

// Metadados da sessão extraídos dos headers da requisição de login.
fn session_metadata(headers: &HeaderMap) -> SessionMetadata {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };
    SessionMetadata {
        user_agent: header("user-agent"),
        // Atrás de proxy, o primeiro IP da lista é o cliente.
        ip_address: header("x-forwarded-for")
            .map(|v| v.split(',').next().unwrap_or(&v).trim().to_string()),
        device_info: header("x-device-info"),
        geo_country: header("x-geo-country"),
        geo_city: header("x-geo-city"),
    }
}

// Handler de registro
pub async fn register(
    State(app_state): State<AppState>,
    Json(payload): Json<RegisterUserPayload>,
) -> Result<Json<User>, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let role = payload.role.unwrap_or(UserRole::Worker);
    let user = app_state
        .auth_service
        .register_user(&payload.username, &payload.password, role)
        .await?;

    Ok(Json(user))
}

// Handler de login
pub async fn login(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginUserPayload>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let response = app_state
        .auth_service
        .login_user(&payload.username, &payload.password, session_metadata(&headers))
        .await?;

    Ok(Json(response))
}

// Encerra a sessão do próprio token
pub async fn logout(
    State(app_state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Json<serde_json::Value>, AppError> {
    app_state.auth_service.logout(&session.session_id).await?;
    Ok(Json(serde_json::json!({ "message": "Sessão encerrada." })))
}

// Handler da rota protegida /me
pub async fn get_me(AuthenticatedUser(user): AuthenticatedUser) -> Json<User> {
    Json(user)
}
