// src/handlers/transfers.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        inventory::{ChangeType, NewLocationHistory},
        transfer::{CreateTransferPayload, NewTransferRequest, TransitionPayload},
    },
};

// ---
// Handler: create_transfer
// ---
pub async fn create_transfer(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<CreateTransferPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let new = NewTransferRequest {
        item_id: payload.item_id,
        from_location_id: payload.from_location_id,
        to_location_id: payload.to_location_id,
        quantity: payload.quantity,
        // O requisitante é sempre quem está autenticado.
        requested_by: user.id,
        reason: payload.reason,
        notes: payload.notes,
        change_type: payload.change_type.unwrap_or(ChangeType::Manual),
        estimated_arrival: payload.estimated_arrival,
    };

    let transfer = app_state.transfer_service.create_request(&user, new).await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

pub async fn list_transfers(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let transfers = app_state.transfer_service.list(&user).await?;
    Ok(Json(transfers))
}

pub async fn get_transfer(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transfer = app_state.transfer_service.get(&user, id).await?;
    Ok(Json(transfer))
}

// ---
// Transições do fluxo. Cada uma devolve o pedido atualizado ou o erro
// tipado do service (403 / 409 conforme o guardião que barrou).
// ---

pub async fn approve_transfer(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transfer = app_state.transfer_service.approve(&user, id).await?;
    Ok(Json(transfer))
}

pub async fn reject_transfer(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transfer = app_state.transfer_service.reject(&user, id).await?;
    Ok(Json(transfer))
}

pub async fn ship_transfer(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<TransitionPayload>>,
) -> Result<impl IntoResponse, AppError> {
    let estimated_arrival = payload.and_then(|Json(p)| p.estimated_arrival);
    let transfer = app_state
        .transfer_service
        .start_transit(&user, id, estimated_arrival)
        .await?;
    Ok(Json(transfer))
}

pub async fn complete_transfer(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (transfer, history) = app_state.transfer_service.complete(&user, id).await?;
    Ok(Json(serde_json::json!({
        "transfer": transfer,
        "historyEntry": history,
    })))
}

pub async fn cancel_transfer(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transfer = app_state.transfer_service.cancel(&user, id).await?;
    Ok(Json(transfer))
}

// ---
// Histórico de localização
// ---

pub async fn item_history(
    State(app_state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let entries = app_state.history_service.list_for_item(item_id).await?;
    Ok(Json(entries))
}

// Lançamento manual no razão (posicionamento direto, sem fluxo de
// transferência). Restrito a administradores.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementPayload {
    pub to_location_id: Uuid,
    pub from_location_id: Option<Uuid>,
    pub change_type: Option<ChangeType>,
    pub notes: Option<String>,
}

pub async fn record_placement(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<PlacementPayload>,
) -> Result<impl IntoResponse, AppError> {
    if !user.role.is_admin() {
        return Err(AppError::Forbidden(
            "Apenas administradores registram posicionamento manual.".into(),
        ));
    }

    let entry = NewLocationHistory {
        item_id,
        from_location_id: payload.from_location_id,
        to_location_id: payload.to_location_id,
        changed_by: user.id,
        change_type: payload.change_type.unwrap_or(ChangeType::Manual),
        notes: payload.notes,
    };

    let history = app_state.history_service.record(entry).await?;
    Ok((StatusCode::CREATED, Json(history)))
}
