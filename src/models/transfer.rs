// src/models/transfer.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// --- Status da Transferência ---
// Enum fechado: a tabela de transições vira um `match` exaustivo,
// então um estado novo sem regra nem compila.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Approved,
    InTransit,
    Completed,
    Rejected,
    Cancelled,
}

impl TransferStatus {
    /// Estados terminais não admitem nenhuma transição posterior.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Rejected | TransferStatus::Cancelled
        )
    }

    /// A tabela de transições do fluxo:
    /// pending → approved | rejected | cancelled
    /// approved → in_transit | cancelled
    /// in_transit → completed | cancelled
    pub fn can_transition(&self, to: TransferStatus) -> bool {
        use TransferStatus::*;
        match (self, to) {
            (Pending, Approved) | (Pending, Rejected) => true,
            (Approved, InTransit) => true,
            (InTransit, Completed) => true,
            (Pending, Cancelled) | (Approved, Cancelled) | (InTransit, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Approved => "approved",
            TransferStatus::InTransit => "in_transit",
            TransferStatus::Completed => "completed",
            TransferStatus::Rejected => "rejected",
            TransferStatus::Cancelled => "cancelled",
        }
    }
}

// --- Pedido de Transferência ---
// Nunca é apagado: cancelamento é um status terminal, não um DELETE.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub id: Uuid,
    pub item_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub quantity: i64,
    pub status: TransferStatus,
    pub requested_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub reason: Option<String>,
    pub notes: Option<String>,

    // Quando a movimentação é um empréstimo/devolução, o histórico
    // recebe checkout/checkin em vez de manual.
    pub change_type: crate::models::inventory::ChangeType,

    pub estimated_arrival: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Dados para criação de um pedido (id/status/timestamps vêm do store)
#[derive(Debug, Clone)]
pub struct NewTransferRequest {
    pub item_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub quantity: i64,
    pub requested_by: Uuid,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub change_type: crate::models::inventory::ChangeType,
    pub estimated_arrival: Option<DateTime<Utc>>,
}

// Alterações aplicadas junto com uma transição de status.
// Tudo opcional: o store só escreve o que vier preenchido.
#[derive(Debug, Clone, Default)]
pub struct TransferChanges {
    pub approved_by: Option<Uuid>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Usado na compensação de uma conclusão desfeita por falta de saldo.
    pub clear_actual_arrival: bool,
}

// --- Payloads HTTP ---

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransferPayload {
    pub item_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,

    #[validate(range(min = 1, message = "A quantidade deve ser no mínimo 1."))]
    #[serde(default = "default_quantity")]
    pub quantity: i64,

    pub reason: Option<String>,
    pub notes: Option<String>,
    pub change_type: Option<crate::models::inventory::ChangeType>,
    pub estimated_arrival: Option<DateTime<Utc>>,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPayload {
    pub notes: Option<String>,
    pub estimated_arrival: Option<DateTime<Utc>>,
}
