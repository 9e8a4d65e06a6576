// src/models/inventory.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// --- 1. Itens / Produtos ---
// O "catálogo". A quantidade aqui é o total; o saldo por local fica em StockLevel.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,

    // Local do último posicionamento. Nulo até a primeira colocação.
    pub current_location_id: Option<Uuid>,

    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- 2. Locais ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- 3. Saldo de Estoque por Local ---
// Liga um Item a um Local. É deste registro que as transferências debitam.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i64,
    pub low_stock_threshold: i64,
    pub updated_at: DateTime<Utc>,
}

// --- 4. Tipo de Mudança de Local ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "location_change_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Manual,
    Checkout,
    Checkin,
}

// --- 5. Histórico de Localização (livro-razão, apenas append) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LocationHistory {
    pub id: Uuid,
    pub item_id: Uuid,

    // Nulo apenas no primeiro posicionamento do item.
    pub from_location_id: Option<Uuid>,
    pub to_location_id: Uuid,

    pub changed_by: Uuid,
    pub change_type: ChangeType,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

// Dados para um novo lançamento no histórico (o id e o timestamp vêm do store)
#[derive(Debug, Clone)]
pub struct NewLocationHistory {
    pub item_id: Uuid,
    pub from_location_id: Option<Uuid>,
    pub to_location_id: Uuid,
    pub changed_by: Uuid,
    pub change_type: ChangeType,
    pub notes: Option<String>,
}
