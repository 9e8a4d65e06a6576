// src/models/session.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// --- Status da Sessão ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
    Logout,
}

// --- Registro de Sessão ---
// Um registro por login. O `session_id` é o identificador opaco que
// viaja dentro do JWT; o registro é o que a gestão de sessões enxerga.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub device_info: Option<String>,
    pub status: SessionStatus,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub geo_country: Option<String>,
    pub geo_city: Option<String>,
}

impl SessionLog {
    /// `status = active` só vale enquanto `expires_at > now`. Um registro
    /// ativo vencido é logicamente expirado mesmo antes da varredura passar.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && self.expires_at > now
    }
}

// Metadados da requisição de login, capturados pelo gateway.
#[derive(Debug, Clone, Default)]
pub struct SessionMetadata {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub device_info: Option<String>,
    pub geo_country: Option<String>,
    pub geo_city: Option<String>,
}

// --- Agregados ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_sessions: i64,
    pub active_sessions: i64,
    pub last_login: Option<DateTime<Utc>>,
}

impl SessionStats {
    pub fn empty() -> Self {
        Self { total_sessions: 0, active_sessions: 0, last_login: None }
    }
}

// Sinal produzido pela heurística de atividade suspeita. Quem decide o que
// fazer (forçar re-autenticação, alertar) é o gateway; aqui só detectamos.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspicionReport {
    pub user_id: Uuid,
    pub distinct_ips: usize,
    pub distinct_devices: usize,
    pub window_minutes: i64,
    pub detected_at: DateTime<Utc>,
}
