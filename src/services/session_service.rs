// src/services/session_service.rs

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::RngCore;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{SessionStore, UserStore},
    models::session::{SessionLog, SessionMetadata, SessionStats, SessionStatus, SuspicionReport},
    services::events::{DomainEvent, EventBus, EventKind},
};

// Políticas da sessão. Tudo vem do ambiente (ver config.rs); os defaults
// estão documentados no DESIGN.md.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl: Duration,
    /// Janela deslizante: cada toque autenticado estende o vencimento
    /// pelo TTL inteiro. Desligada por padrão.
    pub rolling: bool,
    pub max_sessions_per_user: usize,
    pub suspicious_window_minutes: i64,
    pub suspicious_distinct_sources: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(24),
            rolling: false,
            max_sessions_per_user: 5,
            suspicious_window_minutes: 30,
            suspicious_distinct_sources: 3,
        }
    }
}

#[derive(Clone)]
pub struct SessionService {
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    config: SessionConfig,
    events: EventBus,
}

/// Identificador de sessão: 32 bytes aleatórios em hex.
fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        config: SessionConfig,
        events: EventBus,
    ) -> Self {
        Self { sessions, users, config, events }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Cria o registro de sessão de um login recém-autenticado.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        metadata: SessionMetadata,
    ) -> Result<SessionLog, AppError> {
        // userId que não resolve é erro de entrada, não "não encontrado".
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::InvalidInput("Usuário informado não existe.".into()))?;

        let now = Utc::now();
        let session = SessionLog {
            id: Uuid::new_v4(),
            user_id,
            session_id: generate_session_id(),
            user_agent: metadata.user_agent,
            ip_address: metadata.ip_address,
            device_info: metadata.device_info,
            status: SessionStatus::Active,
            login_time: now,
            last_activity: now,
            expires_at: now + self.config.ttl,
            geo_country: metadata.geo_country,
            geo_city: metadata.geo_city,
        };

        let saved = self.sessions.insert(session).await?;
        tracing::info!("🔑 Sessão criada para o usuário {}", user_id);
        Ok(saved)
    }

    /// Marca atividade numa sessão ativa. No modo rolante também empurra
    /// o vencimento para `now + TTL`.
    pub async fn touch_activity(&self, session_id: &str) -> Result<SessionLog, AppError> {
        let now = Utc::now();
        let new_expiry = self.config.rolling.then(|| now + self.config.ttl);
        self.sessions
            .touch(session_id, now, new_expiry)
            .await?
            .ok_or(AppError::NotFound("Sessão"))
    }

    /// Revoga uma sessão, restrito ao dono. Revogar a sessão alheia é
    /// `Forbidden`, e a sessão do outro permanece intacta.
    pub async fn revoke(&self, session_id: &str, user_id: Uuid) -> Result<SessionLog, AppError> {
        let session = self
            .sessions
            .find_by_session_id(session_id)
            .await?
            .ok_or(AppError::NotFound("Sessão"))?;

        if session.user_id != user_id {
            return Err(AppError::Forbidden(
                "Você não pode revogar a sessão de outro usuário.".into(),
            ));
        }

        let now = Utc::now();
        self.sessions
            .transition(session_id, SessionStatus::Active, SessionStatus::Revoked, now)
            .await?
            .ok_or_else(|| AppError::Conflict("A sessão já estava encerrada.".into()))
    }

    pub async fn logout(&self, session_id: &str) -> Result<SessionLog, AppError> {
        let now = Utc::now();
        self.sessions
            .transition(session_id, SessionStatus::Active, SessionStatus::Logout, now)
            .await?
            .ok_or(AppError::NotFound("Sessão"))
    }

    /// Revoga todas as sessões ativas do usuário. Retorna quantas caíram.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let count = self.sessions.revoke_all_active(user_id, Utc::now()).await?;
        if count > 0 {
            tracing::info!("🚪 {} sessões do usuário {} revogadas", count, user_id);
        }
        Ok(count)
    }

    pub async fn find(&self, session_id: &str) -> Result<Option<SessionLog>, AppError> {
        self.sessions.find_by_session_id(session_id).await
    }

    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<SessionLog>, AppError> {
        self.sessions.list_active(user_id, Utc::now()).await
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<SessionStats, AppError> {
        self.sessions.stats(user_id, Utc::now()).await
    }

    /// Varre sessões ativas vencidas, marcando-as como expiradas. Roda em
    /// segundo plano (ver sweeper.rs) e é idempotente: a segunda passada
    /// sobre o mesmo conjunto não transiciona nada.
    pub async fn cleanup_expired(&self) -> Result<u64, AppError> {
        let count = self.sessions.expire_due(Utc::now()).await?;
        if count > 0 {
            tracing::info!("🧹 {} sessões expiradas na varredura", count);
        }
        Ok(count)
    }

    /// Heurística: sessões ativas com atividade dentro da janela vindas de
    /// IPs ou dispositivos distintos demais. Só sinaliza — nunca derruba
    /// sessão; quem decide a reação é o gateway de autenticação.
    pub async fn detect_suspicious_activity(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SuspicionReport>, AppError> {
        let now = Utc::now();
        let window_start = now - Duration::minutes(self.config.suspicious_window_minutes);

        let sessions = self.sessions.list_active(user_id, now).await?;
        let recent: Vec<&SessionLog> = sessions
            .iter()
            .filter(|s| s.last_activity >= window_start)
            .collect();

        let distinct_ips: HashSet<&str> = recent
            .iter()
            .filter_map(|s| s.ip_address.as_deref())
            .collect();
        let distinct_devices: HashSet<&str> = recent
            .iter()
            .filter_map(|s| s.device_info.as_deref())
            .collect();

        let threshold = self.config.suspicious_distinct_sources;
        if distinct_ips.len() < threshold && distinct_devices.len() < threshold {
            return Ok(None);
        }

        let report = SuspicionReport {
            user_id,
            distinct_ips: distinct_ips.len(),
            distinct_devices: distinct_devices.len(),
            window_minutes: self.config.suspicious_window_minutes,
            detected_at: now,
        };
        tracing::warn!(
            "⚠️ Atividade suspeita do usuário {}: {} IPs / {} dispositivos na janela",
            user_id,
            report.distinct_ips,
            report.distinct_devices
        );
        self.events
            .emit(DomainEvent::new(EventKind::SessionSuspicious, user_id));
        Ok(Some(report))
    }

    /// Garante o teto de sessões ativas, revogando as mais antigas por
    /// `last_activity` até caber no limite. Retorna quantas caíram.
    pub async fn enforce_session_limit(
        &self,
        user_id: Uuid,
        max_sessions: usize,
    ) -> Result<u64, AppError> {
        let active = self.sessions.list_active(user_id, Utc::now()).await?;
        if active.len() <= max_sessions {
            return Ok(0);
        }

        // list_active vem em ordem decrescente de atividade: o excedente
        // está no fim da lista.
        let mut revoked = 0;
        let now = Utc::now();
        for session in active.iter().skip(max_sessions) {
            let result = self
                .sessions
                .transition(
                    &session.session_id,
                    SessionStatus::Active,
                    SessionStatus::Revoked,
                    now,
                )
                .await?;
            if result.is_some() {
                revoked += 1;
            }
        }
        if revoked > 0 {
            tracing::info!(
                "✂️ Limite de sessões do usuário {}: {} sessões antigas revogadas",
                user_id,
                revoked
            );
        }
        Ok(revoked)
    }
}
