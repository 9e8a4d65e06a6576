// src/db/session_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::session::{SessionLog, SessionStats, SessionStatus},
};

// Persistência dos registros de sessão. Todas as escritas que dependem do
// status atual são condicionais no próprio UPDATE (nunca ler-e-gravar),
// para que a varredura de expiração possa rodar junto com login/logout/revoke.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: SessionLog) -> Result<SessionLog, AppError>;

    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<SessionLog>, AppError>;

    /// Atualiza `last_activity` (e opcionalmente `expires_at`, no modo
    /// rolante) de uma sessão ainda viva: ativa E não vencida. `None` se
    /// não existir, já tiver saído do status ativo ou já tiver vencido.
    async fn touch(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        new_expiry: Option<DateTime<Utc>>,
    ) -> Result<Option<SessionLog>, AppError>;

    /// Transição condicional de status (CAS): só aplica se o status atual
    /// for `expected`. `None` quando outra escrita chegou primeiro.
    async fn transition(
        &self,
        session_id: &str,
        expected: SessionStatus,
        to: SessionStatus,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<SessionLog>, AppError>;

    async fn revoke_all_active(&self, user_id: Uuid, now: DateTime<Utc>)
    -> Result<u64, AppError>;

    /// Sessões ativas e não vencidas, mais recentes primeiro.
    async fn list_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionLog>, AppError>;

    async fn stats(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<SessionStats, AppError>;

    /// Marca como expiradas as sessões ativas com `expires_at <= now`.
    /// Idempotente por construção (a condição exclui o que já foi varrido).
    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionLog>, AppError> {
        let session =
            sqlx::query_as::<_, SessionLog>("SELECT * FROM session_logs WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }
}

#[async_trait]
impl SessionStore for PgSessionRepository {
    async fn insert(&self, session: SessionLog) -> Result<SessionLog, AppError> {
        let saved = sqlx::query_as::<_, SessionLog>(
            r#"
            INSERT INTO session_logs
                (id, user_id, session_id, user_agent, ip_address, device_info,
                 status, login_time, last_activity, expires_at, geo_country, geo_city)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.session_id)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(&session.device_info)
        .bind(session.status)
        .bind(session.login_time)
        .bind(session.last_activity)
        .bind(session.expires_at)
        .bind(&session.geo_country)
        .bind(&session.geo_city)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<SessionLog>, AppError> {
        match self.fetch_by_session_id(session_id).await {
            Err(AppError::Unavailable) => self.fetch_by_session_id(session_id).await,
            other => other,
        }
    }

    async fn touch(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        new_expiry: Option<DateTime<Utc>>,
    ) -> Result<Option<SessionLog>, AppError> {
        let session = sqlx::query_as::<_, SessionLog>(
            r#"
            UPDATE session_logs
            SET last_activity = $2,
                expires_at = COALESCE($3, expires_at)
            WHERE session_id = $1 AND status = 'active' AND expires_at > $2
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(now)
        .bind(new_expiry)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn transition(
        &self,
        session_id: &str,
        expected: SessionStatus,
        to: SessionStatus,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<SessionLog>, AppError> {
        let session = sqlx::query_as::<_, SessionLog>(
            r#"
            UPDATE session_logs
            SET status = $3, expires_at = $4
            WHERE session_id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(expected)
        .bind(to)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn revoke_all_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE session_logs
            SET status = 'revoked', expires_at = $2
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionLog>, AppError> {
        let sessions = sqlx::query_as::<_, SessionLog>(
            r#"
            SELECT * FROM session_logs
            WHERE user_id = $1 AND status = 'active' AND expires_at > $2
            ORDER BY last_activity DESC
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn stats(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<SessionStats, AppError> {
        // Usuário sem sessões devolve zeros/None, nunca erro.
        let (total, active, last_login) =
            sqlx::query_as::<_, (i64, i64, Option<DateTime<Utc>>)>(
                r#"
                SELECT COUNT(*),
                       COUNT(*) FILTER (WHERE status = 'active' AND expires_at > $2),
                       MAX(login_time)
                FROM session_logs
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(SessionStats {
            total_sessions: total,
            active_sessions: active,
            last_login,
        })
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE session_logs
            SET status = 'expired'
            WHERE status = 'active' AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
