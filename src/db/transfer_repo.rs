// src/db/transfer_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::transfer::{NewTransferRequest, TransferChanges, TransferRequest, TransferStatus},
};

// Pedidos de transferência. Não existe DELETE aqui de propósito:
// o requisito de auditoria exige que todo pedido permaneça gravado.
#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn insert(&self, new: NewTransferRequest) -> Result<TransferRequest, AppError>;

    async fn find(&self, id: Uuid) -> Result<Option<TransferRequest>, AppError>;

    async fn list_all(&self) -> Result<Vec<TransferRequest>, AppError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<TransferRequest>, AppError>;

    /// Transição condicional (CAS no status): só aplica `to` + `changes`
    /// se o status atual ainda for `expected`. `None` quando um escritor
    /// concorrente chegou primeiro — o chamador relê e devolve
    /// `InvalidTransition` com o estado fresco.
    async fn transition(
        &self,
        id: Uuid,
        expected: TransferStatus,
        to: TransferStatus,
        changes: TransferChanges,
    ) -> Result<Option<TransferRequest>, AppError>;
}

#[derive(Clone)]
pub struct PgTransferRepository {
    pool: PgPool,
}

impl PgTransferRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<TransferRequest>, AppError> {
        let transfer =
            sqlx::query_as::<_, TransferRequest>("SELECT * FROM transfer_requests WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(transfer)
    }
}

#[async_trait]
impl TransferStore for PgTransferRepository {
    async fn insert(&self, new: NewTransferRequest) -> Result<TransferRequest, AppError> {
        let transfer = sqlx::query_as::<_, TransferRequest>(
            r#"
            INSERT INTO transfer_requests
                (item_id, from_location_id, to_location_id, quantity, status,
                 requested_by, reason, notes, change_type, estimated_arrival)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(new.item_id)
        .bind(new.from_location_id)
        .bind(new.to_location_id)
        .bind(new.quantity)
        .bind(new.requested_by)
        .bind(&new.reason)
        .bind(&new.notes)
        .bind(new.change_type)
        .bind(new.estimated_arrival)
        .fetch_one(&self.pool)
        .await?;
        Ok(transfer)
    }

    async fn find(&self, id: Uuid) -> Result<Option<TransferRequest>, AppError> {
        match self.fetch(id).await {
            Err(AppError::Unavailable) => self.fetch(id).await,
            other => other,
        }
    }

    async fn list_all(&self) -> Result<Vec<TransferRequest>, AppError> {
        let transfers = sqlx::query_as::<_, TransferRequest>(
            "SELECT * FROM transfer_requests ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(transfers)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<TransferRequest>, AppError> {
        let transfers = sqlx::query_as::<_, TransferRequest>(
            "SELECT * FROM transfer_requests WHERE requested_by = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(transfers)
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: TransferStatus,
        to: TransferStatus,
        changes: TransferChanges,
    ) -> Result<Option<TransferRequest>, AppError> {
        let transfer = sqlx::query_as::<_, TransferRequest>(
            r#"
            UPDATE transfer_requests
            SET status = $3,
                approved_by = COALESCE($4, approved_by),
                estimated_arrival = COALESCE($5, estimated_arrival),
                actual_arrival = CASE WHEN $8 THEN NULL
                                      ELSE COALESCE($6, actual_arrival) END,
                notes = COALESCE($7, notes),
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(to)
        .bind(changes.approved_by)
        .bind(changes.estimated_arrival)
        .bind(changes.actual_arrival)
        .bind(&changes.notes)
        .bind(changes.clear_actual_arrival)
        .fetch_optional(&self.pool)
        .await?;
        Ok(transfer)
    }
}
