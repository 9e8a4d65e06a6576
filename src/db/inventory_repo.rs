// src/db/inventory_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::inventory::{Item, Location, LocationHistory, NewLocationHistory, StockLevel},
};

/// Resultado da aplicação dos efeitos de uma conclusão de transferência.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// Saldo restante na origem, já debitado.
    pub source_level: StockLevel,
    pub history: LocationHistory,
}

// Itens, locais, saldos por local e o livro-razão de localização.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn find_item(&self, id: Uuid) -> Result<Option<Item>, AppError>;
    async fn find_location(&self, id: Uuid) -> Result<Option<Location>, AppError>;
    async fn stock_level(
        &self,
        item_id: Uuid,
        location_id: Uuid,
    ) -> Result<Option<StockLevel>, AppError>;

    /// Aplica os efeitos da conclusão como uma unidade: débito condicional
    /// na origem (`WHERE quantity >= qty`), crédito no destino, lançamento
    /// no histórico e atualização do local corrente do item.
    /// `Ok(None)` significa saldo insuficiente no momento do commit —
    /// nada foi aplicado.
    async fn apply_completion(
        &self,
        qty: i64,
        entry: NewLocationHistory,
    ) -> Result<Option<CompletionOutcome>, AppError>;

    /// Lançamento avulso no livro-razão (posicionamento manual): grava a
    /// entrada e atualiza o local corrente do item como uma unidade.
    async fn record_placement(
        &self,
        entry: NewLocationHistory,
    ) -> Result<LocationHistory, AppError>;

    /// Histórico de um item, mais recente primeiro.
    async fn history_for_item(&self, item_id: Uuid) -> Result<Vec<LocationHistory>, AppError>;

    async fn has_history(&self, item_id: Uuid) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct PgInventoryRepository {
    pool: PgPool,
}

impl PgInventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_item(&self, id: Uuid) -> Result<Option<Item>, AppError> {
        let item = sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    async fn fetch_location(&self, id: Uuid) -> Result<Option<Location>, AppError> {
        let location = sqlx::query_as::<_, Location>("SELECT * FROM locations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(location)
    }
}

#[async_trait]
impl InventoryStore for PgInventoryRepository {
    async fn find_item(&self, id: Uuid) -> Result<Option<Item>, AppError> {
        match self.fetch_item(id).await {
            Err(AppError::Unavailable) => self.fetch_item(id).await,
            other => other,
        }
    }

    async fn find_location(&self, id: Uuid) -> Result<Option<Location>, AppError> {
        match self.fetch_location(id).await {
            Err(AppError::Unavailable) => self.fetch_location(id).await,
            other => other,
        }
    }

    async fn stock_level(
        &self,
        item_id: Uuid,
        location_id: Uuid,
    ) -> Result<Option<StockLevel>, AppError> {
        let level = sqlx::query_as::<_, StockLevel>(
            "SELECT * FROM stock_levels WHERE item_id = $1 AND location_id = $2",
        )
        .bind(item_id)
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(level)
    }

    async fn apply_completion(
        &self,
        qty: i64,
        entry: NewLocationHistory,
    ) -> Result<Option<CompletionOutcome>, AppError> {
        let from = entry
            .from_location_id
            .ok_or_else(|| AppError::InvalidInput("Origem da transferência ausente.".into()))?;

        let mut tx = self.pool.begin().await?;

        // 1. Débito condicional na origem. Zero linhas = saldo insuficiente
        //    no momento do commit; o rollback desfaz tudo.
        let source_level = sqlx::query_as::<_, StockLevel>(
            r#"
            UPDATE stock_levels
            SET quantity = quantity - $3, updated_at = NOW()
            WHERE item_id = $1 AND location_id = $2 AND quantity >= $3
            RETURNING *
            "#,
        )
        .bind(entry.item_id)
        .bind(from)
        .bind(qty)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(source_level) = source_level else {
            tx.rollback().await?;
            return Ok(None);
        };

        // 2. Crédito no destino (upsert, como o saldo pode não existir lá).
        sqlx::query(
            r#"
            INSERT INTO stock_levels (item_id, location_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (item_id, location_id)
            DO UPDATE SET quantity = stock_levels.quantity + $3, updated_at = NOW()
            "#,
        )
        .bind(entry.item_id)
        .bind(entry.to_location_id)
        .bind(qty)
        .execute(&mut *tx)
        .await?;

        // 3. Lançamento no livro-razão.
        let history = sqlx::query_as::<_, LocationHistory>(
            r#"
            INSERT INTO location_history
                (item_id, from_location_id, to_location_id, changed_by, change_type, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(entry.item_id)
        .bind(entry.from_location_id)
        .bind(entry.to_location_id)
        .bind(entry.changed_by)
        .bind(entry.change_type)
        .bind(&entry.notes)
        .fetch_one(&mut *tx)
        .await?;

        // 4. Local corrente do item acompanha o último lançamento.
        sqlx::query(
            "UPDATE items SET current_location_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(entry.item_id)
        .bind(entry.to_location_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(CompletionOutcome { source_level, history }))
    }

    async fn record_placement(
        &self,
        entry: NewLocationHistory,
    ) -> Result<LocationHistory, AppError> {
        let mut tx = self.pool.begin().await?;

        let history = sqlx::query_as::<_, LocationHistory>(
            r#"
            INSERT INTO location_history
                (item_id, from_location_id, to_location_id, changed_by, change_type, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(entry.item_id)
        .bind(entry.from_location_id)
        .bind(entry.to_location_id)
        .bind(entry.changed_by)
        .bind(entry.change_type)
        .bind(&entry.notes)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE items SET current_location_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(entry.item_id)
        .bind(entry.to_location_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(history)
    }

    async fn history_for_item(&self, item_id: Uuid) -> Result<Vec<LocationHistory>, AppError> {
        let entries = sqlx::query_as::<_, LocationHistory>(
            "SELECT * FROM location_history WHERE item_id = $1 ORDER BY changed_at DESC",
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn has_history(&self, item_id: Uuid) -> Result<bool, AppError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM location_history WHERE item_id = $1)",
        )
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
