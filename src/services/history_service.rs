// src/services/history_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{InventoryStore, UserStore},
    models::inventory::{LocationHistory, NewLocationHistory},
};

// O livro-razão de localização: só recebe lançamentos, nunca edita nem apaga.
#[derive(Clone)]
pub struct HistoryService {
    inventory: Arc<dyn InventoryStore>,
    users: Arc<dyn UserStore>,
}

impl HistoryService {
    pub fn new(inventory: Arc<dyn InventoryStore>, users: Arc<dyn UserStore>) -> Self {
        Self { inventory, users }
    }

    /// Lança uma mudança de local no razão e atualiza o local corrente do
    /// item junto (ambos ou nenhum). `from = None` só é aceito no primeiro
    /// posicionamento do item.
    pub async fn record(&self, entry: NewLocationHistory) -> Result<LocationHistory, AppError> {
        self.inventory
            .find_item(entry.item_id)
            .await?
            .ok_or(AppError::NotFound("Item"))?;
        self.inventory
            .find_location(entry.to_location_id)
            .await?
            .ok_or(AppError::NotFound("Local de destino"))?;
        self.users
            .find_by_id(entry.changed_by)
            .await?
            .ok_or(AppError::NotFound("Usuário"))?;

        match entry.from_location_id {
            Some(from) => {
                self.inventory
                    .find_location(from)
                    .await?
                    .ok_or(AppError::NotFound("Local de origem"))?;
            }
            None => {
                // Origem nula é exclusiva do primeiro posicionamento.
                if self.inventory.has_history(entry.item_id).await? {
                    return Err(AppError::InvalidInput(
                        "Origem obrigatória: o item já tem histórico de localização.".into(),
                    ));
                }
            }
        }

        self.inventory.record_placement(entry).await
    }

    /// Histórico de um item, mais recente primeiro.
    pub async fn list_for_item(&self, item_id: Uuid) -> Result<Vec<LocationHistory>, AppError> {
        self.inventory
            .find_item(item_id)
            .await?
            .ok_or(AppError::NotFound("Item"))?;
        self.inventory.history_for_item(item_id).await
    }
}
