// src/db/memory.rs

// Store em memória: um único Mutex na frente de todos os mapas, então cada
// operação do trait é atômica por inteiro. É o backend dos testes e do modo
// de desenvolvimento (`STORE_BACKEND=memory`), com a mesma semântica
// condicional dos repositórios Postgres.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        inventory_repo::{CompletionOutcome, InventoryStore},
        session_repo::SessionStore,
        transfer_repo::TransferStore,
        user_repo::UserStore,
    },
    models::{
        auth::{User, UserRole},
        inventory::{Item, Location, LocationHistory, NewLocationHistory, StockLevel},
        session::{SessionLog, SessionStats, SessionStatus},
        transfer::{NewTransferRequest, TransferChanges, TransferRequest, TransferStatus},
    },
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    items: HashMap<Uuid, Item>,
    locations: HashMap<Uuid, Location>,
    // (item_id, location_id) -> saldo
    stock: HashMap<(Uuid, Uuid), StockLevel>,
    history: Vec<LocationHistory>,
    // session_id opaco -> registro
    sessions: HashMap<String, SessionLog>,
    transfers: HashMap<Uuid, TransferRequest>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Helpers de semeadura (testes e modo memória) ---

    pub fn seed_user(&self, username: &str, password_hash: &str, role: UserRole) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().unwrap().users.insert(user.id, user.clone());
        user
    }

    pub fn seed_location(&self, name: &str) -> Location {
        let now = Utc::now();
        let location = Location {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.inner
            .lock()
            .unwrap()
            .locations
            .insert(location.id, location.clone());
        location
    }

    pub fn seed_item(&self, name: &str, location_id: Option<Uuid>, quantity: i64) -> Item {
        let now = Utc::now();
        let item = Item {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            category_id: None,
            supplier_id: None,
            current_location_id: location_id,
            quantity,
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().unwrap().items.insert(item.id, item.clone());
        item
    }

    pub fn seed_stock(
        &self,
        item_id: Uuid,
        location_id: Uuid,
        quantity: i64,
        low_stock_threshold: i64,
    ) -> StockLevel {
        let level = StockLevel {
            id: Uuid::new_v4(),
            item_id,
            location_id,
            quantity,
            low_stock_threshold,
            updated_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .stock
            .insert((item_id, location_id), level.clone());
        level
    }

    /// Ajusta diretamente um registro de sessão (só para testes de expiração).
    pub fn override_session_expiry(&self, session_id: &str, expires_at: DateTime<Utc>) {
        if let Some(s) = self.inner.lock().unwrap().sessions.get_mut(session_id) {
            s.expires_at = expires_at;
        }
    }

    pub fn override_session_activity(&self, session_id: &str, last_activity: DateTime<Utc>) {
        if let Some(s) = self.inner.lock().unwrap().sessions.get_mut(session_id) {
            s.last_activity = last_activity;
        }
    }
}

#[async_trait]
impl UserStore for MemStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.inner.lock().unwrap().users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User, AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.values().any(|u| u.username == username) {
            return Err(AppError::UsernameAlreadyExists);
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl SessionStore for MemStore {
    async fn insert(&self, session: SessionLog) -> Result<SessionLog, AppError> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<SessionLog>, AppError> {
        Ok(self.inner.lock().unwrap().sessions.get(session_id).cloned())
    }

    async fn touch(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        new_expiry: Option<DateTime<Utc>>,
    ) -> Result<Option<SessionLog>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.sessions.get_mut(session_id) {
            // O toque exige sessão viva: registro ativo vencido já conta
            // como expirado e não pode ser ressuscitado pelo modo rolante.
            Some(s) if s.is_live(now) => {
                s.last_activity = now;
                if let Some(exp) = new_expiry {
                    s.expires_at = exp;
                }
                Ok(Some(s.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn transition(
        &self,
        session_id: &str,
        expected: SessionStatus,
        to: SessionStatus,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<SessionLog>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.sessions.get_mut(session_id) {
            Some(s) if s.status == expected => {
                s.status = to;
                s.expires_at = expires_at;
                Ok(Some(s.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn revoke_all_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let mut count = 0;
        for s in inner.sessions.values_mut() {
            if s.user_id == user_id && s.status == SessionStatus::Active {
                s.status = SessionStatus::Revoked;
                s.expires_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionLog>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut sessions: Vec<SessionLog> = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_live(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions)
    }

    async fn stats(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<SessionStats, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut stats = SessionStats::empty();
        for s in inner.sessions.values().filter(|s| s.user_id == user_id) {
            stats.total_sessions += 1;
            if s.is_live(now) {
                stats.active_sessions += 1;
            }
            if stats.last_login.is_none_or(|t| s.login_time > t) {
                stats.last_login = Some(s.login_time);
            }
        }
        Ok(stats)
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let mut count = 0;
        for s in inner.sessions.values_mut() {
            if s.status == SessionStatus::Active && s.expires_at <= now {
                s.status = SessionStatus::Expired;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl InventoryStore for MemStore {
    async fn find_item(&self, id: Uuid) -> Result<Option<Item>, AppError> {
        Ok(self.inner.lock().unwrap().items.get(&id).cloned())
    }

    async fn find_location(&self, id: Uuid) -> Result<Option<Location>, AppError> {
        Ok(self.inner.lock().unwrap().locations.get(&id).cloned())
    }

    async fn stock_level(
        &self,
        item_id: Uuid,
        location_id: Uuid,
    ) -> Result<Option<StockLevel>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .stock
            .get(&(item_id, location_id))
            .cloned())
    }

    async fn apply_completion(
        &self,
        qty: i64,
        entry: NewLocationHistory,
    ) -> Result<Option<CompletionOutcome>, AppError> {
        let from = entry
            .from_location_id
            .ok_or_else(|| AppError::InvalidInput("Origem da transferência ausente.".into()))?;

        // O lock único faz o papel da transação: ou tudo, ou nada.
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        let source_level = match inner.stock.get_mut(&(entry.item_id, from)) {
            Some(level) if level.quantity >= qty => {
                level.quantity -= qty;
                level.updated_at = now;
                level.clone()
            }
            _ => return Ok(None),
        };

        let dest = inner
            .stock
            .entry((entry.item_id, entry.to_location_id))
            .or_insert_with(|| StockLevel {
                id: Uuid::new_v4(),
                item_id: entry.item_id,
                location_id: entry.to_location_id,
                quantity: 0,
                low_stock_threshold: 0,
                updated_at: now,
            });
        dest.quantity += qty;
        dest.updated_at = now;

        let history = LocationHistory {
            id: Uuid::new_v4(),
            item_id: entry.item_id,
            from_location_id: entry.from_location_id,
            to_location_id: entry.to_location_id,
            changed_by: entry.changed_by,
            change_type: entry.change_type,
            notes: entry.notes.clone(),
            changed_at: now,
        };
        inner.history.push(history.clone());

        if let Some(item) = inner.items.get_mut(&entry.item_id) {
            item.current_location_id = Some(entry.to_location_id);
            item.updated_at = now;
        }

        Ok(Some(CompletionOutcome { source_level, history }))
    }

    async fn record_placement(
        &self,
        entry: NewLocationHistory,
    ) -> Result<LocationHistory, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let history = LocationHistory {
            id: Uuid::new_v4(),
            item_id: entry.item_id,
            from_location_id: entry.from_location_id,
            to_location_id: entry.to_location_id,
            changed_by: entry.changed_by,
            change_type: entry.change_type,
            notes: entry.notes,
            changed_at: now,
        };
        inner.history.push(history.clone());
        if let Some(item) = inner.items.get_mut(&entry.item_id) {
            item.current_location_id = Some(entry.to_location_id);
            item.updated_at = now;
        }
        Ok(history)
    }

    async fn history_for_item(&self, item_id: Uuid) -> Result<Vec<LocationHistory>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<LocationHistory> = inner
            .history
            .iter()
            .filter(|h| h.item_id == item_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.changed_at.cmp(&a.changed_at));
        Ok(entries)
    }

    async fn has_history(&self, item_id: Uuid) -> Result<bool, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .history
            .iter()
            .any(|h| h.item_id == item_id))
    }
}

#[async_trait]
impl TransferStore for MemStore {
    async fn insert(&self, new: NewTransferRequest) -> Result<TransferRequest, AppError> {
        let now = Utc::now();
        let transfer = TransferRequest {
            id: Uuid::new_v4(),
            item_id: new.item_id,
            from_location_id: new.from_location_id,
            to_location_id: new.to_location_id,
            quantity: new.quantity,
            status: TransferStatus::Pending,
            requested_by: new.requested_by,
            approved_by: None,
            reason: new.reason,
            notes: new.notes,
            change_type: new.change_type,
            estimated_arrival: new.estimated_arrival,
            actual_arrival: None,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .lock()
            .unwrap()
            .transfers
            .insert(transfer.id, transfer.clone());
        Ok(transfer)
    }

    async fn find(&self, id: Uuid) -> Result<Option<TransferRequest>, AppError> {
        Ok(self.inner.lock().unwrap().transfers.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<TransferRequest>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut transfers: Vec<TransferRequest> = inner.transfers.values().cloned().collect();
        transfers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transfers)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<TransferRequest>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut transfers: Vec<TransferRequest> = inner
            .transfers
            .values()
            .filter(|t| t.requested_by == user_id)
            .cloned()
            .collect();
        transfers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transfers)
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: TransferStatus,
        to: TransferStatus,
        changes: TransferChanges,
    ) -> Result<Option<TransferRequest>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.transfers.get_mut(&id) {
            Some(t) if t.status == expected => {
                t.status = to;
                if changes.approved_by.is_some() {
                    t.approved_by = changes.approved_by;
                }
                if changes.estimated_arrival.is_some() {
                    t.estimated_arrival = changes.estimated_arrival;
                }
                if changes.clear_actual_arrival {
                    t.actual_arrival = None;
                } else if changes.actual_arrival.is_some() {
                    t.actual_arrival = changes.actual_arrival;
                }
                if changes.notes.is_some() {
                    t.notes = changes.notes;
                }
                t.updated_at = Utc::now();
                Ok(Some(t.clone()))
            }
            _ => Ok(None),
        }
    }
}
