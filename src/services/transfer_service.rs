// src/services/transfer_service.rs

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{InventoryStore, TransferStore},
    models::{
        auth::User,
        inventory::{ChangeType, LocationHistory, NewLocationHistory},
        transfer::{NewTransferRequest, TransferChanges, TransferRequest, TransferStatus},
    },
    services::events::{DomainEvent, EventBus, EventKind},
};

// Previsão de chegada usada quando ninguém informa uma ao despachar.
const DEFAULT_TRANSIT_HOURS: i64 = 24;

#[derive(Clone)]
pub struct TransferService {
    transfers: Arc<dyn TransferStore>,
    inventory: Arc<dyn InventoryStore>,
    events: EventBus,
}

impl TransferService {
    pub fn new(
        transfers: Arc<dyn TransferStore>,
        inventory: Arc<dyn InventoryStore>,
        events: EventBus,
    ) -> Self {
        Self { transfers, inventory, events }
    }

    // --- Criação ---

    pub async fn create_request(
        &self,
        actor: &User,
        new: NewTransferRequest,
    ) -> Result<TransferRequest, AppError> {
        if new.quantity < 1 {
            return Err(AppError::InvalidInput(
                "A quantidade deve ser no mínimo 1.".into(),
            ));
        }
        if new.from_location_id == new.to_location_id {
            return Err(AppError::InvalidInput(
                "Origem e destino devem ser locais diferentes.".into(),
            ));
        }
        // O requisitante é sempre o usuário autenticado, nunca o payload.
        if new.requested_by != actor.id {
            return Err(AppError::Forbidden(
                "O pedido deve ser criado em nome do próprio usuário.".into(),
            ));
        }

        self.inventory
            .find_item(new.item_id)
            .await?
            .ok_or(AppError::NotFound("Item"))?;
        self.inventory
            .find_location(new.from_location_id)
            .await?
            .ok_or(AppError::NotFound("Local de origem"))?;
        self.inventory
            .find_location(new.to_location_id)
            .await?
            .ok_or(AppError::NotFound("Local de destino"))?;

        // Checagem de disponibilidade no momento do pedido. Ela se repete
        // no commit da conclusão, então uma leitura velha aqui não fura o saldo.
        let available = self
            .inventory
            .stock_level(new.item_id, new.from_location_id)
            .await?
            .map(|level| level.quantity)
            .unwrap_or(0);
        if new.quantity > available {
            return Err(AppError::Conflict(format!(
                "Saldo insuficiente na origem: disponível {available}, pedido {}.",
                new.quantity
            )));
        }

        let item_id = new.item_id;
        let transfer = self.transfers.insert(new).await?;
        tracing::info!(
            "📦 Transferência {} criada (item {}, qtd {})",
            transfer.id,
            item_id,
            transfer.quantity
        );
        self.events.emit(
            DomainEvent::new(EventKind::TransferApprovalNeeded, actor.id)
                .with_item(item_id)
                .with_transfer(transfer.id),
        );
        Ok(transfer)
    }

    // --- Transições ---

    pub async fn approve(&self, actor: &User, id: Uuid) -> Result<TransferRequest, AppError> {
        self.require_admin(actor)?;
        let transfer = self
            .cas_transition(
                id,
                TransferStatus::Pending,
                TransferStatus::Approved,
                TransferChanges { approved_by: Some(actor.id), ..Default::default() },
            )
            .await?;
        self.events.emit(
            DomainEvent::new(EventKind::TransferApproved, actor.id)
                .with_item(transfer.item_id)
                .with_transfer(transfer.id),
        );
        Ok(transfer)
    }

    pub async fn reject(&self, actor: &User, id: Uuid) -> Result<TransferRequest, AppError> {
        self.require_admin(actor)?;
        let transfer = self
            .cas_transition(
                id,
                TransferStatus::Pending,
                TransferStatus::Rejected,
                TransferChanges { approved_by: Some(actor.id), ..Default::default() },
            )
            .await?;
        self.events.emit(
            DomainEvent::new(EventKind::TransferRejected, actor.id)
                .with_item(transfer.item_id)
                .with_transfer(transfer.id),
        );
        Ok(transfer)
    }

    pub async fn start_transit(
        &self,
        actor: &User,
        id: Uuid,
        estimated_arrival: Option<chrono::DateTime<Utc>>,
    ) -> Result<TransferRequest, AppError> {
        let current = self.load(id).await?;
        self.require_admin_or_requester(actor, &current)?;

        // Garante uma previsão de chegada se ninguém definiu uma.
        let estimate = estimated_arrival.or(if current.estimated_arrival.is_none() {
            Some(Utc::now() + Duration::hours(DEFAULT_TRANSIT_HOURS))
        } else {
            None
        });

        self.cas_transition(
            id,
            TransferStatus::Approved,
            TransferStatus::InTransit,
            TransferChanges { estimated_arrival: estimate, ..Default::default() },
        )
        .await
    }

    /// Conclui a transferência. O CAS de status é o ponto de serialização:
    /// de dois concluidores concorrentes, só um passa; o outro enxerga o
    /// status já alterado e recebe `InvalidTransition`. O débito na origem
    /// é re-checado no commit — saldo insuficiente desfaz o CAS e devolve
    /// `Conflict`, sem aplicação parcial.
    pub async fn complete(
        &self,
        actor: &User,
        id: Uuid,
    ) -> Result<(TransferRequest, LocationHistory), AppError> {
        let current = self.load(id).await?;
        self.require_admin_or_requester(actor, &current)?;

        let now = Utc::now();
        let transfer = self
            .cas_transition(
                id,
                TransferStatus::InTransit,
                TransferStatus::Completed,
                TransferChanges { actual_arrival: Some(now), ..Default::default() },
            )
            .await?;

        let entry = NewLocationHistory {
            item_id: transfer.item_id,
            from_location_id: Some(transfer.from_location_id),
            to_location_id: transfer.to_location_id,
            changed_by: actor.id,
            change_type: transfer.change_type,
            notes: transfer.reason.clone(),
        };

        // Qualquer saída sem efeitos aplicados desfaz o CAS de status,
        // inclusive falha do store: o pedido nunca fica 'completed' sem o
        // débito, o crédito e o lançamento correspondentes.
        let outcome = match self.inventory.apply_completion(transfer.quantity, entry).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.undo_completion_cas(id).await;
                return Err(e);
            }
        };

        let Some(outcome) = outcome else {
            // Saldo mudou debaixo de nós: devolve o pedido a in_transit.
            self.undo_completion_cas(id).await;
            return Err(AppError::Conflict(
                "Saldo insuficiente na origem no momento da conclusão.".into(),
            ));
        };

        tracing::info!(
            "✅ Transferência {} concluída (item {}, qtd {})",
            transfer.id,
            transfer.item_id,
            transfer.quantity
        );

        match transfer.change_type {
            ChangeType::Checkout => self.events.emit(
                DomainEvent::new(EventKind::ItemCheckout, actor.id)
                    .with_item(transfer.item_id)
                    .with_transfer(transfer.id),
            ),
            ChangeType::Checkin => self.events.emit(
                DomainEvent::new(EventKind::ItemCheckin, actor.id)
                    .with_item(transfer.item_id)
                    .with_transfer(transfer.id),
            ),
            ChangeType::Manual => {}
        }

        if outcome.source_level.quantity <= outcome.source_level.low_stock_threshold {
            self.events.emit(
                DomainEvent::new(EventKind::LowStockAlert, actor.id)
                    .with_item(transfer.item_id)
                    .with_transfer(transfer.id),
            );
        }

        Ok((transfer, outcome.history))
    }

    pub async fn cancel(&self, actor: &User, id: Uuid) -> Result<TransferRequest, AppError> {
        let current = self.load(id).await?;
        self.require_admin_or_requester(actor, &current)?;
        self.cas_transition(
            id,
            current.status,
            TransferStatus::Cancelled,
            TransferChanges::default(),
        )
        .await
    }

    // --- Consultas ---

    pub async fn get(&self, actor: &User, id: Uuid) -> Result<TransferRequest, AppError> {
        let transfer = self.load(id).await?;
        self.require_admin_or_requester(actor, &transfer)?;
        Ok(transfer)
    }

    pub async fn list(&self, actor: &User) -> Result<Vec<TransferRequest>, AppError> {
        if actor.role.is_admin() {
            self.transfers.list_all().await
        } else {
            self.transfers.list_for_user(actor.id).await
        }
    }

    pub async fn item_history(&self, item_id: Uuid) -> Result<Vec<LocationHistory>, AppError> {
        self.inventory
            .find_item(item_id)
            .await?
            .ok_or(AppError::NotFound("Item"))?;
        self.inventory.history_for_item(item_id).await
    }

    // --- Internos ---

    /// Reverte o CAS `in_transit -> completed` de uma conclusão que não
    /// aplicou efeito nenhum. A falha da própria compensação só é logada:
    /// o erro original da conclusão é o que o chamador precisa ver.
    async fn undo_completion_cas(&self, id: Uuid) {
        let result = self
            .transfers
            .transition(
                id,
                TransferStatus::Completed,
                TransferStatus::InTransit,
                TransferChanges { clear_actual_arrival: true, ..Default::default() },
            )
            .await;
        match result {
            Ok(Some(_)) => {}
            Ok(None) => tracing::error!(
                "Compensação da transferência {} não encontrou o status esperado",
                id
            ),
            Err(e) => tracing::error!("Compensação da transferência {} falhou: {}", id, e),
        }
    }

    async fn load(&self, id: Uuid) -> Result<TransferRequest, AppError> {
        self.transfers
            .find(id)
            .await?
            .ok_or(AppError::NotFound("Transferência"))
    }

    /// Tenta a transição `expected -> to` com escrita condicional. Se o CAS
    /// falhar, relê o registro e devolve `InvalidTransition` com o estado
    /// fresco — inclusive quando a tabela proibiria a transição de saída.
    async fn cas_transition(
        &self,
        id: Uuid,
        expected: TransferStatus,
        to: TransferStatus,
        changes: TransferChanges,
    ) -> Result<TransferRequest, AppError> {
        let current = self.load(id).await?;
        if !current.status.can_transition(to) || current.status != expected {
            return Err(AppError::InvalidTransition { from: current.status, to });
        }

        match self.transfers.transition(id, expected, to, changes).await? {
            Some(transfer) => Ok(transfer),
            None => {
                // Outro escritor passou na frente entre a leitura e o CAS.
                let fresh = self.load(id).await?;
                Err(AppError::InvalidTransition { from: fresh.status, to })
            }
        }
    }

    fn require_admin(&self, actor: &User) -> Result<(), AppError> {
        if !actor.role.is_admin() {
            return Err(AppError::Forbidden(
                "Apenas administradores podem aprovar ou rejeitar transferências.".into(),
            ));
        }
        Ok(())
    }

    fn require_admin_or_requester(
        &self,
        actor: &User,
        transfer: &TransferRequest,
    ) -> Result<(), AppError> {
        if !actor.role.is_admin() && transfer.requested_by != actor.id {
            return Err(AppError::Forbidden(
                "Somente o requisitante ou um administrador pode mexer nesta transferência."
                    .into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::db::{CompletionOutcome, MemStore};
    use crate::models::auth::UserRole;
    use crate::models::inventory::{Item, Location, StockLevel};

    // Store que derruba a próxima conclusão com `Unavailable`, como um
    // timeout de pool no meio do commit.
    struct OutageStore {
        inner: Arc<MemStore>,
        fail_next_completion: AtomicBool,
    }

    #[async_trait::async_trait]
    impl InventoryStore for OutageStore {
        async fn find_item(&self, id: Uuid) -> Result<Option<Item>, AppError> {
            self.inner.find_item(id).await
        }

        async fn find_location(&self, id: Uuid) -> Result<Option<Location>, AppError> {
            self.inner.find_location(id).await
        }

        async fn stock_level(
            &self,
            item_id: Uuid,
            location_id: Uuid,
        ) -> Result<Option<StockLevel>, AppError> {
            self.inner.stock_level(item_id, location_id).await
        }

        async fn apply_completion(
            &self,
            qty: i64,
            entry: NewLocationHistory,
        ) -> Result<Option<CompletionOutcome>, AppError> {
            if self.fail_next_completion.swap(false, Ordering::SeqCst) {
                return Err(AppError::Unavailable);
            }
            self.inner.apply_completion(qty, entry).await
        }

        async fn record_placement(
            &self,
            entry: NewLocationHistory,
        ) -> Result<LocationHistory, AppError> {
            self.inner.record_placement(entry).await
        }

        async fn history_for_item(
            &self,
            item_id: Uuid,
        ) -> Result<Vec<LocationHistory>, AppError> {
            self.inner.history_for_item(item_id).await
        }

        async fn has_history(&self, item_id: Uuid) -> Result<bool, AppError> {
            self.inner.has_history(item_id).await
        }
    }

    struct Fixture {
        service: TransferService,
        store: Arc<MemStore>,
        admin: User,
        worker: User,
        item: Uuid,
        from: Uuid,
        to: Uuid,
    }

    fn fixture() -> Fixture {
        fixture_with_stock(50, 0)
    }

    fn fixture_with_stock(qty: i64, threshold: i64) -> Fixture {
        let store = Arc::new(MemStore::new());
        let admin = store.seed_user("chefe", "$2b$hash", UserRole::Admin);
        let worker = store.seed_user("operador", "$2b$hash", UserRole::Worker);
        let from = store.seed_location("Depósito A");
        let to = store.seed_location("Depósito B");
        let item = store.seed_item("Parafusadeira", Some(from.id), qty);
        store.seed_stock(item.id, from.id, qty, threshold);
        let service = TransferService::new(store.clone(), store.clone(), EventBus::default());
        Fixture { service, store, admin, worker, item: item.id, from: from.id, to: to.id }
    }

    fn new_request(f: &Fixture, qty: i64) -> NewTransferRequest {
        NewTransferRequest {
            item_id: f.item,
            from_location_id: f.from,
            to_location_id: f.to,
            quantity: qty,
            requested_by: f.worker.id,
            reason: Some("Reposição".into()),
            notes: None,
            change_type: ChangeType::Manual,
            estimated_arrival: None,
        }
    }

    #[tokio::test]
    async fn full_happy_path_moves_stock_and_appends_one_history_entry() {
        let f = fixture();
        let t = f.service.create_request(&f.worker, new_request(&f, 5)).await.unwrap();
        assert_eq!(t.status, TransferStatus::Pending);

        let t = f.service.approve(&f.admin, t.id).await.unwrap();
        assert_eq!(t.status, TransferStatus::Approved);
        assert_eq!(t.approved_by, Some(f.admin.id));

        let t = f.service.start_transit(&f.worker, t.id, None).await.unwrap();
        assert_eq!(t.status, TransferStatus::InTransit);
        assert!(t.estimated_arrival.is_some());

        let (t, history) = f.service.complete(&f.worker, t.id).await.unwrap();
        assert_eq!(t.status, TransferStatus::Completed);
        assert!(t.actual_arrival.is_some());

        // Saldo: A cai 5, B sobe 5.
        let at_from = f.store.stock_level(f.item, f.from).await.unwrap().unwrap();
        let at_to = f.store.stock_level(f.item, f.to).await.unwrap().unwrap();
        assert_eq!(at_from.quantity, 45);
        assert_eq!(at_to.quantity, 5);

        // Exatamente um lançamento novo, apontando para o destino.
        let entries = f.store.history_for_item(f.item).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, history.id);
        assert_eq!(entries[0].to_location_id, f.to);
        assert_eq!(entries[0].change_type, ChangeType::Manual);

        // O local corrente do item acompanha o último lançamento.
        let item = f.store.find_item(f.item).await.unwrap().unwrap();
        assert_eq!(item.current_location_id, Some(f.to));
    }

    #[tokio::test]
    async fn worker_cannot_approve() {
        let f = fixture();
        let t = f.service.create_request(&f.worker, new_request(&f, 1)).await.unwrap();
        let err = f.service.approve(&f.worker, t.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let fresh = f.service.get(&f.admin, t.id).await.unwrap();
        assert_eq!(fresh.status, TransferStatus::Pending);
    }

    #[tokio::test]
    async fn rejected_transfer_admits_no_further_transition() {
        let f = fixture();
        let t = f.service.create_request(&f.worker, new_request(&f, 1)).await.unwrap();
        f.service.reject(&f.admin, t.id).await.unwrap();

        let err = f.service.approve(&f.admin, t.id).await.unwrap_err();
        match err {
            AppError::InvalidTransition { from, to } => {
                assert_eq!(from, TransferStatus::Rejected);
                assert_eq!(to, TransferStatus::Approved);
            }
            other => panic!("esperava InvalidTransition, veio {other:?}"),
        }

        let fresh = f.service.get(&f.admin, t.id).await.unwrap();
        assert_eq!(fresh.status, TransferStatus::Rejected);
    }

    #[tokio::test]
    async fn skipping_straight_to_completed_fails() {
        let f = fixture();
        let t = f.service.create_request(&f.worker, new_request(&f, 1)).await.unwrap();
        let err = f.service.complete(&f.worker, t.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition { from: TransferStatus::Pending, to: TransferStatus::Completed }
        ));
    }

    #[tokio::test]
    async fn create_rejects_quantity_above_availability() {
        let f = fixture_with_stock(3, 0);
        let err = f.service.create_request(&f.worker, new_request(&f, 10)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn completion_recheck_conflicts_and_restores_prior_state() {
        let f = fixture_with_stock(10, 0);
        // Dois pedidos disputando o mesmo saldo de 10.
        let t1 = f.service.create_request(&f.worker, new_request(&f, 8)).await.unwrap();
        let t2 = f.service.create_request(&f.worker, new_request(&f, 8)).await.unwrap();
        for t in [&t1, &t2] {
            f.service.approve(&f.admin, t.id).await.unwrap();
            f.service.start_transit(&f.worker, t.id, None).await.unwrap();
        }

        f.service.complete(&f.worker, t1.id).await.unwrap();

        // O segundo falha na re-checagem de commit e volta a in_transit.
        let err = f.service.complete(&f.worker, t2.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let fresh = f.service.get(&f.admin, t2.id).await.unwrap();
        assert_eq!(fresh.status, TransferStatus::InTransit);
        assert!(fresh.actual_arrival.is_none());

        // O saldo só foi debitado uma vez.
        let at_from = f.store.stock_level(f.item, f.from).await.unwrap().unwrap();
        assert_eq!(at_from.quantity, 2);
    }

    #[tokio::test]
    async fn concurrent_completion_applies_effects_exactly_once() {
        let f = fixture_with_stock(20, 0);
        let t = f.service.create_request(&f.worker, new_request(&f, 5)).await.unwrap();
        f.service.approve(&f.admin, t.id).await.unwrap();
        f.service.start_transit(&f.worker, t.id, None).await.unwrap();

        let (s1, s2) = (f.service.clone(), f.service.clone());
        let (w1, w2) = (f.worker.clone(), f.worker.clone());
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { s1.complete(&w1, t.id).await }),
            tokio::spawn(async move { s2.complete(&w2, t.id).await }),
        );
        let results = [r1.unwrap(), r2.unwrap()];

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exatamente um concluidor deve vencer");
        for r in &results {
            if let Err(e) = r {
                assert!(matches!(
                    e,
                    AppError::InvalidTransition { .. } | AppError::Conflict(_)
                ));
            }
        }

        // Efeito líquido de Q, nunca 2Q nem 0.
        let at_from = f.store.stock_level(f.item, f.from).await.unwrap().unwrap();
        let at_to = f.store.stock_level(f.item, f.to).await.unwrap().unwrap();
        assert_eq!(at_from.quantity, 15);
        assert_eq!(at_to.quantity, 5);
        assert_eq!(f.store.history_for_item(f.item).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn store_failure_during_completion_rolls_the_status_back() {
        let f = fixture_with_stock(10, 0);
        let outage = Arc::new(OutageStore {
            inner: f.store.clone(),
            fail_next_completion: AtomicBool::new(true),
        });
        let service = TransferService::new(f.store.clone(), outage, EventBus::default());

        let t = service.create_request(&f.worker, new_request(&f, 4)).await.unwrap();
        service.approve(&f.admin, t.id).await.unwrap();
        service.start_transit(&f.worker, t.id, None).await.unwrap();

        let err = service.complete(&f.worker, t.id).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable));

        // Nenhum efeito aplicado e o pedido de volta a in_transit.
        let fresh = service.get(&f.admin, t.id).await.unwrap();
        assert_eq!(fresh.status, TransferStatus::InTransit);
        assert!(fresh.actual_arrival.is_none());
        let at_from = f.store.stock_level(f.item, f.from).await.unwrap().unwrap();
        assert_eq!(at_from.quantity, 10);
        assert!(f.store.history_for_item(f.item).await.unwrap().is_empty());

        // Com o store de volta, a repetição conclui normalmente.
        let (done, _) = service.complete(&f.worker, t.id).await.unwrap();
        assert_eq!(done.status, TransferStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_works_from_any_live_state_but_not_terminal() {
        let f = fixture();
        let t = f.service.create_request(&f.worker, new_request(&f, 1)).await.unwrap();
        f.service.approve(&f.admin, t.id).await.unwrap();
        let t = f.service.cancel(&f.worker, t.id).await.unwrap();
        assert_eq!(t.status, TransferStatus::Cancelled);

        let err = f.service.cancel(&f.worker, t.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn checkout_transfer_records_checkout_in_history() {
        let f = fixture();
        let bus = EventBus::default();
        let service = TransferService::new(f.store.clone(), f.store.clone(), bus.clone());
        let mut rx = bus.subscribe();

        let mut req = new_request(&f, 2);
        req.change_type = ChangeType::Checkout;
        let t = service.create_request(&f.worker, req).await.unwrap();
        service.approve(&f.admin, t.id).await.unwrap();
        service.start_transit(&f.worker, t.id, None).await.unwrap();
        service.complete(&f.worker, t.id).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if event.kind == EventKind::ItemCheckout {
                assert_eq!(event.transfer_id, Some(t.id));
            }
            kinds.push(event.kind);
        }
        assert!(kinds.contains(&EventKind::ItemCheckout));

        let entries = f.store.history_for_item(f.item).await.unwrap();
        assert_eq!(entries[0].change_type, ChangeType::Checkout);
    }

    #[tokio::test]
    async fn low_stock_alert_fires_when_threshold_is_reached() {
        let f = fixture_with_stock(10, 8);
        let bus = EventBus::default();
        let service = TransferService::new(f.store.clone(), f.store.clone(), bus.clone());
        let mut rx = bus.subscribe();

        let t = service.create_request(&f.worker, new_request(&f, 5)).await.unwrap();
        service.approve(&f.admin, t.id).await.unwrap();
        service.start_transit(&f.worker, t.id, None).await.unwrap();
        service.complete(&f.worker, t.id).await.unwrap();

        // Restaram 5 na origem, abaixo do limiar 8: o alerta tem que sair.
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        assert!(kinds.contains(&EventKind::LowStockAlert));
    }

    #[tokio::test]
    async fn worker_cannot_touch_someone_elses_transfer() {
        let f = fixture();
        let stranger = f.store.seed_user("intruso", "$2b$hash", UserRole::Worker);
        let t = f.service.create_request(&f.worker, new_request(&f, 1)).await.unwrap();

        let err = f.service.cancel(&stranger, t.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
