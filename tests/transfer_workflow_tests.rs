//! Fluxo completo de transferência exercitado pelos services, do pedido
//! à conclusão, com o razão de localização e o contrato de eventos.

use std::sync::Arc;

use inventory_backend::common::error::AppError;
use inventory_backend::db::{InventoryStore, MemStore};
use inventory_backend::models::auth::{User, UserRole};
use inventory_backend::models::inventory::ChangeType;
use inventory_backend::models::transfer::{NewTransferRequest, TransferStatus};
use inventory_backend::services::events::{EventBus, EventKind};
use inventory_backend::services::transfer_service::TransferService;
use uuid::Uuid;

struct World {
    store: Arc<MemStore>,
    service: TransferService,
    bus: EventBus,
    admin: User,
    worker: User,
    item: Uuid,
    from: Uuid,
    to: Uuid,
}

fn world() -> World {
    let store = Arc::new(MemStore::new());
    let bus = EventBus::default();
    let admin = store.seed_user("chefe", "$2b$hash", UserRole::Admin);
    let worker = store.seed_user("operador", "$2b$hash", UserRole::Worker);
    let from = store.seed_location("Depósito Central");
    let to = store.seed_location("Filial Norte");
    let item = store.seed_item("Projetor", Some(from.id), 12);
    store.seed_stock(item.id, from.id, 12, 2);
    let service = TransferService::new(store.clone(), store.clone(), bus.clone());
    World { store, service, bus, admin, worker, item: item.id, from: from.id, to: to.id }
}

fn request(w: &World, qty: i64) -> NewTransferRequest {
    NewTransferRequest {
        item_id: w.item,
        from_location_id: w.from,
        to_location_id: w.to,
        quantity: qty,
        requested_by: w.worker.id,
        reason: Some("Remanejamento".into()),
        notes: None,
        change_type: ChangeType::Manual,
        estimated_arrival: None,
    }
}

#[tokio::test]
async fn end_to_end_flow_keeps_the_ledger_invariant() {
    let w = world();

    let t = w.service.create_request(&w.worker, request(&w, 5)).await.unwrap();
    let t = w.service.approve(&w.admin, t.id).await.unwrap();
    let t = w.service.start_transit(&w.worker, t.id, None).await.unwrap();
    let (t, _) = w.service.complete(&w.worker, t.id).await.unwrap();
    assert_eq!(t.status, TransferStatus::Completed);

    // Saldos: origem 12-5, destino 0+5.
    let at_from = w.store.stock_level(w.item, w.from).await.unwrap().unwrap();
    let at_to = w.store.stock_level(w.item, w.to).await.unwrap().unwrap();
    assert_eq!(at_from.quantity, 7);
    assert_eq!(at_to.quantity, 5);

    // Invariante do razão: o lançamento mais recente aponta para o local
    // corrente do item.
    let history = w.store.history_for_item(w.item).await.unwrap();
    assert_eq!(history.len(), 1);
    let item = w.store.find_item(w.item).await.unwrap().unwrap();
    assert_eq!(item.current_location_id, Some(history[0].to_location_id));
    assert_eq!(history[0].from_location_id, Some(w.from));
}

#[tokio::test]
async fn event_contract_follows_the_transitions() {
    let w = world();
    let mut rx = w.bus.subscribe();

    let t = w.service.create_request(&w.worker, request(&w, 3)).await.unwrap();
    w.service.approve(&w.admin, t.id).await.unwrap();

    let first = rx.try_recv().unwrap();
    assert_eq!(first.kind, EventKind::TransferApprovalNeeded);
    assert_eq!(first.item_id, Some(w.item));
    assert_eq!(first.transfer_id, Some(t.id));
    assert_eq!(first.actor_id, w.worker.id);

    let second = rx.try_recv().unwrap();
    assert_eq!(second.kind, EventKind::TransferApproved);
    assert_eq!(second.actor_id, w.admin.id);
}

#[tokio::test]
async fn rejection_emits_and_freezes_the_request() {
    let w = world();
    let mut rx = w.bus.subscribe();

    let t = w.service.create_request(&w.worker, request(&w, 3)).await.unwrap();
    w.service.reject(&w.admin, t.id).await.unwrap();

    let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&EventKind::TransferRejected));

    // Nenhuma transição sai de um estado terminal.
    let err = w.service.start_transit(&w.worker, t.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
    let err = w.service.cancel(&w.worker, t.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
}

#[tokio::test]
async fn workers_only_see_their_own_transfers() {
    let w = world();
    let colleague = w.store.seed_user("colega", "$2b$hash", UserRole::Worker);

    w.service.create_request(&w.worker, request(&w, 1)).await.unwrap();
    let mine = NewTransferRequest {
        requested_by: colleague.id,
        ..request(&w, 2)
    };
    w.service.create_request(&colleague, mine).await.unwrap();

    assert_eq!(w.service.list(&w.worker).await.unwrap().len(), 1);
    assert_eq!(w.service.list(&colleague).await.unwrap().len(), 1);
    // O admin enxerga tudo.
    assert_eq!(w.service.list(&w.admin).await.unwrap().len(), 2);
}

#[tokio::test]
async fn completing_two_requests_against_the_same_stock_serializes() {
    let w = world();
    let t1 = w.service.create_request(&w.worker, request(&w, 8)).await.unwrap();
    let t2 = w.service.create_request(&w.worker, request(&w, 8)).await.unwrap();
    for id in [t1.id, t2.id] {
        w.service.approve(&w.admin, id).await.unwrap();
        w.service.start_transit(&w.worker, id, None).await.unwrap();
    }

    let (s1, s2) = (w.service.clone(), w.service.clone());
    let (a, b) = (w.worker.clone(), w.worker.clone());
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { s1.complete(&a, t1.id).await }),
        tokio::spawn(async move { s2.complete(&b, t2.id).await }),
    );
    let results = [r1.unwrap(), r2.unwrap()];

    // Só existe saldo para um dos dois: um vence, o outro leva Conflict.
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);

    let at_from = w.store.stock_level(w.item, w.from).await.unwrap().unwrap();
    let at_to = w.store.stock_level(w.item, w.to).await.unwrap().unwrap();
    assert_eq!(at_from.quantity + at_to.quantity, 12);
    assert_eq!(at_to.quantity, 8);
    assert_eq!(w.store.history_for_item(w.item).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_references_are_rejected_on_create() {
    let w = world();
    let mut bad = request(&w, 1);
    bad.item_id = Uuid::new_v4();
    let err = w.service.create_request(&w.worker, bad).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound("Item")));

    let mut bad = request(&w, 1);
    bad.to_location_id = bad.from_location_id;
    let err = w.service.create_request(&w.worker, bad).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}
