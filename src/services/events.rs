// src/services/events.rs

// Contrato de eventos para os colaboradores de notificação/webhook.
// Aqui só publicamos num canal broadcast; a entrega é problema de quem assina.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    TransferApprovalNeeded,
    TransferApproved,
    TransferRejected,
    ItemCheckout,
    ItemCheckin,
    LowStockAlert,
    SessionSuspicious,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TransferApprovalNeeded => "transfer-approval-needed",
            EventKind::TransferApproved => "transfer-approved",
            EventKind::TransferRejected => "transfer-rejected",
            EventKind::ItemCheckout => "item-checkout",
            EventKind::ItemCheckin => "item-checkin",
            EventKind::LowStockAlert => "low-stock-alert",
            EventKind::SessionSuspicious => "session-suspicious",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub kind: EventKind,
    pub item_id: Option<Uuid>,
    pub transfer_id: Option<Uuid>,
    pub actor_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(kind: EventKind, actor_id: Uuid) -> Self {
        Self {
            kind,
            item_id: None,
            transfer_id: None,
            actor_id,
            timestamp: Utc::now(),
        }
    }

    pub fn with_item(mut self, item_id: Uuid) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn with_transfer(mut self, transfer_id: Uuid) -> Self {
        self.transfer_id = Some(transfer_id);
        self
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: DomainEvent) {
        tracing::info!(
            "📣 Evento '{}' (item={:?}, transferência={:?}, ator={})",
            event.kind.as_str(),
            event.item_id,
            event.transfer_id,
            event.actor_id
        );
        // Sem assinantes não é erro: o canal simplesmente descarta.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
