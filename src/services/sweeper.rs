// src/services/sweeper.rs

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::services::session_service::SessionService;

// A varredura de expiração como componente com ciclo de vida próprio:
// o main constrói, guarda e encerra. Nada de singleton de módulo.
pub struct SessionSweeper {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl SessionSweeper {
    pub fn start(service: SessionService, every: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // A varredura é idempotente e condicional por registro,
                        // então pode rodar junto com logins/logouts ao vivo.
                        if let Err(e) = service.cleanup_expired().await {
                            tracing::warn!("Varredura de sessões falhou: {}", e);
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
            tracing::info!("🛑 Varredura de sessões encerrada");
        });
        Self { handle, shutdown }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
