// src/main.rs

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;

use inventory_backend::config::AppState;
use inventory_backend::handlers;
use inventory_backend::middleware::auth::auth_guard;
use inventory_backend::services::sweeper::SessionSweeper;

#[tokio::main]
async fn main() {
    // Inicializa o logger.
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let app_state = AppState::new()
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Roda as migrações do SQLx na inicialização (só no backend Postgres).
    if let Some(pool) = &app_state.db_pool {
        sqlx::migrate!()
            .run(pool)
            .await
            .expect("Falha ao rodar as migrações do banco de dados.");
        tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");
    }

    // Define as rotas de autenticação (públicas)
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login));

    // Rotas de autenticação protegidas (precisam de sessão viva)
    let me_routes = Router::new()
        .route("/me", get(handlers::auth::get_me))
        .route("/logout", post(handlers::auth::logout))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Gestão de sessões do próprio usuário
    let session_routes = Router::new()
        .route(
            "/",
            get(handlers::sessions::list_my_sessions)
                .delete(handlers::sessions::revoke_all_sessions),
        )
        .route("/stats", get(handlers::sessions::my_session_stats))
        .route("/{sessionId}", delete(handlers::sessions::revoke_session))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // O fluxo de transferências
    let transfer_routes = Router::new()
        .route(
            "/",
            post(handlers::transfers::create_transfer).get(handlers::transfers::list_transfers),
        )
        .route("/{id}", get(handlers::transfers::get_transfer))
        .route("/{id}/approve", post(handlers::transfers::approve_transfer))
        .route("/{id}/reject", post(handlers::transfers::reject_transfer))
        .route("/{id}/ship", post(handlers::transfers::ship_transfer))
        .route("/{id}/complete", post(handlers::transfers::complete_transfer))
        .route("/{id}/cancel", post(handlers::transfers::cancel_transfer))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Histórico de localização por item
    let item_routes = Router::new()
        .route("/{id}/history", get(handlers::transfers::item_history))
        .route("/{id}/placement", post(handlers::transfers::record_placement))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Combina tudo no router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/auth", auth_routes.merge(me_routes))
        .nest("/api/sessions", session_routes)
        .nest("/api/transfers", transfer_routes)
        .nest("/api/items", item_routes)
        .with_state(app_state.clone());

    // A varredura de sessões expiradas: componente com início e fim,
    // construído aqui e encerrado no shutdown.
    let sweeper = SessionSweeper::start(app_state.session_service.clone(), app_state.sweep_interval);

    // Inicia o servidor
    let addr = "0.0.0.0:3000";
    let listener = TcpListener::bind(addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr().unwrap());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("Erro no servidor Axum");

    sweeper.stop().await;
}
