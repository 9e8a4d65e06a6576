// src/config.rs

use std::sync::Arc;
use std::{env, str::FromStr, time::Duration};

use chrono::Duration as ChronoDuration;
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{
    db::{
        MemStore, PgInventoryRepository, PgSessionRepository, PgTransferRepository,
        PgUserRepository,
    },
    models::auth::UserRole,
    services::{
        auth::AuthService,
        events::EventBus,
        history_service::HistoryService,
        session_service::{SessionConfig, SessionService},
        transfer_service::TransferService,
    },
};

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    // Presente apenas no backend Postgres (o modo memória não tem pool).
    pub db_pool: Option<PgPool>,
    pub auth_service: AuthService,
    pub session_service: SessionService,
    pub transfer_service: TransferService,
    pub history_service: HistoryService,
    pub events: EventBus,
    pub sweep_interval: Duration,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppState {
    // A assinatura retorna um Result: se a configuração falhar, o main decide.
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET deve ser definido");

        let session_config = SessionConfig {
            ttl: ChronoDuration::hours(env_or("SESSION_TTL_HOURS", 24)),
            rolling: env_or("SESSION_ROLLING", false),
            max_sessions_per_user: env_or("SESSION_MAX_PER_USER", 5),
            suspicious_window_minutes: env_or("SUSPICIOUS_WINDOW_MINUTES", 30),
            suspicious_distinct_sources: env_or("SUSPICIOUS_DISTINCT_SOURCES", 3),
        };
        let sweep_interval = Duration::from_secs(env_or("SWEEP_INTERVAL_SECS", 300));

        let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| "postgres".to_string());
        if backend == "memory" {
            tracing::info!("🧪 Backend de memória ativo (modo de desenvolvimento)");
            let store = Arc::new(MemStore::new());
            seed_demo_data(&store);
            return Ok(Self::build(
                None,
                store.clone(),
                store.clone(),
                store.clone(),
                store,
                jwt_secret,
                session_config,
                sweep_interval,
            ));
        }

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");

        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        Ok(Self::build(
            Some(db_pool.clone()),
            Arc::new(PgUserRepository::new(db_pool.clone())),
            Arc::new(PgSessionRepository::new(db_pool.clone())),
            Arc::new(PgInventoryRepository::new(db_pool.clone())),
            Arc::new(PgTransferRepository::new(db_pool)),
            jwt_secret,
            session_config,
            sweep_interval,
        ))
    }

    // --- Monta o gráfico de dependências ---
    #[allow(clippy::too_many_arguments)]
    fn build(
        db_pool: Option<PgPool>,
        users: Arc<dyn crate::db::UserStore>,
        sessions: Arc<dyn crate::db::SessionStore>,
        inventory: Arc<dyn crate::db::InventoryStore>,
        transfers: Arc<dyn crate::db::TransferStore>,
        jwt_secret: String,
        session_config: SessionConfig,
        sweep_interval: Duration,
    ) -> Self {
        let events = EventBus::default();
        let session_service = SessionService::new(
            sessions,
            users.clone(),
            session_config,
            events.clone(),
        );
        let auth_service =
            AuthService::new(users.clone(), session_service.clone(), jwt_secret);
        let transfer_service =
            TransferService::new(transfers, inventory.clone(), events.clone());
        let history_service = HistoryService::new(inventory, users);

        Self {
            db_pool,
            auth_service,
            session_service,
            transfer_service,
            history_service,
            events,
            sweep_interval,
        }
    }
}

// Dados de demonstração do modo memória: um admin, um operador, dois locais
// e um item com saldo, para a API ser utilizável sem banco.
fn seed_demo_data(store: &MemStore) {
    let hash = |pwd: &str| bcrypt::hash(pwd, 4).expect("hash de demonstração");
    store.seed_user("admin", &hash("admin123"), UserRole::Admin);
    store.seed_user("operador", &hash("operador123"), UserRole::Worker);

    let a = store.seed_location("Depósito Central");
    let _b = store.seed_location("Filial Norte");
    let item = store.seed_item("Notebook Dell", Some(a.id), 20);
    store.seed_stock(item.id, a.id, 20, 5);

    tracing::info!("🌱 Dados de demonstração semeados (admin/admin123)");
}
