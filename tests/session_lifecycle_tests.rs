//! Ciclo de vida da sessão de ponta a ponta: registro, login, validação
//! de token, logout e revogação, tudo pelo gateway de autenticação.

use std::sync::Arc;

use chrono::{Duration, Utc};
use inventory_backend::common::error::AppError;
use inventory_backend::db::MemStore;
use inventory_backend::models::auth::UserRole;
use inventory_backend::models::session::{SessionMetadata, SessionStatus};
use inventory_backend::services::auth::AuthService;
use inventory_backend::services::events::{EventBus, EventKind};
use inventory_backend::services::session_service::{SessionConfig, SessionService};

const SECRET: &str = "segredo-de-teste";

fn gateway(store: &Arc<MemStore>, config: SessionConfig, bus: EventBus) -> AuthService {
    let sessions = SessionService::new(store.clone(), store.clone(), config, bus);
    AuthService::new(store.clone(), sessions, SECRET.to_owned())
}

fn sessions_of(auth_store: &Arc<MemStore>, config: SessionConfig) -> SessionService {
    SessionService::new(
        auth_store.clone(),
        auth_store.clone(),
        config,
        EventBus::default(),
    )
}

// Custo baixo só nos testes; o registro de verdade usa o DEFAULT_COST.
fn seed_login(store: &Arc<MemStore>, username: &str, password: &str) {
    let hash = bcrypt::hash(password, 4).unwrap();
    store.seed_user(username, &hash, UserRole::Worker);
}

fn metadata(ip: &str) -> SessionMetadata {
    SessionMetadata {
        user_agent: Some("cli-teste/1.0".into()),
        ip_address: Some(ip.into()),
        device_info: Some("notebook".into()),
        geo_country: Some("BR".into()),
        geo_city: None,
    }
}

#[tokio::test]
async fn register_then_login_then_validate() {
    let store = Arc::new(MemStore::new());
    let auth = gateway(&store, SessionConfig::default(), EventBus::default());

    let user = auth.register_user("neto", "senha-forte", UserRole::Admin).await.unwrap();
    let resp = auth.login_user("neto", "senha-forte", metadata("10.0.0.1")).await.unwrap();
    assert!(resp.expires_at > Utc::now());

    let (validated, session) = auth.validate_token(&resp.token).await.unwrap();
    assert_eq!(validated.id, user.id);
    assert_eq!(session.session_id, resp.session_id);
    assert_eq!(session.status, SessionStatus::Active);
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let store = Arc::new(MemStore::new());
    seed_login(&store, "ana", "correta");
    let auth = gateway(&store, SessionConfig::default(), EventBus::default());

    let err = auth.login_user("ana", "errada", metadata("10.0.0.1")).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));
    let err = auth.login_user("ninguem", "errada", metadata("10.0.0.1")).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));
}

#[tokio::test]
async fn logout_kills_the_token() {
    let store = Arc::new(MemStore::new());
    seed_login(&store, "ana", "senha123");
    let auth = gateway(&store, SessionConfig::default(), EventBus::default());

    let resp = auth.login_user("ana", "senha123", metadata("10.0.0.1")).await.unwrap();
    auth.validate_token(&resp.token).await.unwrap();

    let closed = auth.logout(&resp.session_id).await.unwrap();
    assert_eq!(closed.status, SessionStatus::Logout);

    // O token ainda não venceu, mas a sessão por trás dele já caiu.
    let err = auth.validate_token(&resp.token).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));
}

#[tokio::test]
async fn stale_session_is_rejected_before_the_sweep() {
    let store = Arc::new(MemStore::new());
    seed_login(&store, "ana", "senha123");
    let auth = gateway(&store, SessionConfig::default(), EventBus::default());

    let resp = auth.login_user("ana", "senha123", metadata("10.0.0.1")).await.unwrap();
    store.override_session_expiry(&resp.session_id, Utc::now() - Duration::minutes(1));

    let err = auth.validate_token(&resp.token).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));
}

#[tokio::test]
async fn revoke_all_closes_every_device() {
    let store = Arc::new(MemStore::new());
    seed_login(&store, "ana", "senha123");
    let auth = gateway(&store, SessionConfig::default(), EventBus::default());
    let sessions = sessions_of(&store, SessionConfig::default());

    let first = auth.login_user("ana", "senha123", metadata("10.0.0.1")).await.unwrap();
    let second = auth.login_user("ana", "senha123", metadata("10.0.0.2")).await.unwrap();

    let (user, _) = auth.validate_token(&first.token).await.unwrap();
    let revoked = sessions.revoke_all(user.id).await.unwrap();
    assert_eq!(revoked, 2);

    for token in [&first.token, &second.token] {
        let err = auth.validate_token(token).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }
    assert!(sessions.list_active(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn session_ceiling_is_enforced_during_login() {
    let store = Arc::new(MemStore::new());
    seed_login(&store, "ana", "senha123");
    let config = SessionConfig { max_sessions_per_user: 2, ..SessionConfig::default() };
    let auth = gateway(&store, config.clone(), EventBus::default());
    let sessions = sessions_of(&store, config);

    let first = auth.login_user("ana", "senha123", metadata("10.0.0.1")).await.unwrap();
    let (user, _) = auth.validate_token(&first.token).await.unwrap();
    let second = auth.login_user("ana", "senha123", metadata("10.0.0.2")).await.unwrap();
    // O terceiro login derruba a sessão mais parada (a primeira).
    store.override_session_activity(&first.session_id, Utc::now() - Duration::hours(1));
    let third = auth.login_user("ana", "senha123", metadata("10.0.0.3")).await.unwrap();

    let err = auth.validate_token(&first.token).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));
    auth.validate_token(&second.token).await.unwrap();
    auth.validate_token(&third.token).await.unwrap();
    assert_eq!(sessions.list_active(user.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn burst_of_sources_raises_the_suspicion_event() {
    let store = Arc::new(MemStore::new());
    seed_login(&store, "ana", "senha123");
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let auth = gateway(&store, SessionConfig::default(), bus);

    for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
        auth.login_user("ana", "senha123", metadata(ip)).await.unwrap();
    }

    let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&EventKind::SessionSuspicious));
}
