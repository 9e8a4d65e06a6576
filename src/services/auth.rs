// src/services/auth.rs

use std::sync::Arc;

use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::{
    common::error::AppError,
    db::UserStore,
    models::{
        auth::{AuthResponse, Claims, User, UserRole},
        session::{SessionLog, SessionMetadata},
    },
    services::session_service::SessionService,
};

// Gateway de autenticação: valida credenciais, emite token e delega toda a
// contabilidade de sessão ao SessionService.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: SessionService,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, sessions: SessionService, jwt_secret: String) -> Self {
        Self { users, sessions, jwt_secret }
    }

    pub async fn register_user(
        &self,
        username: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User, AppError> {
        // Hashing fora do executor async, como sempre.
        let password_clone = password.to_owned();
        let hashed_password =
            tokio::task::spawn_blocking(move || hash(&password_clone, bcrypt::DEFAULT_COST))
                .await
                .map_err(|e| anyhow::anyhow!("Falha na task de hashing: {}", e))??;

        self.users.create_user(username, &hashed_password, role).await
    }

    pub async fn login_user(
        &self,
        username: &str,
        password: &str,
        metadata: SessionMetadata,
    ) -> Result<AuthResponse, AppError> {
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let password_clone = password.to_owned();
        let password_hash_clone = user.password_hash.clone();

        // Executa a verificação em um thread separado
        let is_password_valid =
            tokio::task::spawn_blocking(move || verify(&password_clone, &password_hash_clone))
                .await
                .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;

        if !is_password_valid {
            return Err(AppError::InvalidCredentials);
        }

        let session = self.sessions.create_session(user.id, metadata).await?;

        // Teto de sessões: derruba as mais paradas antes de devolver o token.
        let max = self.sessions.config().max_sessions_per_user;
        self.sessions.enforce_session_limit(user.id, max).await?;

        // A detecção só sinaliza (evento + log); nenhuma sessão cai aqui.
        self.sessions.detect_suspicious_activity(user.id).await?;

        let token = self.create_token(&user, &session)?;
        Ok(AuthResponse {
            token,
            session_id: session.session_id,
            expires_at: session.expires_at,
        })
    }

    /// Valida o token, carrega o usuário e confere a sessão viva. A sessão
    /// com status ativo mas vencida conta como expirada mesmo antes da
    /// varredura; o toque de atividade aplica a política rolante.
    pub async fn validate_token(&self, token: &str) -> Result<(User, SessionLog), AppError> {
        let validation = Validation::default();
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &validation,
        )
        .map_err(|_| AppError::InvalidToken)?;

        let claims = token_data.claims;
        let session = self
            .sessions
            .find(&claims.sid)
            .await?
            .ok_or(AppError::InvalidToken)?;
        if !session.is_live(Utc::now()) {
            return Err(AppError::InvalidToken);
        }

        let session = self.sessions.touch_activity(&claims.sid).await?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AppError::InvalidToken)?;

        Ok((user, session))
    }

    pub async fn logout(&self, session_id: &str) -> Result<SessionLog, AppError> {
        self.sessions.logout(session_id).await
    }

    fn create_token(&self, user: &User, session: &SessionLog) -> Result<String, AppError> {
        let now = Utc::now();

        // O token morre junto com a sessão que ele referencia.
        let claims = Claims {
            sub: user.id,
            sid: session.session_id.clone(),
            exp: session.expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )?)
    }
}
