use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{EncodingKey, Header, encode};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use sidelines_db::Database;
use sidelines_gateway::feed::ChangeFeed;
use sidelines_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::{ApiError, ApiResult};
use crate::middleware::Claims;

/// How long a one-time authorization code stays exchangeable.
const AUTH_CODE_TTL_MINUTES: i64 = 5;

/// Session lifetime.
const SESSION_TTL_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub feed: ChangeFeed,
    pub jwt_secret: String,
    /// Project reference embedded in the session cookie name.
    pub project_ref: String,
    pub service_key: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    // Validate input
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') || email.len() > 254 {
        return Err(ApiError::Validation("invalid email".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation("password must be at least 8 characters".into()));
    }
    let username = req.username.trim();
    if username.len() < 3
        || username.len() > 32
        || !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ApiError::Validation("username must be 3-32 letters, digits or underscores".into()));
    }

    if state.db.get_account_by_email(&email)?.is_some() {
        return Err(ApiError::Conflict("email already registered".into()));
    }
    if state.db.username_taken(username)? {
        return Err(ApiError::Conflict("username taken".into()));
    }

    let password_hash = hash_password(&req.password)?;

    let user_id = Uuid::new_v4();
    state
        .db
        .create_account(&user_id.to_string(), &email, username, &password_hash)?;

    let code = issue_auth_code(&state.db, user_id)?;
    info!("Registered account {}", user_id);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, code })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let account = state
        .db
        .get_account_by_email(&req.email.trim().to_lowercase())?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&account.password)
        .map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = account
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt account id '{}': {}", account.id, e))?;

    let token = create_token(&state.jwt_secret, user_id, &account.email)?;
    let code = issue_auth_code(&state.db, user_id)?;

    Ok(Json(LoginResponse { user_id, token, code }))
}

/// Argon2id hash with a fresh OS-random salt, in PHC string form.
fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn create_token(secret: &str, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Mint a one-time code for `account`. Only its digest is stored.
pub fn issue_auth_code(db: &Database, account: Uuid) -> anyhow::Result<String> {
    let raw: [u8; 32] = rand::random();
    let code = URL_SAFE_NO_PAD.encode(raw);
    let expires_at = chrono::Utc::now() + chrono::Duration::minutes(AUTH_CODE_TTL_MINUTES);
    db.store_auth_code(&code_digest(&code), &account.to_string(), expires_at)?;
    Ok(code)
}

pub fn code_digest(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}
