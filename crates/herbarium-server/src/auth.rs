//! Accounts and bearer authentication.
//!
//! Passwords are stored as Argon2 PHC strings. Access tokens are the signed
//! claims from `herbarium_shared::token`; the extractor re-reads the user
//! on every request so deactivation and role changes apply immediately.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use herbarium_shared::constants::MIN_PASSWORD_LEN;
use herbarium_shared::policy::{authorize, ADMIN_ONLY};
use herbarium_shared::token::{issue_token, verify_token, AccessToken};
use herbarium_shared::{Role, UserId};
use herbarium_store::{Database, PublicUser, StoreError, User};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::api::{AppState, Envelope};
use crate::error::ServerError;

const DEFAULT_INSTITUTION: &str = "Universidad Técnica Particular de Loja";

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

impl AuthUser {
    pub fn id(&self) -> UserId {
        self.user.id
    }

    /// Fail with `Forbidden` unless the caller holds one of `allowed`.
    pub fn require(&self, allowed: &[Role]) -> Result<(), ServerError> {
        authorize(self.user.role, allowed)?;
        Ok(())
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ServerError::Unauthorized("Authentication token required".into()))?;

        let token = AccessToken::decode(raw)?;
        verify_token(&token, &state.signing_key.verifying_key())?;

        let lookup = state.db.lock().await.get_user(token.user_id);
        let user = match lookup {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                return Err(ServerError::Unauthorized("User no longer exists".into()))
            }
            Err(e) => return Err(e.into()),
        };

        if !user.is_active {
            return Err(ServerError::Unauthorized("Account is deactivated".into()));
        }

        Ok(AuthUser { user })
    }
}

pub fn hash_password(password: &str) -> Result<String, ServerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServerError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is unreadable");
            false
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<String>,
    pub institution: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct UsersData {
    pub users: Vec<PublicUser>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub user: PublicUser,
}

/// Validate a registration and build the user row. Open registration
/// cannot grant ADMIN.
pub fn new_user(req: RegisterRequest) -> Result<User, ServerError> {
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if name.is_empty() {
        return Err(ServerError::Validation("Name is required".into()));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(ServerError::Validation("A valid email is required".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServerError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let role = match req.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        None => Role::Cataloger,
        Some(raw) => raw.parse::<Role>().map_err(ServerError::Validation)?,
    };
    if role == Role::Admin {
        return Err(ServerError::Forbidden(
            "The ADMIN role cannot be self-assigned".into(),
        ));
    }

    let institution = req
        .institution
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| DEFAULT_INSTITUTION.to_string());

    let now = Utc::now();
    Ok(User {
        id: UserId::new(),
        name,
        email,
        password_hash: hash_password(&req.password)?,
        role,
        institution,
        is_active: true,
        last_login: None,
        created_at: now,
        updated_at: now,
    })
}

/// Check credentials and record the login. Unknown email and wrong password
/// are indistinguishable to the caller.
///
/// The database lock is released while the hash is verified on the
/// blocking pool.
pub async fn authenticate(db: &Mutex<Database>, req: LoginRequest) -> Result<User, ServerError> {
    let invalid = || ServerError::Unauthorized("Invalid credentials".into());

    let user = db
        .lock()
        .await
        .find_user_by_email(&req.email)?
        .ok_or_else(invalid)?;

    let stored_hash = user.password_hash.clone();
    let matches =
        tokio::task::spawn_blocking(move || verify_password(&req.password, &stored_hash))
            .await
            .map_err(|e| ServerError::Internal(format!("password check task failed: {e}")))?;
    if !matches {
        return Err(invalid());
    }
    if !user.is_active {
        return Err(ServerError::Forbidden("Account is deactivated".into()));
    }

    let now = Utc::now();
    db.lock().await.record_login(user.id, now)?;
    Ok(User {
        last_login: Some(now),
        updated_at: now,
        ..user
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Envelope<UserData>>), ServerError> {
    let user = tokio::task::spawn_blocking(move || new_user(req))
        .await
        .map_err(|e| ServerError::Internal(format!("registration task failed: {e}")))??;

    state.db.lock().await.create_user(&user)?;
    info!(user_id = %user.id.short(), role = %user.role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(
            "User registered",
            UserData {
                user: user.to_public(),
            },
        )),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Envelope<LoginData>>, ServerError> {
    let user = authenticate(&state.db, req).await?;

    let expires_at = Utc::now() + Duration::hours(state.config.token_ttl_hours);
    let token = issue_token(user.id, user.role, expires_at, &state.signing_key);
    info!(user_id = %user.id.short(), "User logged in");

    Ok(Json(Envelope::with_message(
        "Login successful",
        LoginData {
            token: token.encode(),
            token_type: "Bearer",
            expires_at,
            user: user.to_public(),
        },
    )))
}

pub async fn profile(auth: AuthUser) -> Json<Envelope<UserData>> {
    Json(Envelope::new(UserData {
        user: auth.user.to_public(),
    }))
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Envelope<UsersData>>, ServerError> {
    auth.require(ADMIN_ONLY)?;
    let users = state.db.lock().await.list_users()?;
    Ok(Json(Envelope::new(UsersData {
        users: users.iter().map(User::to_public).collect(),
    })))
}
