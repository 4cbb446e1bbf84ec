//! Startup seeding of the default administrator account.

use chrono::Utc;
use herbarium_shared::{Role, UserId};
use herbarium_store::{Database, User};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::auth::hash_password;
use crate::config::ServerConfig;
use crate::error::ServerError;

const ADMIN_INSTITUTION: &str = "Universidad Técnica Particular de Loja";

/// Create the configured administrator unless an account with that email
/// already exists. Returns `true` when an account was created.
pub async fn ensure_admin(db: &Mutex<Database>, config: &ServerConfig) -> Result<bool, ServerError> {
    if db.lock().await.find_user_by_email(&config.admin_email)?.is_some() {
        debug!(email = %config.admin_email, "Admin account already present");
        return Ok(false);
    }

    let password = config.admin_password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServerError::Internal(format!("hashing task failed: {e}")))??;

    let now = Utc::now();
    let admin = User {
        id: UserId::new(),
        name: config.admin_name.clone(),
        email: config.admin_email.trim().to_lowercase(),
        password_hash,
        role: Role::Admin,
        institution: ADMIN_INSTITUTION.to_string(),
        is_active: true,
        last_login: None,
        created_at: now,
        updated_at: now,
    };
    db.lock().await.create_user(&admin)?;

    info!(email = %admin.email, "Default admin account created");
    Ok(true)
}
