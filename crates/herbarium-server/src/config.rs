//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development. A `.env` file is honoured by the
//! binaries (loaded with `dotenvy` before [`ServerConfig::from_env`]).

use std::net::SocketAddr;
use std::path::PathBuf;

use ed25519_dalek::SigningKey;
use herbarium_shared::constants::APP_NAME;
use herbarium_shared::StorageMode;
use rand::rngs::OsRng;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./herbarium.db`
    pub database_path: PathBuf,

    /// Root of the static upload tree, served at `/uploads`.
    /// Env: `UPLOAD_DIR`
    /// Default: `./uploads`
    pub upload_dir: PathBuf,

    /// Where processed image variants are kept.
    /// Env: `IMAGE_STORAGE_MODE` (`file`, `inline`; `base64` is an alias)
    /// Default: `file`
    pub storage_mode: StorageMode,

    /// Base of every record's public URL.
    /// Env: `PUBLIC_BASE_URL`
    /// Default: `http://localhost:3000`
    pub public_base_url: String,

    /// Ed25519 seed used to sign access tokens (hex, 64 chars).
    /// Env: `TOKEN_SIGNING_KEY`
    /// Default: none (a random key per process; tokens die on restart).
    pub token_signing_seed: Option<[u8; 32]>,

    /// Access-token lifetime in hours.
    /// Env: `TOKEN_TTL_HOURS`
    /// Default: `168`
    pub token_ttl_hours: i64,

    /// Default administrator, created on startup when missing.
    /// Env: `ADMIN_EMAIL`, `ADMIN_PASSWORD`, `ADMIN_NAME`
    pub admin_email: String,
    pub admin_password: String,
    pub admin_name: String,

    /// Name reported by the public stats endpoint.
    /// Env: `COLLECTION_NAME`
    pub collection_name: String,

    /// Request body cap in bytes (60 MiB covers 5 uploads of 10 MiB).
    /// Env: `MAX_BODY_BYTES`
    pub max_body_bytes: usize,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("upload_dir", &self.upload_dir)
            .field("storage_mode", &self.storage_mode)
            .field("public_base_url", &self.public_base_url)
            .field("token_signing_seed", &self.token_signing_seed.map(|_| "<set>"))
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("admin_email", &self.admin_email)
            .field("collection_name", &self.collection_name)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 3000).into(),
            database_path: PathBuf::from("./herbarium.db"),
            upload_dir: PathBuf::from("./uploads"),
            storage_mode: StorageMode::File,
            public_base_url: "http://localhost:3000".to_string(),
            token_signing_seed: None,
            token_ttl_hours: 168,
            admin_email: "admin@utpl.edu.ec".to_string(),
            admin_password: "Admin123!".to_string(),
            admin_name: "Administrador UTPL".to_string(),
            collection_name: APP_NAME.to_string(),
            max_body_bytes: 60 * 1024 * 1024, // 60 MiB
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = var("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(path);
        }

        if let Some(mode) = var("IMAGE_STORAGE_MODE") {
            match mode.parse::<StorageMode>() {
                Ok(parsed) => config.storage_mode = parsed,
                Err(e) => tracing::warn!(error = %e, "Invalid IMAGE_STORAGE_MODE, using default"),
            }
        }

        if let Some(url) = var("PUBLIC_BASE_URL") {
            let url = url.trim().trim_end_matches('/').to_string();
            if !url.is_empty() {
                config.public_base_url = url;
            }
        }

        if let Some(hex_key) = var("TOKEN_SIGNING_KEY") {
            match parse_hex_seed(&hex_key) {
                Ok(seed) => config.token_signing_seed = Some(seed),
                Err(e) => tracing::warn!(
                    error = %e,
                    "Invalid TOKEN_SIGNING_KEY, a random key will be used"
                ),
            }
        }

        if let Some(val) = var("TOKEN_TTL_HOURS") {
            match val.parse::<i64>() {
                Ok(hours) if hours > 0 => config.token_ttl_hours = hours,
                _ => tracing::warn!(value = %val, "Invalid TOKEN_TTL_HOURS, using default"),
            }
        }

        if let Some(email) = var("ADMIN_EMAIL") {
            config.admin_email = email.trim().to_lowercase();
        }
        if let Some(password) = var("ADMIN_PASSWORD") {
            config.admin_password = password;
        }
        if let Some(name) = var("ADMIN_NAME") {
            config.admin_name = name;
        }

        if let Some(name) = var("COLLECTION_NAME") {
            config.collection_name = name;
        }

        if let Some(val) = var("MAX_BODY_BYTES") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_body_bytes = n;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    /// Directory holding file-mode image variants.
    pub fn images_dir(&self) -> PathBuf {
        self.upload_dir.join("images")
    }

    pub fn signing_key(&self) -> SigningKey {
        match self.token_signing_seed {
            Some(seed) => SigningKey::from_bytes(&seed),
            None => {
                tracing::warn!(
                    "TOKEN_SIGNING_KEY not set; issuing tokens with an ephemeral key"
                );
                SigningKey::generate(&mut OsRng)
            }
        }
    }
}

/// Parse a 64-character hex string into a 32-byte seed.
fn parse_hex_seed(raw: &str) -> Result<[u8; 32], String> {
    let raw = raw.trim();
    if raw.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", raw.len()));
    }
    let bytes = hex::decode(raw).map_err(|e| e.to_string())?;
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&bytes);
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 3000).into());
        assert_eq!(config.storage_mode, StorageMode::File);
        assert_eq!(config.images_dir(), PathBuf::from("./uploads/images"));
        assert!(config.token_signing_seed.is_none());
    }

    #[test]
    fn test_overrides() {
        let seed = "ab".repeat(32);
        let config = from_map(&[
            ("HTTP_ADDR", "127.0.0.1:8081"),
            ("IMAGE_STORAGE_MODE", "base64"),
            ("PUBLIC_BASE_URL", "https://herbario.utpl.edu.ec/"),
            ("TOKEN_SIGNING_KEY", seed.as_str()),
            ("ADMIN_EMAIL", " Curador@UTPL.edu.ec "),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 8081).into());
        assert_eq!(config.storage_mode, StorageMode::Inline);
        assert_eq!(config.public_base_url, "https://herbario.utpl.edu.ec");
        assert_eq!(config.token_signing_seed, Some([0xab; 32]));
        assert_eq!(config.admin_email, "curador@utpl.edu.ec");
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = from_map(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("IMAGE_STORAGE_MODE", "s3"),
            ("TOKEN_SIGNING_KEY", "abcd"),
            ("TOKEN_TTL_HOURS", "-4"),
        ]);
        let defaults = ServerConfig::default();
        assert_eq!(config.http_addr, defaults.http_addr);
        assert_eq!(config.storage_mode, StorageMode::File);
        assert!(config.token_signing_seed.is_none());
        assert_eq!(config.token_ttl_hours, 168);
    }

    #[test]
    fn test_signing_key_is_stable_for_seed() {
        let seed = "01".repeat(32);
        let config = from_map(&[("TOKEN_SIGNING_KEY", seed.as_str())]);
        assert_eq!(
            config.signing_key().verifying_key(),
            config.signing_key().verifying_key()
        );
    }
}
