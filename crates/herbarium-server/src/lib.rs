//! # herbarium-server
//!
//! HTTP backend for the UTPL herbarium catalogue.
//!
//! - **Lifecycle** ([`lifecycle`]): create, update, attach and detach
//!   images, soft delete, plus the bulk QR regeneration and import used by
//!   the `herbarium-admin` binary
//! - **Access** ([`access`]): paginated lists, lookups and statistics
//! - **REST API** ([`api`]): axum router with bearer authentication
//!   ([`auth`]), public read paths and static serving of uploaded images

pub mod access;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod form;
pub mod lifecycle;
pub mod seed;

pub use api::{create_router, serve, AppState};
pub use config::ServerConfig;
pub use error::ServerError;
pub use lifecycle::Catalog;
