//! Row types and query parameters for the herbarium tables.

use chrono::{DateTime, Utc};
use herbarium_shared::{Role, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An account allowed to sign in to the catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Always stored lower-cased.
    pub email: String,
    /// Argon2 PHC string; never leaves the server.
    pub password_hash: String,
    pub role: Role,
    pub institution: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            institution: self.institution.clone(),
            is_active: self.is_active,
            last_login: self.last_login,
            created_at: self.created_at,
        }
    }
}

/// User view returned by the API (no password hash).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub institution: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Specimen queries
// ---------------------------------------------------------------------------

/// Filters for specimen list queries. Soft-deleted rows are always excluded.
///
/// `family`, `genus`, `country` and `state_province` match as
/// case-insensitive substrings, `year` exactly, and `search` matches either
/// the scientific name or the catalog number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecimenFilter {
    pub family: Option<String>,
    pub genus: Option<String>,
    pub country: Option<String>,
    pub state_province: Option<String>,
    pub year: Option<String>,
    pub search: Option<String>,
}

/// One bucket of a group-by count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupCount {
    #[serde(rename = "_id")]
    pub key: Option<String>,
    pub count: u64,
}
