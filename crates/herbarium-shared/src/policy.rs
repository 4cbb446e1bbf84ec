//! Role-based authorization policy.
//!
//! A route declares the set of roles it admits; [`authorize`] answers allow
//! or deny for the acting role. Transport concerns (missing credentials,
//! status codes) stay in the server crate.

use crate::error::PolicyDenied;
use crate::types::Role;

/// Roles allowed to create and edit specimen records.
pub const CAN_CATALOG: &[Role] = &[Role::Admin, Role::Cataloger, Role::Curator];

/// Roles allowed to delete records and images.
pub const CAN_CURATE: &[Role] = &[Role::Admin, Role::Curator];

/// User administration.
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Returns `Ok(())` when `role` is one of `allowed`.
pub fn authorize(role: Role, allowed: &[Role]) -> Result<(), PolicyDenied> {
    if allowed.contains(&role) {
        return Ok(());
    }

    let required = allowed
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    Err(PolicyDenied { role, required })
}
