use thiserror::Error;

use crate::types::Role;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token signature is invalid")]
    BadSignature,

    #[error("Token expired")]
    Expired,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Access denied for role {role}. Required role: {required}")]
pub struct PolicyDenied {
    pub role: Role,
    pub required: String,
}

#[derive(Error, Debug)]
pub enum SpecimenError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Invalid record payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}
