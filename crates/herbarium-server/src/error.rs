use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use herbarium_media::MediaError;
use herbarium_shared::error::{PolicyDenied, SpecimenError, TokenError};
use herbarium_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("No image files were provided")]
    NoFilesProvided,

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Image could not be decoded: {0}")]
    CorruptImage(String),

    #[error("QR code generation failed: {0}")]
    QrEncodingFailed(String),

    #[error("{0}")]
    DuplicateKey(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Stable machine-readable tag sent in the `error` field.
    pub fn tag(&self) -> &'static str {
        match self {
            ServerError::Validation(_) => "VALIDATION_ERROR",
            ServerError::NotFound(_) => "NOT_FOUND",
            ServerError::ImageNotFound(_) => "IMAGE_NOT_FOUND",
            ServerError::NoFilesProvided => "NO_FILES_PROVIDED",
            ServerError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            ServerError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ServerError::CorruptImage(_) => "CORRUPT_IMAGE",
            ServerError::QrEncodingFailed(_) => "QR_ENCODING_FAILED",
            ServerError::DuplicateKey(_) => "DUPLICATE_KEY",
            ServerError::Unauthorized(_) => "UNAUTHORIZED",
            ServerError::Forbidden(_) => "FORBIDDEN",
            ServerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_) | ServerError::NoFilesProvided => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) | ServerError::ImageNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::CorruptImage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::DuplicateKey(_) => StatusCode::CONFLICT,
            ServerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::QrEncodingFailed(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn not_found() -> Self {
        ServerError::NotFound("Specimen not found".to_string())
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServerError::not_found(),
            StoreError::DuplicateKey(column) => {
                ServerError::DuplicateKey(format!("A record with this {column} already exists"))
            }
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<MediaError> for ServerError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::UnsupportedMediaType(msg) => ServerError::UnsupportedMediaType(msg),
            MediaError::PayloadTooLarge(msg) => ServerError::PayloadTooLarge(msg),
            MediaError::CorruptImage(msg) => ServerError::CorruptImage(msg),
            MediaError::QrEncodingFailed(msg) => ServerError::QrEncodingFailed(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<SpecimenError> for ServerError {
    fn from(err: SpecimenError) -> Self {
        ServerError::Validation(err.to_string())
    }
}

impl From<PolicyDenied> for ServerError {
    fn from(err: PolicyDenied) -> Self {
        ServerError::Forbidden(err.to_string())
    }
}

impl From<TokenError> for ServerError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ServerError::Unauthorized("Token expired".into()),
            _ => ServerError::Unauthorized("Invalid token".into()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "Internal server error".to_string()
            }
            ServerError::QrEncodingFailed(detail) => {
                tracing::error!(error = %detail, "QR encoding failed");
                "QR code generation failed".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "success": false,
            "error": self.tag(),
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
