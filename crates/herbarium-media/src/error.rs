use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Corrupt image: {0}")]
    CorruptImage(String),

    #[error("Image encoding failed: {0}")]
    Encode(String),

    #[error("QR encoding failed: {0}")]
    QrEncodingFailed(String),

    #[error("Invalid asset path: {0}")]
    InvalidPath(String),

    #[error("Asset storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
