//! # herbarium-media
//!
//! Image ingestion for specimen records: decoding and re-encoding uploads
//! into primary and thumbnail variants, persisting the variants in the
//! configured storage mode, validating upload batches, and rendering the
//! QR artifact that links a physical sheet to its public record.

pub mod asset_store;
pub mod codec;
pub mod intake;
pub mod qr;

mod error;

pub use asset_store::{AssetStorage, FsAssetStorage, ImageStore};
pub use codec::{ImageCodec, ImageConfig, ProcessedImage};
pub use error::MediaError;
pub use intake::{UploadEntry, UploadIntake};
pub use qr::{QrGenerator, QrPayload};
