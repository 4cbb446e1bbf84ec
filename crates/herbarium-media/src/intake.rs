//! Upload Intake.
//!
//! Validates a whole batch before any codec work, then processes entries
//! sequentially in submission order. The first failure aborts the batch.

use bytes::Bytes;
use herbarium_shared::constants::{ALLOWED_IMAGE_MIMES, MAX_UPLOAD_FILES, MAX_UPLOAD_FILE_SIZE};
use herbarium_shared::ImageDescriptor;
use tracing::{info, warn};

use crate::asset_store::ImageStore;
use crate::error::MediaError;

/// One raw file part of an upload request.
#[derive(Debug, Clone)]
pub struct UploadEntry {
    pub original_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Clone)]
pub struct UploadIntake {
    store: ImageStore,
    max_files: usize,
    max_file_size: usize,
}

impl UploadIntake {
    pub fn new(store: ImageStore) -> Self {
        Self {
            store,
            max_files: MAX_UPLOAD_FILES,
            max_file_size: MAX_UPLOAD_FILE_SIZE,
        }
    }

    pub fn with_limits(mut self, max_files: usize, max_file_size: usize) -> Self {
        self.max_files = max_files;
        self.max_file_size = max_file_size;
        self
    }

    pub fn validate(&self, entries: &[UploadEntry]) -> Result<(), MediaError> {
        if entries.len() > self.max_files {
            return Err(MediaError::PayloadTooLarge(format!(
                "at most {} files per request, got {}",
                self.max_files,
                entries.len()
            )));
        }

        for entry in entries {
            let mime = entry.content_type.trim().to_ascii_lowercase();
            if !ALLOWED_IMAGE_MIMES.contains(&mime.as_str()) {
                return Err(MediaError::UnsupportedMediaType(format!(
                    "{} ({}); allowed: JPEG, PNG, WebP, GIF",
                    entry.original_name, entry.content_type
                )));
            }
            if entry.data.len() > self.max_file_size {
                return Err(MediaError::PayloadTooLarge(format!(
                    "{} is {} bytes, limit is {} bytes",
                    entry.original_name,
                    entry.data.len(),
                    self.max_file_size
                )));
            }
        }
        Ok(())
    }

    /// Validate and process a batch.
    ///
    /// When `descriptions` is given, description `i` is attached to image
    /// `i`, defaulting to an empty string when the list is short.
    pub async fn ingest(
        &self,
        entries: Vec<UploadEntry>,
        descriptions: Option<&[String]>,
    ) -> Result<Vec<ImageDescriptor>, MediaError> {
        self.validate(&entries)?;

        let mut processed: Vec<ImageDescriptor> = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.store.process(entry.data, &entry.original_name).await {
                Ok(mut descriptor) => {
                    if let Some(descriptions) = descriptions {
                        descriptor.description =
                            Some(descriptions.get(processed.len()).cloned().unwrap_or_default());
                    }
                    processed.push(descriptor);
                }
                Err(e) => {
                    self.discard(&processed).await;
                    return Err(e);
                }
            }
        }

        if !processed.is_empty() {
            info!(count = processed.len(), mode = ?self.store.mode(), "Images processed");
        }
        Ok(processed)
    }

    /// Release variants already written for a batch that is being rejected.
    pub async fn discard(&self, descriptors: &[ImageDescriptor]) {
        for descriptor in descriptors {
            if let Err(e) = self.store.release(descriptor).await {
                warn!(image_id = %descriptor.id, error = %e, "Failed to release image variants");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::asset_store::FsAssetStorage;
    use crate::codec::tests::png_bytes;
    use crate::codec::ImageCodec;
    use herbarium_shared::StorageMode;
    use tempfile::TempDir;

    async fn intake() -> (UploadIntake, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = FsAssetStorage::new(dir.path().to_path_buf()).await.unwrap();
        let store = ImageStore::new(StorageMode::File, ImageCodec::default(), Arc::new(storage));
        (UploadIntake::new(store), dir)
    }

    fn png(name: &str) -> UploadEntry {
        UploadEntry {
            original_name: name.to_string(),
            content_type: "image/png".to_string(),
            data: Bytes::from(png_bytes(24, 24)),
        }
    }

    fn file_count(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_ingest_preserves_order() {
        let (intake, dir) = intake().await;
        let images = intake
            .ingest(vec![png("a.png"), png("b.png"), png("c.png")], None)
            .await
            .unwrap();

        let names: Vec<_> = images.iter().map(|d| d.original_name.as_str()).collect();
        assert_eq!(names, ["a.png", "b.png", "c.png"]);
        assert!(images.iter().all(|d| d.description.is_none()));
        assert_eq!(file_count(&dir), 6);
    }

    #[tokio::test]
    async fn test_pdf_rejects_whole_batch() {
        let (intake, dir) = intake().await;
        let mut entries = vec![png("1.png"), png("2.png")];
        entries.push(UploadEntry {
            original_name: "permiso.pdf".into(),
            content_type: "application/pdf".into(),
            data: Bytes::from_static(b"%PDF-1.4"),
        });
        entries.extend([png("3.png"), png("4.png")]);

        let result = intake.ingest(entries, None).await;
        assert!(matches!(result, Err(MediaError::UnsupportedMediaType(_))));
        assert_eq!(file_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_limits() {
        let (intake, _dir) = intake().await;
        let six: Vec<_> = (0..6).map(|i| png(&format!("{i}.png"))).collect();
        assert!(matches!(
            intake.validate(&six),
            Err(MediaError::PayloadTooLarge(_))
        ));

        let small = intake.clone().with_limits(5, 16);
        assert!(matches!(
            small.validate(&[png("big.png")]),
            Err(MediaError::PayloadTooLarge(_))
        ));

        assert!(intake.validate(&[]).is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_entry_aborts_and_cleans_up() {
        let (intake, dir) = intake().await;
        let broken = UploadEntry {
            original_name: "broken.jpg".into(),
            content_type: "image/jpeg".into(),
            data: Bytes::from_static(b"\xff\xd8\xff not really a jpeg"),
        };

        let result = intake.ingest(vec![png("ok.png"), broken], None).await;
        assert!(matches!(result, Err(MediaError::CorruptImage(_))));
        assert_eq!(file_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_descriptions_zip_by_position() {
        let (intake, _dir) = intake().await;
        let descriptions = vec!["haz".to_string()];
        let images = intake
            .ingest(vec![png("a.png"), png("b.png")], Some(&descriptions))
            .await
            .unwrap();

        assert_eq!(images[0].description.as_deref(), Some("haz"));
        assert_eq!(images[1].description.as_deref(), Some(""));
    }
}
