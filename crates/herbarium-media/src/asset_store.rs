use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use herbarium_shared::constants::{OUTPUT_IMAGE_EXT, OUTPUT_IMAGE_MIME, UPLOADS_URL_PREFIX};
use herbarium_shared::{ImageDescriptor, StorageMode};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec::{ImageCodec, ProcessedImage};
use crate::error::MediaError;

/// Byte store for file-mode image variants.
#[async_trait]
pub trait AssetStorage: Send + Sync {
    /// Write one variant under `name`, returning where it landed.
    async fn write_variant(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, MediaError>;

    async fn exists(&self, name: &str) -> Result<bool, MediaError>;

    async fn delete(&self, name: &str) -> Result<(), MediaError>;
}

// Resolve `target` under `base`, refusing anything that climbs out of it.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, MediaError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(base)
        .unwrap_or(target)
        .components()
    {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::ParentDir => {
                return Err(MediaError::InvalidPath(target.display().to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(MediaError::InvalidPath(target.display().to_string()));
    }
    Ok(resolved)
}

/// Asset directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsAssetStorage {
    base_path: PathBuf,
}

impl FsAssetStorage {
    pub async fn new(base_path: PathBuf) -> Result<Self, MediaError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            MediaError::Storage(format!(
                "Failed to create asset directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Asset store initialized");

        Ok(Self { base_path })
    }

    fn safe_path(&self, name: &str) -> Result<PathBuf, MediaError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(MediaError::InvalidPath(name.to_string()));
        }
        ensure_within(&self.base_path, &self.base_path.join(name))
    }
}

#[async_trait]
impl AssetStorage for FsAssetStorage {
    async fn write_variant(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, MediaError> {
        let path = self.safe_path(name)?;
        fs::write(&path, bytes).await.map_err(|e| {
            MediaError::Storage(format!("Failed to write asset {}: {}", name, e))
        })?;

        debug!(name, size = bytes.len(), "Stored asset");
        Ok(path)
    }

    async fn exists(&self, name: &str) -> Result<bool, MediaError> {
        let path = self.safe_path(name)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, name: &str) -> Result<(), MediaError> {
        let path = self.safe_path(name)?;
        fs::remove_file(&path).await.map_err(|e| {
            MediaError::Storage(format!("Failed to delete asset {}: {}", name, e))
        })?;

        debug!(name, "Deleted asset");
        Ok(())
    }
}

fn data_url(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", OUTPUT_IMAGE_MIME, STANDARD.encode(bytes))
}

/// Image Store: runs the codec on an upload and persists both variants in
/// the configured [`StorageMode`].
#[derive(Clone)]
pub struct ImageStore {
    mode: StorageMode,
    codec: ImageCodec,
    storage: Arc<dyn AssetStorage>,
    url_prefix: String,
}

impl ImageStore {
    pub fn new(mode: StorageMode, codec: ImageCodec, storage: Arc<dyn AssetStorage>) -> Self {
        Self {
            mode,
            codec,
            storage,
            url_prefix: UPLOADS_URL_PREFIX.to_string(),
        }
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    /// Decode, transform and store one upload, producing its descriptor.
    pub async fn process(
        &self,
        data: Bytes,
        original_name: &str,
    ) -> Result<ImageDescriptor, MediaError> {
        let codec = self.codec;
        let processed = tokio::task::spawn_blocking(move || codec.process(&data))
            .await
            .map_err(|e| MediaError::Storage(format!("Codec task failed: {e}")))??;

        let mut descriptor = ImageDescriptor {
            id: Uuid::new_v4(),
            filename: None,
            thumbnail_filename: None,
            original_name: original_name.to_string(),
            mimetype: OUTPUT_IMAGE_MIME.to_string(),
            size: processed.primary.len() as u64,
            thumbnail_size: processed.thumbnail.len() as u64,
            original_size: processed.original_size,
            original_width: processed.original_width,
            original_height: processed.original_height,
            compression_ratio: processed.compression_ratio(),
            url: None,
            thumbnail_url: None,
            base64: None,
            thumbnail_base64: None,
            description: None,
            uploaded_at: Utc::now(),
        };

        match self.mode {
            StorageMode::File => self.write_files(&processed, &mut descriptor).await?,
            StorageMode::Inline => {
                descriptor.base64 = Some(data_url(&processed.primary));
                descriptor.thumbnail_base64 = Some(data_url(&processed.thumbnail));
            }
        }

        debug!(
            image_id = %descriptor.id,
            original = original_name,
            size = descriptor.size,
            ratio = %descriptor.compression_ratio,
            "Processed image"
        );
        Ok(descriptor)
    }

    async fn write_files(
        &self,
        processed: &ProcessedImage,
        descriptor: &mut ImageDescriptor,
    ) -> Result<(), MediaError> {
        let asset_id = Uuid::new_v4();
        let filename = format!("{asset_id}.{OUTPUT_IMAGE_EXT}");
        let thumbnail_filename = format!("{asset_id}_thumb.{OUTPUT_IMAGE_EXT}");

        self.storage
            .write_variant(&filename, &processed.primary)
            .await?;
        if let Err(e) = self
            .storage
            .write_variant(&thumbnail_filename, &processed.thumbnail)
            .await
        {
            if let Err(cleanup) = self.storage.delete(&filename).await {
                warn!(filename = %filename, error = %cleanup, "Failed to remove orphaned variant");
            }
            return Err(e);
        }

        descriptor.url = Some(format!("{}/{}", self.url_prefix, filename));
        descriptor.thumbnail_url = Some(format!("{}/{}", self.url_prefix, thumbnail_filename));
        descriptor.filename = Some(filename);
        descriptor.thumbnail_filename = Some(thumbnail_filename);
        Ok(())
    }

    /// Release the stored variants of a descriptor.
    ///
    /// Inline variants live inside the descriptor itself, so only file
    /// variants need work. Missing files are not an error.
    pub async fn release(&self, descriptor: &ImageDescriptor) -> Result<(), MediaError> {
        let names = [&descriptor.filename, &descriptor.thumbnail_filename];
        for name in names.into_iter().flatten() {
            if self.storage.exists(name).await? {
                self.storage.delete(name).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::png_bytes;
    use tempfile::TempDir;

    async fn store(mode: StorageMode) -> (ImageStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = FsAssetStorage::new(dir.path().join("images")).await.unwrap();
        let store = ImageStore::new(mode, ImageCodec::default(), Arc::new(storage));
        (store, dir)
    }

    #[tokio::test]
    async fn test_file_mode_writes_both_variants() {
        let (store, dir) = store(StorageMode::File).await;
        let descriptor = store
            .process(Bytes::from(png_bytes(64, 48)), "hoja.png")
            .await
            .unwrap();

        let filename = descriptor.filename.clone().unwrap();
        let thumb = descriptor.thumbnail_filename.clone().unwrap();
        assert!(filename.ends_with(".webp"));
        assert_eq!(thumb, filename.replace(".webp", "_thumb.webp"));
        assert_eq!(descriptor.url.as_deref(), Some(format!("/uploads/images/{filename}").as_str()));
        assert!(descriptor.base64.is_none());
        assert!(descriptor.thumbnail_base64.is_none());
        assert_eq!(descriptor.original_name, "hoja.png");
        assert_eq!(descriptor.mimetype, "image/webp");
        assert_eq!((descriptor.original_width, descriptor.original_height), (64, 48));

        let images = dir.path().join("images");
        assert!(images.join(&filename).exists());
        assert!(images.join(&thumb).exists());
        assert_ne!(filename.trim_end_matches(".webp"), descriptor.id.to_string());
    }

    #[tokio::test]
    async fn test_inline_mode_writes_nothing() {
        let (store, dir) = store(StorageMode::Inline).await;
        let descriptor = store
            .process(Bytes::from(png_bytes(32, 32)), "flor.png")
            .await
            .unwrap();

        assert!(descriptor.filename.is_none());
        assert!(descriptor.url.is_none());
        assert!(descriptor
            .base64
            .as_deref()
            .unwrap()
            .starts_with("data:image/webp;base64,"));
        assert!(descriptor
            .thumbnail_base64
            .as_deref()
            .unwrap()
            .starts_with("data:image/webp;base64,"));

        let entries = std::fs::read_dir(dir.path().join("images")).unwrap().count();
        assert_eq!(entries, 0);
        assert!(store.release(&descriptor).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_removes_files() {
        let (store, dir) = store(StorageMode::File).await;
        let descriptor = store
            .process(Bytes::from(png_bytes(16, 16)), "a.png")
            .await
            .unwrap();

        store.release(&descriptor).await.unwrap();
        let images = dir.path().join("images");
        assert!(!images.join(descriptor.filename.as_ref().unwrap()).exists());
        assert!(!images.join(descriptor.thumbnail_filename.as_ref().unwrap()).exists());

        // second release finds nothing to remove
        assert!(store.release(&descriptor).await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_upload_stores_nothing() {
        let (store, dir) = store(StorageMode::File).await;
        let result = store.process(Bytes::from_static(b"garbage"), "x.png").await;

        assert!(matches!(result, Err(MediaError::CorruptImage(_))));
        let entries = std::fs::read_dir(dir.path().join("images")).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = FsAssetStorage::new(dir.path().to_path_buf()).await.unwrap();

        assert!(storage.write_variant("../escape.webp", b"x").await.is_err());
        assert!(storage.delete("nested/file.webp").await.is_err());
        assert!(storage.exists("").await.is_err());
    }
}
