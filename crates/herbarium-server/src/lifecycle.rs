//! Specimen record lifecycle: create, update, image attach/detach, soft
//! delete, and the bulk maintenance operations used by `herbarium-admin`.
//!
//! Every mutation that succeeds leaves the record with a freshly computed
//! public URL and QR artifact. Image variants written for a request that
//! later fails are released before the error is returned.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use herbarium_media::{ImageStore, QrGenerator};
use herbarium_shared::{ImageDescriptor, SpecimenRecord, UserId};
use herbarium_store::Database;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ServerError;

/// Record lifecycle and access over one database and one image store.
#[derive(Clone)]
pub struct Catalog {
    db: Arc<Mutex<Database>>,
    images: ImageStore,
    qr: QrGenerator,
    public_base_url: String,
}

/// Outcome of [`Catalog::regenerate_all_qr`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RegenerationReport {
    pub updated: usize,
    pub failed: usize,
}

/// Outcome of [`Catalog::import_records`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub read: usize,
    pub imported: usize,
    pub skipped_without_id: usize,
    pub skipped_existing: usize,
    pub failed: usize,
}

impl Catalog {
    pub fn new(
        db: Arc<Mutex<Database>>,
        images: ImageStore,
        qr: QrGenerator,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            images,
            qr,
            public_base_url: public_base_url.into(),
        }
    }

    pub fn db(&self) -> &Arc<Mutex<Database>> {
        &self.db
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub(crate) fn qr(&self) -> &QrGenerator {
        &self.qr
    }

    pub(crate) fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    /// Create a record from a client field map plus already-processed
    /// images. The occurrence ID is fixed before the single insert, so the
    /// QR artifact is stored together with the record.
    pub async fn create(
        &self,
        payload: Map<String, Value>,
        images: Vec<ImageDescriptor>,
        actor: Option<UserId>,
    ) -> Result<SpecimenRecord, ServerError> {
        match self.insert_new(payload, images.clone(), actor, false).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.discard(&images).await;
                Err(e)
            }
        }
    }

    async fn insert_new(
        &self,
        payload: Map<String, Value>,
        images: Vec<ImageDescriptor>,
        actor: Option<UserId>,
        imported: bool,
    ) -> Result<SpecimenRecord, ServerError> {
        let now = Utc::now();
        let mut record = SpecimenRecord::from_payload(payload, actor, now)?;
        if imported {
            record.imported = true;
            record.imported_at = Some(now);
        }
        record.append_images(images);
        record.refresh_public_url(&self.public_base_url);
        // fatal on create
        record.qr_code_data_url = Some(self.qr.generate(&record)?);

        self.db.lock().await.insert_specimen(&record)?;

        info!(
            id = %record.id,
            occurrence_id = %record.occurrence_id,
            images = record.images.len(),
            "Specimen created"
        );
        Ok(record)
    }

    /// Merge `patch` into an active record and append `images`.
    pub async fn update(
        &self,
        id: Uuid,
        patch: Map<String, Value>,
        images: Vec<ImageDescriptor>,
        actor: Option<UserId>,
    ) -> Result<SpecimenRecord, ServerError> {
        let result = {
            let db = self.db.lock().await;
            self.apply_update(&db, id, patch, images.clone(), actor)
        };

        if result.is_err() {
            self.discard(&images).await;
        }
        result
    }

    fn apply_update(
        &self,
        db: &Database,
        id: Uuid,
        patch: Map<String, Value>,
        images: Vec<ImageDescriptor>,
        actor: Option<UserId>,
    ) -> Result<SpecimenRecord, ServerError> {
        let mut record = db.get_active_specimen(id)?;
        record.merge_patch(patch, actor, Utc::now())?;
        record.append_images(images);
        self.refresh_derived(&mut record);
        db.update_specimen(&record)?;

        info!(id = %record.id, images = record.images.len(), "Specimen updated");
        Ok(record)
    }

    /// Append a non-empty image batch to an active record. A missing record
    /// is reported before an empty batch.
    pub async fn add_images(
        &self,
        id: Uuid,
        images: Vec<ImageDescriptor>,
        actor: Option<UserId>,
    ) -> Result<SpecimenRecord, ServerError> {
        let result = {
            let db = self.db.lock().await;
            self.apply_add_images(&db, id, images.clone(), actor)
        };

        if result.is_err() {
            self.discard(&images).await;
        }
        result
    }

    fn apply_add_images(
        &self,
        db: &Database,
        id: Uuid,
        images: Vec<ImageDescriptor>,
        actor: Option<UserId>,
    ) -> Result<SpecimenRecord, ServerError> {
        let mut record = db.get_active_specimen(id)?;
        if images.is_empty() {
            return Err(ServerError::NoFilesProvided);
        }
        let added = images.len();
        record.append_images(images);
        record.updated_by = actor;
        record.updated_at = Utc::now();
        self.refresh_derived(&mut record);
        db.update_specimen(&record)?;

        info!(id = %record.id, added, total = record.images.len(), "Images added");
        Ok(record)
    }

    /// Remove one image from an active record.
    ///
    /// The stored variants are released before the record is persisted; a
    /// failed release is logged and the record update still goes through.
    /// An id that does not parse is reported like a missing image.
    pub async fn delete_image(
        &self,
        id: Uuid,
        image_id: &str,
        actor: Option<UserId>,
    ) -> Result<SpecimenRecord, ServerError> {
        let db = self.db.lock().await;
        let mut record = db.get_active_specimen(id)?;

        let removed = Uuid::parse_str(image_id)
            .ok()
            .and_then(|image_uuid| record.remove_image(image_uuid))
            .ok_or_else(|| ServerError::ImageNotFound(image_id.to_string()))?;

        if let Err(e) = self.images.release(&removed).await {
            warn!(
                id = %record.id,
                image_id = %removed.id,
                error = %e,
                "Failed to release image variants, continuing"
            );
        }

        record.updated_by = actor;
        record.updated_at = Utc::now();
        self.refresh_derived(&mut record);
        db.update_specimen(&record)?;

        info!(
            id = %record.id,
            image_id = %removed.id,
            remaining = record.images.len(),
            "Image deleted"
        );
        Ok(record)
    }

    /// Mark an active record deleted. Image variants stay where they are.
    pub async fn soft_delete(&self, id: Uuid, actor: Option<UserId>) -> Result<(), ServerError> {
        let db = self.db.lock().await;
        let mut record = db.get_active_specimen(id)?;
        record.mark_deleted(actor, Utc::now());
        db.update_specimen(&record)?;

        info!(id = %record.id, occurrence_id = %record.occurrence_id, "Specimen soft-deleted");
        Ok(())
    }

    /// Recompute the public URL and QR artifact in place. QR failure clears
    /// the artifact instead of leaving a stale one behind.
    pub(crate) fn refresh_derived(&self, record: &mut SpecimenRecord) {
        record.refresh_public_url(&self.public_base_url);
        match self.qr.generate(record) {
            Ok(data_url) => record.qr_code_data_url = Some(data_url),
            Err(e) => {
                warn!(
                    id = %record.id,
                    occurrence_id = %record.occurrence_id,
                    error = %e,
                    "QR regeneration failed, clearing artifact"
                );
                record.qr_code_data_url = None;
            }
        }
    }

    async fn discard(&self, images: &[ImageDescriptor]) {
        for descriptor in images {
            if let Err(e) = self.images.release(descriptor).await {
                warn!(image_id = %descriptor.id, error = %e, "Failed to discard image variants");
            }
        }
    }

    /// Regenerate and persist the QR artifact of every active record.
    /// Records whose artifact cannot be generated keep their stored value.
    pub async fn regenerate_all_qr(&self) -> Result<RegenerationReport, ServerError> {
        let db = self.db.lock().await;
        let ids = db.active_specimen_ids()?;
        let mut report = RegenerationReport::default();

        for id in ids {
            let mut record = db.get_specimen(id)?;
            record.refresh_public_url(&self.public_base_url);

            let data_url = match self.qr.generate(&record) {
                Ok(data_url) => data_url,
                Err(e) => {
                    warn!(id = %id, error = %e, "QR regeneration failed");
                    report.failed += 1;
                    continue;
                }
            };
            record.qr_code_data_url = Some(data_url);

            match db.update_specimen(&record) {
                Ok(()) => {
                    debug!(id = %id, occurrence_id = %record.occurrence_id, "QR regenerated");
                    report.updated += 1;
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Failed to persist regenerated QR");
                    report.failed += 1;
                }
            }
        }

        info!(updated = report.updated, failed = report.failed, "QR regeneration finished");
        Ok(report)
    }

    /// Bulk-import flat records through the create path.
    ///
    /// Entries without an `occurrenceID`, and entries whose ID is already
    /// stored (or repeated earlier in the batch), are skipped.
    pub async fn import_records(
        &self,
        entries: Vec<Value>,
        actor: Option<UserId>,
    ) -> Result<ImportReport, ServerError> {
        let mut report = ImportReport {
            read: entries.len(),
            ..ImportReport::default()
        };

        let mut candidates = Vec::new();
        for entry in entries {
            let Value::Object(mut fields) = entry else {
                report.failed += 1;
                continue;
            };
            nest_flat_fields(&mut fields);
            match occurrence_id_of(&fields) {
                Some(occurrence_id) => candidates.push((occurrence_id, fields)),
                None => report.skipped_without_id += 1,
            }
        }

        let ids: Vec<String> = candidates.iter().map(|(id, _)| id.clone()).collect();
        let existing = self.db.lock().await.existing_occurrence_ids(&ids)?;
        let mut seen = HashSet::new();

        for (occurrence_id, fields) in candidates {
            if existing.contains(&occurrence_id) || !seen.insert(occurrence_id.clone()) {
                report.skipped_existing += 1;
                continue;
            }
            match self.insert_new(fields, Vec::new(), actor, true).await {
                Ok(_) => report.imported += 1,
                Err(e) => {
                    warn!(occurrence_id = %occurrence_id, error = %e, "Import entry rejected");
                    report.failed += 1;
                }
            }
        }

        info!(
            read = report.read,
            imported = report.imported,
            skipped_without_id = report.skipped_without_id,
            skipped_existing = report.skipped_existing,
            failed = report.failed,
            "Import finished"
        );
        Ok(report)
    }
}

const TAXONOMY_KEYS: &[&str] = &[
    "kingdom",
    "phylum",
    "class",
    "order",
    "family",
    "genus",
    "specificEpithet",
    "infraspecificEpithet",
    "scientificName",
    "verbatimScientificName",
    "scientificNameAuthorship",
    "identificationQualifier",
    "verbatimTaxonRank",
    "taxonRank",
    "nomenclaturalCode",
    "taxonID",
    "vernacularName",
    "taxonomicStatus",
    "synonym",
    "previousIdentifications",
];

const PERMIT_KEYS: &[&str] = &[
    "permitBy",
    "permitName",
    "permitType",
    "permitStatus",
    "permitStatusQualifier",
    "permitURI",
    "permitText",
];

/// Import rows are flat; move taxonomy and permit columns into their
/// sub-documents unless the row already carries them nested.
fn nest_flat_fields(fields: &mut Map<String, Value>) {
    for (target, keys) in [("taxonomy", TAXONOMY_KEYS), ("permit", PERMIT_KEYS)] {
        if fields.contains_key(target) {
            continue;
        }
        let mut nested = Map::new();
        for key in keys {
            if let Some(value) = fields.remove(*key) {
                nested.insert((*key).to_string(), value);
            }
        }
        if !nested.is_empty() {
            fields.insert(target.to_string(), Value::Object(nested));
        }
    }
}

fn occurrence_id_of(fields: &Map<String, Value>) -> Option<String> {
    let id = match fields.get("occurrenceID")? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}
