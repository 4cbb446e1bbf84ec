//! Specimen record model (Darwin Core occurrence).
//!
//! The record serializes to a flat camelCase JSON document: the grouped
//! sub-structs ([`CollectionEvent`], [`Location`], ...) are flattened, while
//! `taxonomy` and `permit` stay nested sub-documents. The same JSON shape is
//! what clients send, what the store persists and what field-map updates are
//! merged into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::constants::PUBLIC_SPECIMEN_PATH;
use crate::error::SpecimenError;
use crate::types::UserId;

/// Keys managed by the system; never taken from a client payload.
const SYSTEM_FIELDS: &[&str] = &[
    "id",
    "createdBy",
    "updatedBy",
    "createdAt",
    "updatedAt",
    "isDeleted",
    "deletedAt",
    "deletedBy",
    "imported",
    "importedAt",
    "images",
    "publicUrl",
    "qrCodeDataUrl",
];

/// Keys fixed at creation; stripped from every update payload.
const IDENTITY_FIELDS: &[&str] = &["occurrenceID", "createdBy"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Taxonomy {
    pub kingdom: Option<String>,
    pub phylum: Option<String>,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
    pub order: Option<String>,
    pub family: String,
    pub genus: String,
    pub specific_epithet: Option<String>,
    pub infraspecific_epithet: Option<String>,
    pub scientific_name: String,
    pub verbatim_scientific_name: Option<String>,
    pub scientific_name_authorship: Option<String>,
    pub identification_qualifier: Option<String>,
    pub verbatim_taxon_rank: Option<String>,
    pub taxon_rank: Option<String>,
    pub nomenclatural_code: Option<String>,
    #[serde(rename = "taxonID")]
    pub taxon_id: Option<String>,
    pub vernacular_name: Option<String>,
    pub taxonomic_status: Option<String>,
    pub synonym: Option<String>,
    pub previous_identifications: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permit {
    pub permit_by: Option<String>,
    pub permit_name: Option<String>,
    pub permit_type: Option<String>,
    pub permit_status: Option<String>,
    pub permit_status_qualifier: Option<String>,
    #[serde(rename = "permitURI")]
    pub permit_uri: Option<String>,
    pub permit_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEvent {
    pub recorded_by: Option<String>,
    pub identified_by: Option<String>,
    pub herb_affiliation: Option<String>,
    pub cataloger_name: Option<String>,
    pub catalog_year: Option<String>,
    pub date_identified: Option<String>,
    pub verbatim_event_date: Option<String>,
    pub event_date: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub continent: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub state_province: Option<String>,
    pub county: Option<String>,
    pub municipality: Option<String>,
    pub locality: Option<String>,
    pub verbatim_locality: Option<String>,
    pub habitat: Option<String>,
    pub verbatim_elevation: Option<String>,
    pub minimum_elevation_in_meters: Option<String>,
    pub maximum_elevation_in_meters: Option<String>,
    pub verbatim_coordinate_system: Option<String>,
    pub verbatim_coordinates: Option<String>,
    pub decimal_latitude: Option<String>,
    pub decimal_longitude: Option<String>,
    pub geodetic_datum: Option<String>,
    pub georeference_remarks: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Institution {
    pub institution_code: Option<String>,
    #[serde(rename = "institutionID")]
    pub institution_id: Option<String>,
    pub collection_code: Option<String>,
    #[serde(rename = "collectionID")]
    pub collection_id: Option<String>,
    #[serde(rename = "datasetID")]
    pub dataset_id: Option<String>,
    pub dataset_name: Option<String>,
    pub owner_institution_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rights {
    pub language: Option<String>,
    pub license: Option<String>,
    pub rights_holder: Option<String>,
    pub access_rights: Option<String>,
    pub associated_references: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observations {
    pub occurrence_remarks: Option<String>,
    pub occurrence_status: Option<String>,
    pub organism_quantity: Option<String>,
    pub organism_quantity_type: Option<String>,
    pub life_stage: Option<String>,
    pub growth_habit: Option<String>,
    pub establishment_means: Option<String>,
    pub preparations: Option<String>,
    pub disposition: Option<String>,
    pub duplicate_location: Option<String>,
    pub associated_sequences: Option<String>,
    pub type_status: Option<String>,
    pub use_category: Option<String>,
    pub verbatim_use: Option<String>,
    pub mobilization_code: Option<String>,
    #[serde(rename = "collectionCodeMAE")]
    pub collection_code_mae: Option<String>,
    pub deposit_code: Option<String>,
    pub observation: Option<String>,
}

/// One processed image attached to a record.
///
/// Exactly one pair of variant references is populated: `filename`/`url`
/// (file mode) or `base64` (inline mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDescriptor {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_filename: Option<String>,
    pub original_name: String,
    pub mimetype: String,
    pub size: u64,
    pub thumbnail_size: u64,
    pub original_size: u64,
    pub original_width: u32,
    pub original_height: u32,
    pub compression_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// A catalogued plant occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecimenRecord {
    pub id: Uuid,
    #[serde(rename = "occurrenceID", default)]
    pub occurrence_id: String,
    pub catalog_number: Option<String>,
    pub other_catalog_numbers: Option<String>,
    pub record_number: Option<String>,
    pub basis_of_record: Option<String>,
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    pub information_withheld: Option<String>,

    #[serde(flatten)]
    pub event: CollectionEvent,
    #[serde(flatten)]
    pub location: Location,
    #[serde(default)]
    pub taxonomy: Taxonomy,
    #[serde(flatten)]
    pub institution: Institution,
    pub permit: Option<Permit>,
    #[serde(flatten)]
    pub rights: Rights,
    #[serde(flatten)]
    pub observations: Observations,

    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub deleted_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub imported: bool,
    pub imported_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub images: Vec<ImageDescriptor>,

    pub public_url: Option<String>,
    pub qr_code_data_url: Option<String>,
}

// Trim strings and stringify numbers, recursing into sub-documents.
fn normalize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect())
        }
        other => other,
    }
}

fn fill(slot: &mut Option<String>, default: &str) {
    if slot.is_none() {
        *slot = Some(default.to_string());
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// `<base>/public/specimen/<occurrence_id>`
pub fn public_url_for(base_url: &str, occurrence_id: &str) -> String {
    format!(
        "{}{}/{}",
        base_url.trim_end_matches('/'),
        PUBLIC_SPECIMEN_PATH,
        occurrence_id
    )
}

impl SpecimenRecord {
    /// Build a new active record from a client field map.
    ///
    /// System-managed keys are ignored; `occurrenceID` is honoured when
    /// present and generated otherwise. Defaults are applied and the
    /// required taxonomy fields validated.
    pub fn from_payload(
        payload: Map<String, Value>,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Self, SpecimenError> {
        let mut doc = Map::new();
        for (key, value) in payload {
            if SYSTEM_FIELDS.contains(&key.as_str()) {
                continue;
            }
            doc.insert(key, normalize(value));
        }
        doc.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        doc.insert("createdAt".into(), Value::String(now.to_rfc3339()));
        doc.insert("updatedAt".into(), Value::String(now.to_rfc3339()));

        let mut record: SpecimenRecord = serde_json::from_value(Value::Object(doc))?;
        record.created_by = created_by;
        if record.occurrence_id.is_empty() {
            record.occurrence_id = Uuid::new_v4().to_string();
        }
        record.apply_defaults();
        record.validate()?;
        Ok(record)
    }

    /// Merge a client field map into this record.
    ///
    /// Top-level keys replace the stored value (a `taxonomy` key replaces
    /// the whole sub-document). Identity and system keys are stripped before
    /// the merge. On error the record is left untouched.
    pub fn merge_patch(
        &mut self,
        patch: Map<String, Value>,
        updated_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<(), SpecimenError> {
        let Value::Object(mut doc) = serde_json::to_value(&*self)? else {
            return Err(SpecimenError::InvalidField {
                field: "record".into(),
                reason: "record did not serialize to an object".into(),
            });
        };

        for (key, value) in patch {
            if IDENTITY_FIELDS.contains(&key.as_str()) || SYSTEM_FIELDS.contains(&key.as_str()) {
                continue;
            }
            doc.insert(key, normalize(value));
        }

        let mut merged: SpecimenRecord = serde_json::from_value(Value::Object(doc))?;
        merged.validate()?;
        merged.updated_by = updated_by;
        merged.updated_at = now;

        *self = merged;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SpecimenError> {
        if self.occurrence_id.trim().is_empty() {
            return Err(SpecimenError::MissingField("occurrenceID"));
        }
        if self.taxonomy.family.trim().is_empty() {
            return Err(SpecimenError::MissingField("taxonomy.family"));
        }
        if self.taxonomy.genus.trim().is_empty() {
            return Err(SpecimenError::MissingField("taxonomy.genus"));
        }
        if self.taxonomy.scientific_name.trim().is_empty() {
            return Err(SpecimenError::MissingField("taxonomy.scientificName"));
        }
        Ok(())
    }

    /// Collection-wide defaults for fields the cataloguer left unset.
    pub fn apply_defaults(&mut self) {
        fill(&mut self.basis_of_record, "PreservedSpecimen");
        fill(&mut self.record_type, "PhysicalObject");

        fill(&mut self.taxonomy.kingdom, "Plantae");
        fill(&mut self.taxonomy.taxon_rank, "species");
        fill(&mut self.taxonomy.nomenclatural_code, "ICN");

        fill(&mut self.location.continent, "South America");
        fill(&mut self.location.country, "Ecuador");
        fill(&mut self.location.country_code, "EC");
        fill(&mut self.location.geodetic_datum, "WGS84");

        fill(&mut self.institution.institution_code, "UTPL");

        fill(&mut self.rights.language, "es");
        fill(
            &mut self.rights.license,
            "https://creativecommons.org/licenses/by-nc/4.0/",
        );
        fill(
            &mut self.rights.rights_holder,
            "Universidad Tecnica Particular de Loja",
        );

        fill(&mut self.observations.occurrence_status, "present");
    }

    pub fn refresh_public_url(&mut self, base_url: &str) {
        self.public_url = Some(public_url_for(base_url, &self.occurrence_id));
    }

    /// Reference used by the QR payload: first image's primary URL, then its
    /// thumbnail URL, then the inline encodings.
    pub fn representative_image(&self) -> Option<&str> {
        let first = self.images.first()?;
        non_empty(&first.url)
            .or_else(|| non_empty(&first.thumbnail_url))
            .or_else(|| non_empty(&first.base64))
            .or_else(|| non_empty(&first.thumbnail_base64))
    }

    pub fn append_images(&mut self, images: Vec<ImageDescriptor>) {
        self.images.extend(images);
    }

    pub fn remove_image(&mut self, image_id: Uuid) -> Option<ImageDescriptor> {
        let index = self.images.iter().position(|img| img.id == image_id)?;
        Some(self.images.remove(index))
    }

    pub fn mark_deleted(&mut self, deleted_by: Option<UserId>, now: DateTime<Utc>) {
        self.is_deleted = true;
        self.deleted_at = Some(now);
        self.deleted_by = deleted_by;
    }

    pub fn to_public(&self) -> PublicSpecimen {
        PublicSpecimen {
            occurrence_id: self.occurrence_id.clone(),
            catalog_number: self.catalog_number.clone(),
            taxonomy: self.taxonomy.clone(),
            recorded_by: self.event.recorded_by.clone(),
            identified_by: self.event.identified_by.clone(),
            event_date: self.event.event_date.clone(),
            country: self.location.country.clone(),
            state_province: self.location.state_province.clone(),
            locality: self.location.locality.clone(),
            decimal_latitude: self.location.decimal_latitude.clone(),
            decimal_longitude: self.location.decimal_longitude.clone(),
            institution_code: self.institution.institution_code.clone(),
            license: self.rights.license.clone(),
            rights_holder: self.rights.rights_holder.clone(),
            images: self.images.clone(),
        }
    }

    pub fn to_summary(&self) -> SpecimenSummary {
        SpecimenSummary {
            occurrence_id: self.occurrence_id.clone(),
            catalog_number: self.catalog_number.clone(),
            taxonomy: TaxonSummary {
                scientific_name: self.taxonomy.scientific_name.clone(),
                family: self.taxonomy.family.clone(),
            },
            country: self.location.country.clone(),
            state_province: self.location.state_province.clone(),
            public_url: self.public_url.clone(),
        }
    }
}

/// Record view served without authentication (no audit fields).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSpecimen {
    #[serde(rename = "occurrenceID")]
    pub occurrence_id: String,
    pub catalog_number: Option<String>,
    pub taxonomy: Taxonomy,
    pub recorded_by: Option<String>,
    pub identified_by: Option<String>,
    pub event_date: Option<String>,
    pub country: Option<String>,
    pub state_province: Option<String>,
    pub locality: Option<String>,
    pub decimal_latitude: Option<String>,
    pub decimal_longitude: Option<String>,
    pub institution_code: Option<String>,
    pub license: Option<String>,
    pub rights_holder: Option<String>,
    pub images: Vec<ImageDescriptor>,
}

/// Reduced projection used by the public list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecimenSummary {
    #[serde(rename = "occurrenceID")]
    pub occurrence_id: String,
    pub catalog_number: Option<String>,
    pub taxonomy: TaxonSummary,
    pub country: Option<String>,
    pub state_province: Option<String>,
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonSummary {
    pub scientific_name: String,
    pub family: String,
}
