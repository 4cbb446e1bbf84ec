//! Read paths: paginated lists, lookups and collection statistics.

use chrono::{DateTime, Utc};
use herbarium_shared::constants::{
    DEFAULT_LIMIT, DEFAULT_PAGE, MAX_LIMIT, PUBLIC_DEFAULT_LIMIT, PUBLIC_MAX_LIMIT,
    STATS_TOP_FAMILIES,
};
use herbarium_shared::specimen::{PublicSpecimen, SpecimenSummary};
use herbarium_shared::SpecimenRecord;
use herbarium_store::{GroupCount, SpecimenFilter};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ServerError;
use crate::lifecycle::Catalog;

/// Raw `page` / `limit` query values. Unparseable values fall back to the
/// defaults rather than failing the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    fn resolve(req: &PageRequest, default_limit: u32, max_limit: u32) -> Self {
        let page = parse_positive(req.page.as_deref()).unwrap_or(DEFAULT_PAGE);
        let limit = parse_positive(req.limit.as_deref())
            .unwrap_or(default_limit)
            .min(max_limit);
        Self { page, limit }
    }

    /// Authenticated list: limit 1..=100, default 20.
    pub fn authenticated(req: &PageRequest) -> Self {
        Self::resolve(req, DEFAULT_LIMIT, MAX_LIMIT)
    }

    /// Public list: default 10, capped at 50 whatever was asked for.
    pub fn public(req: &PageRequest) -> Self {
        Self::resolve(req, PUBLIC_DEFAULT_LIMIT, PUBLIC_MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u32> {
    raw?.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: Page, total: u64) -> Self {
        Self {
            page: page.page,
            limit: page.limit,
            total,
            total_pages: total.div_ceil(u64::from(page.limit)),
        }
    }
}

/// Query filters accepted by the public list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicFilter {
    pub family: Option<String>,
    pub genus: Option<String>,
    pub country: Option<String>,
}

impl From<PublicFilter> for SpecimenFilter {
    fn from(f: PublicFilter) -> Self {
        SpecimenFilter {
            family: f.family,
            genus: f.genus,
            country: f.country,
            ..SpecimenFilter::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub total: u64,
    pub by_family: Vec<GroupCount>,
    pub by_country: Vec<GroupCount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicStats {
    pub collection: String,
    pub statistics: PublicCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicCounts {
    pub total_specimens: u64,
    pub total_families: u64,
    pub total_genera: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicLookup {
    pub specimen: PublicSpecimen,
    pub accessed_at: DateTime<Utc>,
    pub public_access: bool,
}

impl Catalog {
    pub async fn list(
        &self,
        filter: &SpecimenFilter,
        page: Page,
    ) -> Result<(Vec<SpecimenRecord>, Pagination), ServerError> {
        let db = self.db().lock().await;
        let records = db.list_specimens(filter, page.offset(), page.limit)?;
        let total = db.count_specimens(filter)?;
        Ok((records, Pagination::new(page, total)))
    }

    pub async fn public_list(
        &self,
        filter: PublicFilter,
        page: Page,
    ) -> Result<(Vec<SpecimenSummary>, Pagination), ServerError> {
        let filter = SpecimenFilter::from(filter);
        let (records, pagination) = self.list(&filter, page).await?;
        let summaries = records.iter().map(SpecimenRecord::to_summary).collect();
        Ok((summaries, pagination))
    }

    pub async fn stats(&self) -> Result<CollectionStats, ServerError> {
        let db = self.db().lock().await;
        Ok(CollectionStats {
            total: db.count_specimens(&SpecimenFilter::default())?,
            by_family: db.top_families(STATS_TOP_FAMILIES)?,
            by_country: db.country_counts()?,
        })
    }

    pub async fn public_stats(&self, collection: &str) -> Result<PublicStats, ServerError> {
        let db = self.db().lock().await;
        Ok(PublicStats {
            collection: collection.to_string(),
            statistics: PublicCounts {
                total_specimens: db.count_specimens(&SpecimenFilter::default())?,
                total_families: db.count_distinct_families()?,
                total_genera: db.count_distinct_genera()?,
            },
        })
    }

    /// Record count per family, ordered by family name.
    pub async fn families(&self) -> Result<Vec<GroupCount>, ServerError> {
        Ok(self.db().lock().await.family_counts()?)
    }

    pub async fn public_lookup(&self, occurrence_id: &str) -> Result<PublicLookup, ServerError> {
        let record = self
            .db()
            .lock()
            .await
            .find_active_by_occurrence_id(occurrence_id.trim())?;

        Ok(PublicLookup {
            specimen: record.to_public(),
            accessed_at: Utc::now(),
            public_access: true,
        })
    }

    /// Authenticated fetch of an active record. A record stored without a
    /// QR artifact gets one generated and persisted on the way out; failure
    /// to do so is logged and the record is returned as stored.
    pub async fn get(&self, id: Uuid) -> Result<SpecimenRecord, ServerError> {
        let db = self.db().lock().await;
        let mut record = db.get_active_specimen(id)?;

        if record.qr_code_data_url.is_none() && !record.occurrence_id.is_empty() {
            record.refresh_public_url(self.public_base_url());
            match self.qr().generate(&record) {
                Ok(data_url) => {
                    record.qr_code_data_url = Some(data_url);
                    match db.update_specimen(&record) {
                        Ok(()) => info!(id = %record.id, "QR artifact backfilled"),
                        Err(e) => warn!(id = %record.id, error = %e, "Failed to persist backfilled QR"),
                    }
                }
                Err(e) => warn!(id = %record.id, error = %e, "QR backfill failed"),
            }
        }

        Ok(record)
    }
}
