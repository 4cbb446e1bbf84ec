use std::collections::HashSet;

use herbarium_shared::SpecimenRecord;
use rusqlite::{params, params_from_iter};
use uuid::Uuid;

use crate::database::{ts, Database};
use crate::error::{map_write_error, Result, StoreError};
use crate::models::{GroupCount, SpecimenFilter};

// SQLite's default host-parameter cap is 999; stay well below it.
const IN_CHUNK: usize = 500;

impl Database {
    /// Insert a new record. A reused occurrence ID yields
    /// [`StoreError::DuplicateKey`].
    pub fn insert_specimen(&self, record: &SpecimenRecord) -> Result<()> {
        let document = serde_json::to_string(record)?;
        self.conn()
            .execute(
                "INSERT INTO specimens (id, occurrence_id, catalog_number, family, genus,
                    scientific_name, country, state_province, year, is_deleted,
                    created_at, updated_at, document)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.id.to_string(),
                    record.occurrence_id,
                    record.catalog_number,
                    record.taxonomy.family,
                    record.taxonomy.genus,
                    record.taxonomy.scientific_name,
                    record.location.country,
                    record.location.state_province,
                    record.event.year,
                    record.is_deleted,
                    ts(&record.created_at),
                    ts(&record.updated_at),
                    document,
                ],
            )
            .map_err(map_write_error)?;

        tracing::debug!(id = %record.id, occurrence_id = %record.occurrence_id, "specimen inserted");
        Ok(())
    }

    /// Replace the stored document and its projections.
    pub fn update_specimen(&self, record: &SpecimenRecord) -> Result<()> {
        let document = serde_json::to_string(record)?;
        let affected = self
            .conn()
            .execute(
                "UPDATE specimens SET occurrence_id = ?2, catalog_number = ?3, family = ?4,
                    genus = ?5, scientific_name = ?6, country = ?7, state_province = ?8,
                    year = ?9, is_deleted = ?10, updated_at = ?11, document = ?12
                 WHERE id = ?1",
                params![
                    record.id.to_string(),
                    record.occurrence_id,
                    record.catalog_number,
                    record.taxonomy.family,
                    record.taxonomy.genus,
                    record.taxonomy.scientific_name,
                    record.location.country,
                    record.location.state_province,
                    record.event.year,
                    record.is_deleted,
                    ts(&record.updated_at),
                    document,
                ],
            )
            .map_err(map_write_error)?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Fetch a record by internal id, soft-deleted or not.
    pub fn get_specimen(&self, id: Uuid) -> Result<SpecimenRecord> {
        self.conn()
            .query_row(
                "SELECT document FROM specimens WHERE id = ?1",
                params![id.to_string()],
                row_to_specimen,
            )
            .map_err(not_found)
    }

    pub fn get_active_specimen(&self, id: Uuid) -> Result<SpecimenRecord> {
        self.conn()
            .query_row(
                "SELECT document FROM specimens WHERE id = ?1 AND is_deleted = 0",
                params![id.to_string()],
                row_to_specimen,
            )
            .map_err(not_found)
    }

    pub fn find_active_by_occurrence_id(&self, occurrence_id: &str) -> Result<SpecimenRecord> {
        self.conn()
            .query_row(
                "SELECT document FROM specimens WHERE occurrence_id = ?1 AND is_deleted = 0",
                params![occurrence_id],
                row_to_specimen,
            )
            .map_err(not_found)
    }

    /// Active records matching `filter`, newest first.
    pub fn list_specimens(
        &self,
        filter: &SpecimenFilter,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SpecimenRecord>> {
        let (where_sql, args) = where_clause(filter);
        let sql = format!(
            "SELECT document FROM specimens WHERE {where_sql}
             ORDER BY created_at DESC, rowid DESC
             LIMIT {limit} OFFSET {offset}"
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), row_to_specimen)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn count_specimens(&self, filter: &SpecimenFilter) -> Result<u64> {
        let (where_sql, args) = where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM specimens WHERE {where_sql}");
        let count: i64 = self
            .conn()
            .query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Ids of every active record, oldest first.
    pub fn active_specimen_ids(&self) -> Result<Vec<Uuid>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id FROM specimens WHERE is_deleted = 0 ORDER BY created_at ASC")?;
        let rows = stmt.query_map([], |row| {
            let raw: String = row.get(0)?;
            Uuid::parse_str(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// The subset of `occurrence_ids` already present (deleted rows included).
    pub fn existing_occurrence_ids(&self, occurrence_ids: &[String]) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        for chunk in occurrence_ids.chunks(IN_CHUNK) {
            let placeholders = (1..=chunk.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT occurrence_id FROM specimens WHERE occurrence_id IN ({placeholders})"
            );
            let mut stmt = self.conn().prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))?;
            for row in rows {
                found.insert(row?);
            }
        }
        Ok(found)
    }

    /// Most populated families among active records, count descending.
    pub fn top_families(&self, limit: usize) -> Result<Vec<GroupCount>> {
        self.group_counts(&format!(
            "SELECT family, COUNT(*) AS n FROM specimens WHERE is_deleted = 0
             GROUP BY family ORDER BY n DESC, family ASC LIMIT {limit}"
        ))
    }

    /// Every family among active records, by family name.
    pub fn family_counts(&self) -> Result<Vec<GroupCount>> {
        self.group_counts(
            "SELECT family, COUNT(*) AS n FROM specimens WHERE is_deleted = 0
             GROUP BY family ORDER BY family ASC",
        )
    }

    pub fn country_counts(&self) -> Result<Vec<GroupCount>> {
        self.group_counts(
            "SELECT country, COUNT(*) AS n FROM specimens WHERE is_deleted = 0
             GROUP BY country ORDER BY n DESC, country ASC",
        )
    }

    pub fn count_distinct_families(&self) -> Result<u64> {
        self.scalar_count("SELECT COUNT(DISTINCT family) FROM specimens WHERE is_deleted = 0")
    }

    pub fn count_distinct_genera(&self) -> Result<u64> {
        self.scalar_count("SELECT COUNT(DISTINCT genus) FROM specimens WHERE is_deleted = 0")
    }

    fn group_counts(&self, sql: &str) -> Result<Vec<GroupCount>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            let key: Option<String> = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok(GroupCount {
                key,
                count: count as u64,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    fn scalar_count(&self, sql: &str) -> Result<u64> {
        let count: i64 = self.conn().query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn where_clause(filter: &SpecimenFilter) -> (String, Vec<String>) {
    let mut clauses = vec!["is_deleted = 0".to_string()];
    let mut args: Vec<String> = Vec::new();

    let substring_filters = [
        ("family", &filter.family),
        ("genus", &filter.genus),
        ("country", &filter.country),
        ("state_province", &filter.state_province),
    ];
    for (column, value) in substring_filters {
        if let Some(value) = non_blank(value) {
            args.push(value.to_lowercase());
            clauses.push(format!("instr(lower({column}), ?{}) > 0", args.len()));
        }
    }

    if let Some(year) = non_blank(&filter.year) {
        args.push(year);
        clauses.push(format!("year = ?{}", args.len()));
    }

    if let Some(search) = non_blank(&filter.search) {
        args.push(search.to_lowercase());
        let n = args.len();
        clauses.push(format!(
            "(instr(lower(scientific_name), ?{n}) > 0 OR instr(lower(catalog_number), ?{n}) > 0)"
        ));
    }

    (clauses.join(" AND "), args)
}

fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}

fn row_to_specimen(row: &rusqlite::Row<'_>) -> rusqlite::Result<SpecimenRecord> {
    let document: String = row.get(0)?;
    serde_json::from_str(&document).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}
