use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use super::StoreError;
use crate::models::record::{ParsedRecord, RecordSource};

/// Durable store of the latest parsed artifact per record id.
#[async_trait]
pub trait ParsedRecordStore: Send + Sync {
    /// Store a freshly parsed record. Parsing the same id again replaces the
    /// artifact and keeps `date_created`.
    async fn write_record(
        &self,
        id: Uuid,
        date: DateTime<Utc>,
        s3_key: &str,
        parsed_data: &serde_json::Value,
        source: RecordSource,
    ) -> Result<(), StoreError>;

    /// Replace `parsed_data` and `date_modified` of an existing record.
    /// Returns `false` when there is no prior record.
    async fn update_record_metadata(
        &self,
        id: Uuid,
        date: DateTime<Utc>,
        parsed_data: &serde_json::Value,
    ) -> Result<bool, StoreError>;

    async fn get_record(&self, id: Uuid) -> Result<Option<ParsedRecord>, StoreError>;
}

#[derive(Clone)]
pub struct PgParsedRecordStore {
    pool: PgPool,
}

impl PgParsedRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(id: Uuid, r: &PgRow) -> Result<ParsedRecord, StoreError> {
    let raw_source: String = r.try_get("source")?;
    let source = RecordSource::from_str(&raw_source).map_err(|_| StoreError::Decode {
        id,
        reason: format!("unknown source '{}'", raw_source),
    })?;
    let parsed_data: Option<serde_json::Value> = r.try_get("parsed_data")?;

    Ok(ParsedRecord {
        id: r.try_get("id")?,
        s3_key: r.try_get("s3_key")?,
        parsed_data: parsed_data.unwrap_or(serde_json::Value::Null),
        date_created: r.try_get("date_created")?,
        date_modified: r.try_get("date_modified")?,
        source,
    })
}

#[async_trait]
impl ParsedRecordStore for PgParsedRecordStore {
    async fn write_record(
        &self,
        id: Uuid,
        date: DateTime<Utc>,
        s3_key: &str,
        parsed_data: &serde_json::Value,
        source: RecordSource,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO parsed_records (id, s3_key, parsed_data, date_created, date_modified, source)
            VALUES ($1, $2, $3, $4, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET s3_key = EXCLUDED.s3_key,
                parsed_data = EXCLUDED.parsed_data,
                date_modified = GREATEST(EXCLUDED.date_modified, parsed_records.date_created),
                source = EXCLUDED.source
            "#,
        )
        .bind(id)
        .bind(s3_key)
        .bind(parsed_data)
        .bind(date)
        .bind(source.as_ref())
        .execute(&mut *tx)
        .await;

        if let Err(e) = result {
            tracing::error!(record_id = %id, error = %e, "Failed to write parsed record");
            return Err(e.into());
        }

        tx.commit().await?;
        tracing::debug!(record_id = %id, source = %source, "Wrote parsed record");
        Ok(())
    }

    async fn update_record_metadata(
        &self,
        id: Uuid,
        date: DateTime<Utc>,
        parsed_data: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM parsed_records WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        if existing.is_none() {
            tracing::warn!(record_id = %id, "No parsed record to update");
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE parsed_records
            SET parsed_data = $2,
                date_modified = GREATEST($3, date_created)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(parsed_data)
        .bind(date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(record_id = %id, "Updated parsed record metadata");
        Ok(true)
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<ParsedRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, s3_key, parsed_data, date_created, date_modified, source
            FROM parsed_records
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| record_from_row(id, &r)).transpose()
    }
}
