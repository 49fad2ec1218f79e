//! In-process implementations of the status and parsed-record stores.
//!
//! Used for local runs without Postgres and in tests. Both stores can be
//! switched unavailable to exercise the store-failure paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ParsedRecordStore, StatusStore, StoreError};
use crate::models::job::{JobStatus, JobStatusRecord};
use crate::models::record::{ParsedRecord, RecordSource};

#[derive(Default)]
pub struct MemoryStatusStore {
    rows: RwLock<HashMap<Uuid, JobStatusRecord>>,
    unavailable: AtomicBool,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("status store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn write_status(
        &self,
        record_id: Uuid,
        job_request: &str,
        status: JobStatus,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let now = Utc::now();
        let mut rows = self.rows.write().await;

        rows.entry(record_id)
            .and_modify(|row| {
                row.job_request = job_request.to_string();
                row.status = status;
                row.date_of_last_attempt = now;
            })
            .or_insert_with(|| JobStatusRecord {
                record_id,
                job_request: job_request.to_string(),
                status,
                date_added: now,
                date_of_last_attempt: now,
                date_of_last_success: None,
            });

        tracing::debug!(record_id = %record_id, status = %status, "Wrote job status");
        Ok(())
    }

    async fn update_status(&self, record_id: Uuid, status: JobStatus) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut rows = self.rows.write().await;

        let Some(row) = rows.get_mut(&record_id) else {
            tracing::warn!(record_id = %record_id, status = %status, "No status record to update");
            return Ok(false);
        };

        let now = Utc::now();
        row.status = status;
        row.date_of_last_attempt = now;
        if status == JobStatus::Success {
            row.date_of_last_success = Some(now);
        }

        tracing::debug!(record_id = %record_id, status = %status, "Updated job status");
        Ok(true)
    }

    async fn get_status(
        &self,
        record_id: Uuid,
        only_status: Option<JobStatus>,
    ) -> Result<Option<JobStatus>, StoreError> {
        self.check_available()?;
        let rows = self.rows.read().await;

        let status = rows
            .get(&record_id)
            .map(|row| row.status)
            .filter(|status| only_status.map_or(true, |wanted| wanted == *status));

        tracing::info!(record_id = %record_id, status = ?status, "Looked up job status");
        Ok(status)
    }

    async fn get_job(&self, record_id: Uuid) -> Result<Option<JobStatusRecord>, StoreError> {
        self.check_available()?;
        Ok(self.rows.read().await.get(&record_id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryParsedRecordStore {
    rows: RwLock<HashMap<Uuid, ParsedRecord>>,
    unavailable: AtomicBool,
}

impl MemoryParsedRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("parsed record store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ParsedRecordStore for MemoryParsedRecordStore {
    async fn write_record(
        &self,
        id: Uuid,
        date: DateTime<Utc>,
        s3_key: &str,
        parsed_data: &serde_json::Value,
        source: RecordSource,
    ) -> Result<(), StoreError> {
        if let Err(e) = self.check_available() {
            tracing::error!(record_id = %id, error = %e, "Failed to write parsed record");
            return Err(e);
        }
        let mut rows = self.rows.write().await;

        let date_created = rows.get(&id).map(|r| r.date_created).unwrap_or(date);
        rows.insert(
            id,
            ParsedRecord {
                id,
                s3_key: s3_key.to_string(),
                parsed_data: parsed_data.clone(),
                date_created,
                date_modified: date.max(date_created),
                source,
            },
        );

        tracing::debug!(record_id = %id, source = %source, "Wrote parsed record");
        Ok(())
    }

    async fn update_record_metadata(
        &self,
        id: Uuid,
        date: DateTime<Utc>,
        parsed_data: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut rows = self.rows.write().await;

        let Some(row) = rows.get_mut(&id) else {
            tracing::warn!(record_id = %id, "No parsed record to update");
            return Ok(false);
        };

        row.parsed_data = parsed_data.clone();
        row.date_modified = date.max(row.date_created);

        tracing::debug!(record_id = %id, "Updated parsed record metadata");
        Ok(true)
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<ParsedRecord>, StoreError> {
        self.check_available()?;
        Ok(self.rows.read().await.get(&id).cloned())
    }
}
