use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use super::StoreError;
use crate::models::job::{JobStatus, JobStatusRecord};

/// Durable store of job statuses, one record per record id.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Create the status record for a record id.
    ///
    /// A repeated write for the same id (redelivered request) replaces the
    /// task tag and status and keeps `date_added`.
    async fn write_status(
        &self,
        record_id: Uuid,
        job_request: &str,
        status: JobStatus,
    ) -> Result<(), StoreError>;

    /// Update the status of an existing record. Returns `false` when no record
    /// exists; `write_status` must have been called first.
    async fn update_status(&self, record_id: Uuid, status: JobStatus) -> Result<bool, StoreError>;

    /// Current status, optionally only if it equals `only_status`.
    async fn get_status(
        &self,
        record_id: Uuid,
        only_status: Option<JobStatus>,
    ) -> Result<Option<JobStatus>, StoreError>;

    async fn get_job(&self, record_id: Uuid) -> Result<Option<JobStatusRecord>, StoreError>;
}

/// Postgres-backed status store. Each call runs in its own transaction.
#[derive(Clone)]
pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_status(record_id: Uuid, raw: &str) -> Result<JobStatus, StoreError> {
    JobStatus::from_str(raw).map_err(|_| StoreError::Decode {
        id: record_id,
        reason: format!("unknown status '{}'", raw),
    })
}

#[async_trait]
impl StatusStore for PgStatusStore {
    async fn write_status(
        &self,
        record_id: Uuid,
        job_request: &str,
        status: JobStatus,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO job_status (record_id, job_request, status, date_added, date_of_last_attempt)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (record_id) DO UPDATE
            SET job_request = EXCLUDED.job_request,
                status = EXCLUDED.status,
                date_of_last_attempt = EXCLUDED.date_of_last_attempt
            "#,
        )
        .bind(record_id)
        .bind(job_request)
        .bind(status.as_ref())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(record_id = %record_id, status = %status, "Wrote job status");
        Ok(())
    }

    async fn update_status(&self, record_id: Uuid, status: JobStatus) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE job_status
            SET status = $2,
                date_of_last_attempt = $3,
                date_of_last_success = CASE WHEN $2 = 'Success' THEN $3 ELSE date_of_last_success END
            WHERE record_id = $1
            "#,
        )
        .bind(record_id)
        .bind(status.as_ref())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let updated = result.rows_affected() > 0;
        if updated {
            tracing::debug!(record_id = %record_id, status = %status, "Updated job status");
        } else {
            tracing::warn!(record_id = %record_id, status = %status, "No status record to update");
        }
        Ok(updated)
    }

    async fn get_status(
        &self,
        record_id: Uuid,
        only_status: Option<JobStatus>,
    ) -> Result<Option<JobStatus>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT status
            FROM job_status
            WHERE record_id = $1
              AND ($2::TEXT IS NULL OR status = $2)
            "#,
        )
        .bind(record_id)
        .bind(only_status.map(|s| s.as_ref().to_string()))
        .fetch_optional(&self.pool)
        .await?;

        let status = match row {
            Some(r) => {
                let raw: String = r.try_get("status")?;
                Some(decode_status(record_id, &raw)?)
            }
            None => None,
        };

        tracing::info!(record_id = %record_id, status = ?status, "Looked up job status");
        Ok(status)
    }

    async fn get_job(&self, record_id: Uuid) -> Result<Option<JobStatusRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT record_id, job_request, status, date_added, date_of_last_attempt,
                   date_of_last_success
            FROM job_status
            WHERE record_id = $1
            "#,
        )
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => {
                let raw: String = r.try_get("status")?;
                Some(JobStatusRecord {
                    record_id: r.try_get("record_id")?,
                    job_request: r.try_get("job_request")?,
                    status: decode_status(record_id, &raw)?,
                    date_added: r.try_get("date_added")?,
                    date_of_last_attempt: r.try_get("date_of_last_attempt")?,
                    date_of_last_success: r.try_get("date_of_last_success")?,
                })
            }
            None => None,
        })
    }
}
