//! Parse/reparse job state machine.
//!
//! A job moves `Pending -> Processing -> {Success, Unchanged, Error}`. The
//! status row is the durable outcome; the status channel and the downstream
//! output only follow it. Nothing here retries: a failed job is retried by
//! redelivering the same request.

use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::db::{ParsedRecordStore, StatusStore, StoreError};
use crate::models::job::{JobRequest, JobStatus, JobTask, StatusMessage};
use crate::models::record::{ParsedRecord, ParsedRecordMessage, RecordSource};
use crate::services::output::{OutputError, OutputSink};
use crate::services::parser::{ParseError, RecordParser};
use crate::services::publisher::StatusPublisher;
use crate::services::storage::ProviderSet;

const DEFAULT_PARSER_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ReparseOrchestrator {
    statuses: Arc<dyn StatusStore>,
    records: Arc<dyn ParsedRecordStore>,
    providers: ProviderSet,
    parser: Arc<dyn RecordParser>,
    output: Arc<dyn OutputSink>,
    publisher: Arc<dyn StatusPublisher>,
    parser_timeout: Duration,
}

impl ReparseOrchestrator {
    pub fn new(
        statuses: Arc<dyn StatusStore>,
        records: Arc<dyn ParsedRecordStore>,
        providers: ProviderSet,
        parser: Arc<dyn RecordParser>,
        output: Arc<dyn OutputSink>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        Self {
            statuses,
            records,
            providers,
            parser,
            output,
            publisher,
            parser_timeout: DEFAULT_PARSER_TIMEOUT,
        }
    }

    pub fn with_parser_timeout(mut self, timeout: Duration) -> Self {
        self.parser_timeout = timeout;
        self
    }

    /// Drive one job request to a terminal status.
    ///
    /// Returns `Success` or `Unchanged` on a clean completion. On failure the
    /// original error is returned as is, along with whether its `Error` status
    /// was written.
    pub async fn process_job(&self, request: &JobRequest) -> Result<JobStatus, JobFailure> {
        let start = Instant::now();
        tracing::info!(
            record_id = %request.record_id,
            task = %request.task,
            force = request.is_force(),
            resend = request.is_resend(),
            "Processing job"
        );

        let result = match self.drive(request).await {
            Ok(status) => Ok(status),
            Err(e) => Err(self.record_failure(request, e).await),
        };

        let final_status = match &result {
            Ok(status) => *status,
            Err(_) => JobStatus::Error,
        };
        metrics::counter!(
            "parser_jobs_total",
            "task" => task_label(&request.task),
            "status" => final_status.to_string()
        )
        .increment(1);
        metrics::histogram!("parser_job_duration_seconds").record(start.elapsed().as_secs_f64());

        result
    }

    async fn drive(&self, request: &JobRequest) -> Result<JobStatus, JobError> {
        let record_id = request.record_id;
        let task = JobTask::from_str(&request.task)
            .map_err(|_| JobError::Classification(format!("unknown task '{}'", request.task)))?;

        self.statuses
            .write_status(record_id, task.as_ref(), JobStatus::Pending)
            .await?;
        self.set_status(record_id, JobStatus::Processing).await?;

        let status = match task {
            JobTask::Parse => self.parse_flow(request).await?,
            JobTask::Reparse => self.reparse_flow(request).await?,
        };

        self.set_status(record_id, status).await?;
        self.notify(request, status).await;

        tracing::info!(record_id = %record_id, status = %status, "Job finished");
        Ok(status)
    }

    async fn parse_flow(&self, request: &JobRequest) -> Result<JobStatus, JobError> {
        let record_id = request.record_id;
        let source = classify_source(request.source.as_deref())?;
        let key = request.object_key();

        let raw = match &request.raw_data {
            Some(raw) => {
                let raw = raw.as_bytes().to_vec();
                let report = self.providers.write_all(&key, &raw).await;
                if !report.is_complete() {
                    tracing::warn!(
                        record_id = %record_id,
                        written = ?report.written,
                        failed = report.failed.len(),
                        "Raw record not mirrored to every provider"
                    );
                }
                raw
            }
            None => self.fetch_raw(&key).await?,
        };

        let parsed = self.run_parser(record_id, &raw, source).await?;

        self.records
            .write_record(record_id, Utc::now(), &key, &parsed, source)
            .await?;
        self.output
            .emit(&ParsedRecordMessage {
                record_id,
                s3_key: key,
                source,
                parsed_data: parsed,
                resend: false,
            })
            .await?;

        Ok(JobStatus::Success)
    }

    async fn reparse_flow(&self, request: &JobRequest) -> Result<JobStatus, JobError> {
        let record_id = request.record_id;
        let stored = self.records.get_record(record_id).await?;

        // Resend wins over force: republish what is stored, never re-parse.
        if request.is_resend() {
            let record = stored.filter(ParsedRecord::has_parsed_data).ok_or_else(|| {
                JobError::NotFound(format!("no parsed record to resend for {}", record_id))
            })?;
            self.output
                .emit(&ParsedRecordMessage::from_record(&record, true))
                .await?;
            tracing::info!(record_id = %record_id, "Resent stored parsed record");
            return Ok(JobStatus::Success);
        }

        let record = stored.ok_or_else(|| {
            JobError::NotFound(format!("no parsed record for {}", record_id))
        })?;
        let raw = self.fetch_raw(&record.s3_key).await?;
        let parsed = self.run_parser(record_id, &raw, record.source).await?;

        if !request.is_force() && parsed == record.parsed_data {
            tracing::info!(record_id = %record_id, "Reparse produced identical metadata");
            return Ok(JobStatus::Unchanged);
        }

        let updated = self
            .records
            .update_record_metadata(record_id, Utc::now(), &parsed)
            .await?;
        if !updated {
            return Err(JobError::NotFound(format!(
                "parsed record {} disappeared during reparse",
                record_id
            )));
        }

        self.output
            .emit(&ParsedRecordMessage {
                record_id,
                s3_key: record.s3_key,
                source: record.source,
                parsed_data: parsed,
                resend: false,
            })
            .await?;

        Ok(JobStatus::Success)
    }

    async fn fetch_raw(&self, key: &str) -> Result<Vec<u8>, JobError> {
        match self.providers.read_first(key).await {
            Ok(hit) => {
                tracing::debug!(provider = %hit.provider, key = %key, "Fetched raw record");
                Ok(hit.data)
            }
            Err(e) => Err(JobError::NotFound(format!(
                "source object {} not available from providers {:?}: {}",
                key,
                self.providers.names(),
                e
            ))),
        }
    }

    async fn run_parser(
        &self,
        record_id: Uuid,
        raw: &[u8],
        source: RecordSource,
    ) -> Result<serde_json::Value, JobError> {
        let start = Instant::now();
        let parsed = tokio::time::timeout(self.parser_timeout, self.parser.parse(raw, source))
            .await
            .unwrap_or(Err(ParseError::Timeout(self.parser_timeout)))?;

        tracing::debug!(
            record_id = %record_id,
            source = %source,
            parse_duration_ms = start.elapsed().as_millis() as u64,
            "Parsed record"
        );
        Ok(parsed)
    }

    async fn set_status(&self, record_id: Uuid, status: JobStatus) -> Result<(), JobError> {
        if self.statuses.update_status(record_id, status).await? {
            Ok(())
        } else {
            Err(JobError::StatusMissing(record_id))
        }
    }

    /// Publish a terminal status. Intermediate statuses are only persisted.
    async fn notify(&self, request: &JobRequest, status: JobStatus) {
        if !status.is_terminal() {
            return;
        }
        let message = StatusMessage {
            record_id: request.record_id,
            task: request.task.clone(),
            status,
        };
        if let Err(e) = self.publisher.publish(&message).await {
            tracing::warn!(
                record_id = %request.record_id,
                status = %status,
                error = %e,
                "Failed to publish status"
            );
        }
    }

    /// Best-effort `Error` status for a failed job.
    async fn record_failure(&self, request: &JobRequest, error: JobError) -> JobFailure {
        let record_id = request.record_id;
        tracing::error!(
            record_id = %record_id,
            kind = error.kind(),
            error = %error,
            "Job failed"
        );

        let recorded = match self.statuses.update_status(record_id, JobStatus::Error).await {
            Ok(true) => Ok(()),
            // Nothing written yet for this id, e.g. an unclassifiable task.
            Ok(false) => {
                self.statuses
                    .write_status(record_id, &request.task, JobStatus::Error)
                    .await
            }
            Err(e) => Err(e),
        };

        match recorded {
            Ok(()) => {
                self.notify(request, JobStatus::Error).await;
                JobFailure {
                    error,
                    recorded: true,
                }
            }
            Err(e) => {
                tracing::error!(
                    record_id = %record_id,
                    error = %e,
                    "Could not record Error status"
                );
                JobFailure {
                    error,
                    recorded: false,
                }
            }
        }
    }
}

/// Source of a first-time parse. Only harvest sources are accepted; `REPARSE`
/// provenance is never assigned by a parse request.
fn classify_source(source: Option<&str>) -> Result<RecordSource, JobError> {
    let tag = source.ok_or_else(|| JobError::Classification("missing source".to_string()))?;
    match RecordSource::from_str(tag) {
        Ok(RecordSource::Arxiv) => Ok(RecordSource::Arxiv),
        Ok(RecordSource::Reparse) => Err(JobError::Classification(format!(
            "'{}' is not a harvest source",
            tag
        ))),
        Err(_) => Err(JobError::Classification(format!("unknown source '{}'", tag))),
    }
}

/// Metric label for an inbound task tag, bounded to the known tasks.
fn task_label(task: &str) -> String {
    JobTask::from_str(task)
        .map(|t| t.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Unrecognized tag: {0}")]
    Classification(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("No status record for {0}")]
    StatusMissing(Uuid),

    #[error("Failed to emit parsed record: {0}")]
    Output(#[from] OutputError),
}

impl JobError {
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Classification(_) => "classification",
            JobError::NotFound(_) => "not_found",
            JobError::Parse(_) => "parse",
            JobError::Store(_) => "store",
            JobError::StatusMissing(_) => "status_missing",
            JobError::Output(_) => "output",
        }
    }
}

/// A failed job: the error that ended it and whether its `Error` status
/// reached the status store.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct JobFailure {
    pub error: JobError,
    pub recorded: bool,
}

impl JobFailure {
    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }

    /// True when no `Error` status could be written, so the request should be
    /// delivered again. A recorded failure is final until a new request.
    pub fn needs_redelivery(&self) -> bool {
        !self.recorded
    }
}
