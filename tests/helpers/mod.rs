//! Test doubles for the orchestrator's collaborators

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parse_reconciler::{
    db::{
        memory::{MemoryParsedRecordStore, MemoryStatusStore},
        ParsedRecordStore, StatusStore, StoreError,
    },
    models::{
        job::{JobStatus, JobStatusRecord, StatusMessage},
        record::{ParsedRecordMessage, RecordSource},
    },
    services::{
        orchestrator::ReparseOrchestrator,
        output::{OutputError, OutputSink},
        parser::{ParseError, RecordParser},
        publisher::{PublishError, StatusPublisher},
        storage::{MemoryProvider, ObjectStore, ProviderSet},
    },
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Parser that answers every call with a fixed result.
pub struct MockParser {
    result: Mutex<Result<Value, String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    sources: Mutex<Vec<RecordSource>>,
}

impl MockParser {
    pub fn returning(value: Value) -> Self {
        Self {
            result: Mutex::new(Ok(value)),
            delay: None,
            calls: AtomicUsize::new(0),
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Mutex::new(Err(message.to_string())),
            delay: None,
            calls: AtomicUsize::new(0),
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sources(&self) -> Vec<RecordSource> {
        self.sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordParser for MockParser {
    async fn parse(&self, _raw: &[u8], source: RecordSource) -> Result<Value, ParseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sources.lock().unwrap().push(source);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result
            .lock()
            .unwrap()
            .clone()
            .map_err(ParseError::Malformed)
    }
}

/// Parser that looks up the record's current status while it runs.
pub struct StatusObservingParser {
    statuses: Arc<dyn StatusStore>,
    record_id: Uuid,
    result: Value,
    observed: Mutex<Vec<Option<JobStatus>>>,
}

impl StatusObservingParser {
    pub fn new(statuses: Arc<dyn StatusStore>, record_id: Uuid, result: Value) -> Self {
        Self {
            statuses,
            record_id,
            result,
            observed: Mutex::new(Vec::new()),
        }
    }

    pub fn observed(&self) -> Vec<Option<JobStatus>> {
        self.observed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordParser for StatusObservingParser {
    async fn parse(&self, _raw: &[u8], _source: RecordSource) -> Result<Value, ParseError> {
        let current = self
            .statuses
            .get_status(self.record_id, Some(JobStatus::Processing))
            .await
            .unwrap();
        self.observed.lock().unwrap().push(current);
        Ok(self.result.clone())
    }
}

/// Status store that keeps the order of every status written.
#[derive(Default)]
pub struct HistoryStatusStore {
    inner: MemoryStatusStore,
    history: Mutex<Vec<JobStatus>>,
}

impl HistoryStatusStore {
    pub fn history(&self) -> Vec<JobStatus> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusStore for HistoryStatusStore {
    async fn write_status(
        &self,
        record_id: Uuid,
        job_request: &str,
        status: JobStatus,
    ) -> Result<(), StoreError> {
        self.inner.write_status(record_id, job_request, status).await?;
        self.history.lock().unwrap().push(status);
        Ok(())
    }

    async fn update_status(&self, record_id: Uuid, status: JobStatus) -> Result<bool, StoreError> {
        let updated = self.inner.update_status(record_id, status).await?;
        if updated {
            self.history.lock().unwrap().push(status);
        }
        Ok(updated)
    }

    async fn get_status(
        &self,
        record_id: Uuid,
        only_status: Option<JobStatus>,
    ) -> Result<Option<JobStatus>, StoreError> {
        self.inner.get_status(record_id, only_status).await
    }

    async fn get_job(&self, record_id: Uuid) -> Result<Option<JobStatusRecord>, StoreError> {
        self.inner.get_job(record_id).await
    }
}

/// Orchestrator over in-memory records and a single in-memory provider.
pub fn orchestrator_with(
    statuses: Arc<dyn StatusStore>,
    parser: Arc<dyn RecordParser>,
) -> ReparseOrchestrator {
    ReparseOrchestrator::new(
        statuses,
        Arc::new(MemoryParsedRecordStore::new()),
        ProviderSet::new(Duration::from_secs(5)).with_provider("AWS", Arc::new(MemoryProvider::new())),
        parser,
        Arc::new(RecordingOutput::default()),
        Arc::new(RecordingPublisher::default()),
    )
}

/// Output sink that keeps every emitted message.
#[derive(Default)]
pub struct RecordingOutput {
    messages: Mutex<Vec<ParsedRecordMessage>>,
    failing: AtomicBool,
}

impl RecordingOutput {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<ParsedRecordMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutputSink for RecordingOutput {
    async fn emit(&self, message: &ParsedRecordMessage) -> Result<(), OutputError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OutputError::Unavailable("producer down".into()));
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Status publisher that keeps every published message.
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<StatusMessage>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<StatusMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish(&self, message: &StatusMessage) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable("channel down".into()));
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// An orchestrator wired to in-memory collaborators, with handles kept for
/// assertions. Providers are `AWS` then `MINIO`.
pub struct Harness {
    pub statuses: Arc<MemoryStatusStore>,
    pub records: Arc<MemoryParsedRecordStore>,
    pub aws: Arc<MemoryProvider>,
    pub minio: Arc<MemoryProvider>,
    pub parser: Arc<MockParser>,
    pub output: Arc<RecordingOutput>,
    pub publisher: Arc<RecordingPublisher>,
    pub orchestrator: ReparseOrchestrator,
}

impl Harness {
    pub fn new(parser: MockParser) -> Self {
        Self::with_timeout(parser, Duration::from_secs(5))
    }

    pub fn with_timeout(parser: MockParser, parser_timeout: Duration) -> Self {
        let statuses = Arc::new(MemoryStatusStore::new());
        let records = Arc::new(MemoryParsedRecordStore::new());
        let aws = Arc::new(MemoryProvider::new());
        let minio = Arc::new(MemoryProvider::new());
        let parser = Arc::new(parser);
        let output = Arc::new(RecordingOutput::default());
        let publisher = Arc::new(RecordingPublisher::default());

        let providers = ProviderSet::new(Duration::from_secs(5))
            .with_provider("AWS", aws.clone())
            .with_provider("MINIO", minio.clone());

        let orchestrator = ReparseOrchestrator::new(
            statuses.clone(),
            records.clone(),
            providers,
            parser.clone(),
            output.clone(),
            publisher.clone(),
        )
        .with_parser_timeout(parser_timeout);

        Self {
            statuses,
            records,
            aws,
            minio,
            parser,
            output,
            publisher,
            orchestrator,
        }
    }

    /// Store a previously parsed record the way an earlier parse would have.
    pub async fn seed_record(&self, id: Uuid, s3_key: &str, parsed_data: Value) {
        self.records
            .write_record(id, seeded_date(), s3_key, &parsed_data, RecordSource::Arxiv)
            .await
            .expect("seed parsed record");
    }

    pub async fn seed_object(&self, provider: &MemoryProvider, key: &str, data: &str) {
        provider
            .write_object(key, data.as_bytes())
            .await
            .expect("seed raw object");
    }
}

pub fn seeded_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()
}
