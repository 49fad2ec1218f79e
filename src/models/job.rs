use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Status of a parse or reparse job.
///
/// The text form (`"Pending"`, `"Success"`, ...) is what gets persisted in the
/// `job_status` table and published on the status channel.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, AsRefStr,
)]
pub enum JobStatus {
    Pending,
    Processing,
    Error,
    Success,
    Unchanged,
}

impl JobStatus {
    /// Terminal statuses end a job; nothing moves a record out of them except
    /// a new request for the same record id.
    pub fn is_terminal(self) -> bool {
        match self {
            JobStatus::Pending | JobStatus::Processing => false,
            JobStatus::Error | JobStatus::Success | JobStatus::Unchanged => true,
        }
    }
}

/// Task requested by an inbound job.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobTask {
    /// First-time processing of freshly harvested input.
    Parse,
    /// Reprocessing of a previously stored record.
    Reparse,
}

/// One row of the status table. There is at most one per record id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusRecord {
    pub record_id: Uuid,
    pub job_request: String,
    pub status: JobStatus,
    pub date_added: DateTime<Utc>,
    pub date_of_last_attempt: DateTime<Utc>,
    pub date_of_last_success: Option<DateTime<Utc>>,
}

/// Decoded inbound job request.
///
/// `task` and `source` stay as raw strings: classifying them is part of
/// processing the job, and an unrecognized tag is recorded as an `Error`
/// status rather than rejected at decode time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRequest {
    pub record_id: Uuid,
    pub task: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub force: Option<bool>,
    #[serde(default)]
    pub resend: Option<bool>,
    /// Location of the raw object. Defaults to `/<record_id>`.
    #[serde(default)]
    pub s3_key: Option<String>,
    /// Raw record supplied inline with a parse request.
    #[serde(default)]
    pub raw_data: Option<String>,
}

impl JobRequest {
    pub fn parse(record_id: Uuid, source: &str, raw_data: impl Into<String>) -> Self {
        Self {
            record_id,
            task: JobTask::Parse.to_string(),
            source: Some(source.to_string()),
            force: None,
            resend: None,
            s3_key: None,
            raw_data: Some(raw_data.into()),
        }
    }

    pub fn reparse(record_id: Uuid, force: bool, resend: bool) -> Self {
        Self {
            record_id,
            task: JobTask::Reparse.to_string(),
            source: None,
            force: Some(force),
            resend: Some(resend),
            s3_key: None,
            raw_data: None,
        }
    }

    pub fn is_force(&self) -> bool {
        self.force.unwrap_or(false)
    }

    pub fn is_resend(&self) -> bool {
        self.resend.unwrap_or(false)
    }

    pub fn object_key(&self) -> String {
        self.s3_key
            .clone()
            .unwrap_or_else(|| format!("/{}", self.record_id))
    }
}

/// Payload published on the status channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusMessage {
    pub record_id: Uuid,
    pub task: String,
    pub status: JobStatus,
}
