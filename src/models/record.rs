use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Provenance of a parsed record.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordSource {
    Arxiv,
    Reparse,
}

/// Latest parsed artifact for a record id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedRecord {
    pub id: Uuid,
    pub s3_key: String,
    /// JSON `null` when the row exists without parsed output.
    pub parsed_data: serde_json::Value,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub source: RecordSource,
}

impl ParsedRecord {
    pub fn has_parsed_data(&self) -> bool {
        !self.parsed_data.is_null()
    }
}

/// Parsed artifact emitted to downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedRecordMessage {
    pub record_id: Uuid,
    pub s3_key: String,
    pub source: RecordSource,
    pub parsed_data: serde_json::Value,
    /// Set when the message republishes stored data without a new parse.
    pub resend: bool,
}

impl ParsedRecordMessage {
    pub fn from_record(record: &ParsedRecord, resend: bool) -> Self {
        Self {
            record_id: record.id,
            s3_key: record.s3_key.clone(),
            source: record.source,
            parsed_data: record.parsed_data.clone(),
            resend,
        }
    }
}
