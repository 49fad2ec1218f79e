use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::record::RecordSource;

/// Turns a raw record into structured metadata.
#[async_trait]
pub trait RecordParser: Send + Sync {
    async fn parse(&self, raw: &[u8], source: RecordSource)
        -> Result<serde_json::Value, ParseError>;
}

/// Client for the parser service.
pub struct HttpParserClient {
    http: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct ParseRequest {
    source: RecordSource,
    /// Base64-encoded raw record
    record: String,
}

#[derive(Deserialize)]
struct ParseResponse {
    parsed_data: serde_json::Value,
}

impl HttpParserClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ParseError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl RecordParser for HttpParserClient {
    async fn parse(
        &self,
        raw: &[u8],
        source: RecordSource,
    ) -> Result<serde_json::Value, ParseError> {
        let body = ParseRequest {
            source,
            record: base64::engine::general_purpose::STANDARD.encode(raw),
        };

        let response = self.http.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ParseError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ParseResponse = response.json().await?;
        check_parsed(parsed.parsed_data)
    }
}

/// Parsed metadata is a JSON object; anything else is not stored.
fn check_parsed(parsed: serde_json::Value) -> Result<serde_json::Value, ParseError> {
    match parsed {
        serde_json::Value::Null => Err(ParseError::Empty),
        serde_json::Value::Object(_) => Ok(parsed),
        other => Err(ParseError::Malformed(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parser rejected record ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Parser returned no metadata")]
    Empty,

    #[error("Parser timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed parser output: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_output_is_accepted() {
        let parsed = json!({"title": "A paper"});
        assert_eq!(check_parsed(parsed.clone()).unwrap(), parsed);
    }

    #[test]
    fn test_null_output_is_empty() {
        assert!(matches!(check_parsed(json!(null)), Err(ParseError::Empty)));
    }

    #[test]
    fn test_non_object_output_is_malformed() {
        assert!(matches!(
            check_parsed(json!(["title"])),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            check_parsed(json!("title")),
            Err(ParseError::Malformed(_))
        ));
    }
}
