//! Queue names and wire envelopes.
//!
//! This module defines:
//! - The statically configured queue names shared by workers and the web API
//! - The request/response envelopes used by the RPC layer
//! - The job payloads carried on each queue

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scrape::ScrapingOptions;

/// Queue name for fire-and-forget investigation jobs.
pub const INVESTIGATE_QUEUE: &str = "investigate";

/// Queue name for the scrape RPC.
pub const SCRAPE_QUEUE: &str = "scrape";

/// Queue name for the text analysis RPC.
pub const ANALYZE_QUEUE: &str = "analyze_text";

/// Infix separating a base queue name from a correlation id.
const REPLY_INFIX: &str = "_reply_";

/// Suffix of the queue receiving messages rejected by a consume loop.
const DEAD_LETTER_SUFFIX: &str = "_dead_letter";

/// Name of the ephemeral reply destination for one call.
///
/// For base queue `scrape` and id `abc`, returns `scrape_reply_abc`.
pub fn reply_queue_name(queue: &str, correlation_id: &str) -> String {
    format!("{queue}{REPLY_INFIX}{correlation_id}")
}

/// Name of the dead-letter queue paired with `queue`.
pub fn dead_letter_queue_name(queue: &str) -> String {
    format!("{queue}{DEAD_LETTER_SUFFIX}")
}

// =============================================================================
// RPC Envelopes
// =============================================================================

/// Request envelope published on the base queue of a request/response queue.
///
/// `data` is kept as a dynamically typed JSON value so the transport layer
/// never needs to know the caller's request type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    /// Correlation id, unique per call
    pub id: String,
    /// Reply destination the responder must publish to
    pub reply_to: String,
    /// Caller payload, `null` when absent
    #[serde(default)]
    pub data: Value,
}

/// Response envelope published on a reply destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Echo of the request correlation id
    pub id: String,
    /// Handler result, meaningful only when `error` is empty
    #[serde(default)]
    pub data: Value,
    /// Handler failure text
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ResponseMessage {
    /// Build a success response.
    pub fn success(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
            error: String::new(),
        }
    }

    /// Build an error response.
    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: Value::Null,
            error: error.into(),
        }
    }

    /// Whether the responder reported a failure.
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

// =============================================================================
// Job Payloads
// =============================================================================

/// Investigation job: scrape a page, then analyze its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigateJob {
    /// Page to investigate
    pub url: String,
}

/// Request carried by the scrape RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    /// Page to scrape
    pub url: String,
    /// Extraction options; worker defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ScrapingOptions>,
}

/// Request carried by the text analysis RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Text to analyze
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_queue_name() {
        assert_eq!(reply_queue_name("scrape", "abc-123"), "scrape_reply_abc-123");
        assert_ne!(reply_queue_name("scrape", "abc"), SCRAPE_QUEUE);
    }

    #[test]
    fn test_dead_letter_queue_name() {
        assert_eq!(dead_letter_queue_name("investigate"), "investigate_dead_letter");
    }

    #[test]
    fn test_request_message_wire_fields() {
        let request = RequestMessage {
            id: "test-id".to_string(),
            reply_to: "reply-queue".to_string(),
            data: json!("test data"),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"id": "test-id", "reply_to": "reply-queue", "data": "test data"})
        );
    }

    #[test]
    fn test_request_without_data_field() {
        let request: RequestMessage =
            serde_json::from_str(r#"{"id": "x", "reply_to": "scrape_reply_x"}"#).unwrap();
        assert_eq!(request.data, Value::Null);
        assert_eq!(request.reply_to, "scrape_reply_x");
    }

    #[test]
    fn test_success_response_omits_error() {
        let response = ResponseMessage::success("test-id", json!("response data"));
        let json = serde_json::to_string(&response).unwrap();

        assert!(!json.contains("error"));
        assert!(!response.is_error());
    }

    #[test]
    fn test_error_response() {
        let response = ResponseMessage::failure("test-id", "processing failed");
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["error"], "processing failed");
        assert_eq!(value["data"], Value::Null);
        assert!(response.is_error());
    }

    #[test]
    fn test_response_without_data_field() {
        let response: ResponseMessage =
            serde_json::from_str(r#"{"id": "x", "error": "boom"}"#).unwrap();
        assert_eq!(response.data, Value::Null);
        assert_eq!(response.error, "boom");
    }

    #[test]
    fn test_scrape_request_minimal() {
        let request: ScrapeRequest =
            serde_json::from_str(r#"{"url": "https://example.com"}"#).unwrap();
        assert_eq!(request.url, "https://example.com");
        assert!(request.options.is_none());
    }
}
