//! Wire types of the upstream chat endpoint.
//!
//! The endpoint itself is opaque to the caching layer; these models let the
//! network-first route recognise its error replies and give clients of the
//! proxy a typed contract.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub use_web_search: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_queries: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_entry_point: Option<bool>,
}

/// Inline image, base64 data optionally prefixed with a data-URL header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub data: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAttachment {
    pub data: String,
    pub mime_type: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Successful answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub text: String,
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub search_entry_point: bool,
}

/// Body of an error reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Failure classes the endpoint distinguishes by status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    /// 400, content or format rejected by the model
    ContentRejected,
    /// 413
    PayloadTooLarge,
    /// 429
    RateLimited,
    /// 503, model overloaded
    Overloaded,
    /// 500 and anything else
    Internal,
}

impl ChatErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ChatErrorKind::ContentRejected,
            StatusCode::PAYLOAD_TOO_LARGE => ChatErrorKind::PayloadTooLarge,
            StatusCode::TOO_MANY_REQUESTS => ChatErrorKind::RateLimited,
            StatusCode::SERVICE_UNAVAILABLE => ChatErrorKind::Overloaded,
            _ => ChatErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ChatErrorKind::ContentRejected => StatusCode::BAD_REQUEST,
            ChatErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ChatErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ChatErrorKind::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            ChatErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatErrorKind::ContentRejected => "content_rejected",
            ChatErrorKind::PayloadTooLarge => "payload_too_large",
            ChatErrorKind::RateLimited => "rate_limited",
            ChatErrorKind::Overloaded => "overloaded",
            ChatErrorKind::Internal => "internal",
        }
    }
}
