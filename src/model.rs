//! Data models for the URL shortener
//!
//! Records stored in the registry, request/response bodies for the HTTP API
//! and the small value types shared by the enrichment workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Redirect status used when a link does not ask for anything else.
pub const DEFAULT_REDIRECT_MODE: u16 = 307;

/// Safety classification of a link target.
///
/// Transitions are one-way: `Unknown` moves to `Safe` or `Unsafe` once a
/// verdict arrives and never changes afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Safety {
    #[default]
    Unknown,
    Safe,
    Unsafe,
}

/// A shortened URL as stored in the registry
///
/// The `hash` is derived from `target`, so two requests for the same URL
/// always land on the same record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ShortLink {
    /// Short identifier, 8 lowercase hex characters
    pub hash: String,

    /// The original long URL
    pub target: String,

    /// Timestamp when this link was first created
    pub created_at: DateTime<Utc>,

    /// Optional sponsor supplied by the submitter
    pub sponsor: Option<String>,

    /// IP address of the submitter
    pub owner_ip: String,

    /// Whether a QR code was requested for this link
    #[serde(default)]
    pub qr: bool,

    /// Safety classification, `Unknown` until the oracle answers
    #[serde(default)]
    pub safety: Safety,

    /// HTTP status code used when redirecting
    #[serde(default = "default_mode")]
    pub mode: u16,
}

fn default_mode() -> u16 {
    DEFAULT_REDIRECT_MODE
}

/// Properties supplied alongside a URL at creation time
#[derive(Debug, Clone, Default)]
pub struct CreateProperties {
    pub ip: String,
    pub sponsor: Option<String>,
    pub qr: bool,
}

/// A single redirect served to a client; append-only
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub hash: String,
    pub ip: String,
    pub created_at: DateTime<Utc>,
}

/// Last probe outcome for a target URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachabilityRecord {
    pub reachable: bool,
    pub checked_at: DateTime<Utc>,
}

/// Tri-state answer of a reachability lookup
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    Unknown,
    Reachable,
    Unreachable,
}

/// Click total for one short link
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UrlSum {
    pub hash: String,
    pub sum: u64,
}

/// Click total for one submitter
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserSum {
    pub ip: String,
    pub sum: u64,
}

/// Request payload for creating a new short URL
///
/// # Example
/// ```json
/// {
///   "url": "http://example.com/",
///   "sponsor": "acme",
///   "qr": true
/// }
/// ```
#[derive(Deserialize, Debug, Clone)]
pub struct CreateRequest {
    /// The original URL to be shortened
    pub url: String,

    /// Optional sponsor
    pub sponsor: Option<String>,

    /// Ask for a QR code to be generated in the background
    #[serde(default)]
    pub qr: bool,
}

/// Extra links returned with a created short URL
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct LinkProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
}

/// Response returned after successfully creating a short URL
///
/// # Example
/// ```json
/// {
///   "url": "http://localhost:8080/f684a3c4",
///   "properties": { "qr": "http://localhost:8080/f684a3c4/qr" }
/// }
/// ```
#[derive(Serialize, Deserialize, Debug)]
pub struct CreateResponse {
    pub url: String,
    pub properties: LinkProperties,
}

/// Ranking body returned by the query endpoints
#[derive(Serialize, Deserialize, Debug)]
pub struct ListResponse<T> {
    pub list: Vec<T>,
}

/// Query parameters for listing the links of one submitter
///
/// # Example
/// Query string: `?ip=10.0.0.1&page=2&limit=20`
#[derive(Deserialize)]
pub struct ListParams {
    /// Submitter IP whose links are listed
    pub ip: String,

    /// Page number for pagination (starts from 1)
    pub page: Option<usize>,

    /// Number of items per page, capped at 100
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_link_without_optional_fields_gets_defaults() {
        let json = r#"{
            "hash": "f684a3c4",
            "target": "http://example.com/",
            "created_at": "2024-01-01T00:00:00Z",
            "sponsor": null,
            "owner_ip": "127.0.0.1"
        }"#;

        let link: ShortLink = serde_json::from_str(json).unwrap();
        assert_eq!(link.safety, Safety::Unknown);
        assert!(!link.qr);
        assert_eq!(link.mode, DEFAULT_REDIRECT_MODE);
    }

    #[test]
    fn create_response_omits_missing_qr() {
        let response = CreateResponse {
            url: "http://localhost/f684a3c4".to_string(),
            properties: LinkProperties::default(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["properties"], serde_json::json!({}));
    }
}
