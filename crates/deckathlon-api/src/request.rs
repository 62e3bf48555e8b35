// ── Request/response contract ──
//
// The minimal shape every transport speaks: a URL, a method and an
// optional JSON payload in; a status code and a raw body out.

use std::fmt;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// HTTP method used by the data layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    /// Default for ad-hoc queries, matching the site's form-post convention.
    #[default]
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Absolute URL.
    pub url: String,
    pub method: Method,
    /// JSON body, or query parameters for `GET`.
    pub data: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A received response, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    /// Canonical reason phrase for `status`, if known.
    pub reason: Option<String>,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            reason: reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .map(str::to_owned),
            body: body.into(),
        }
    }

    /// 2xx and 3xx count as success, as they do for the browser client.
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// The transport collaborator the data layer issues requests through.
///
/// Implementations own timeouts and connection management; the data layer
/// assumes nothing beyond "eventually a response or an error".
pub trait Transport: Send + Sync {
    fn request(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, Error>>;
}
