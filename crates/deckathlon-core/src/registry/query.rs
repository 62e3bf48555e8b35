// ── Backend queries ──
//
// Request builder, `{data}` envelope handling, the TTL cache and the
// re-authenticate-then-retry flow for HTTP 401.

use std::fmt;

use deckathlon_api::{ApiRequest, ApiResponse, Method};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::DataRegistry;
use super::cache::{CacheKey, CachePolicy};
use crate::error::DataError;

/// Everything that identifies one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// Path relative to the registry root, or a URL already under it.
    pub url: String,
    pub method: Method,
    pub data: Option<Value>,
    pub cache: Option<CachePolicy>,
    /// Go to the network even on a cache hit, but refresh the cache.
    pub skip_cache: bool,
}

impl QueryOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::default(),
            data: None,
            cache: None,
            skip_cache: false,
        }
    }
}

/// A query being built; resolve it with [`send`](Self::send).
#[must_use = "a query does nothing until sent"]
pub struct Query {
    registry: DataRegistry,
    opts: QueryOptions,
}

impl Query {
    pub fn method(mut self, method: Method) -> Self {
        self.opts.method = method;
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.opts.data = Some(data);
        self
    }

    /// Optional payload, for callers carrying `Option<Value>` around.
    pub fn maybe_data(mut self, data: Option<Value>) -> Self {
        self.opts.data = data;
        self
    }

    pub fn cache(mut self, policy: CachePolicy) -> Self {
        self.opts.cache = Some(policy);
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.opts.skip_cache = true;
        self
    }

    pub fn options(&self) -> &QueryOptions {
        &self.opts
    }

    /// Run the query and return the unwrapped `data` payload.
    pub async fn send(self) -> Result<Value, DataError> {
        self.registry.execute(self.opts).await
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("opts", &self.opts).finish()
    }
}

// ── Re-authentication ────────────────────────────────────────────────

/// Handed to [`Hooks::on_unauthorized`](crate::Hooks::on_unauthorized)
/// when a query gets HTTP 401.
///
/// The query that got the 401 stays pending until the handle is retried
/// or dropped.
pub struct RetryHandle {
    registry: DataRegistry,
    opts: QueryOptions,
    reply: oneshot::Sender<Result<Value, DataError>>,
}

impl RetryHandle {
    /// The query that was refused.
    pub fn options(&self) -> &QueryOptions {
        &self.opts
    }

    /// The registry the query ran against, e.g. to log in through.
    pub fn registry(&self) -> &DataRegistry {
        &self.registry
    }

    /// Re-issue the exact original query and resolve the pending one with
    /// its result.
    pub async fn retry(self) {
        let result = self.registry.execute(self.opts).await;
        // The original caller may have gone away.
        let _ = self.reply.send(result);
    }
}

impl fmt::Debug for RetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryHandle")
            .field("url", &self.opts.url)
            .field("method", &self.opts.method)
            .finish_non_exhaustive()
    }
}

// ── Execution ────────────────────────────────────────────────────────

impl DataRegistry {
    /// Start building a query for `url`.
    pub fn query(&self, url: impl Into<String>) -> Query {
        Query {
            registry: self.clone(),
            opts: QueryOptions::new(url),
        }
    }

    /// `url` under the registry root, unless it already is or is absolute.
    pub fn resolve_url(&self, url: &str) -> String {
        let root = self.inner.root_url.read().clone().unwrap_or_default();
        if root.is_empty() || url.starts_with(&root) || url.contains("://") {
            return url.to_owned();
        }
        match (root.ends_with('/'), url.starts_with('/')) {
            (true, true) => format!("{root}{}", url.trim_start_matches('/')),
            (false, false) => format!("{root}/{url}"),
            _ => format!("{root}{url}"),
        }
    }

    pub(crate) async fn execute(&self, opts: QueryOptions) -> Result<Value, DataError> {
        let url = self.resolve_url(&opts.url);
        let cache_key = opts
            .cache
            .map(|_| CacheKey::new(&url, opts.method, opts.data.as_ref()));

        if let Some(key) = &cache_key {
            let hit = self.inner.cache.lookup(key);
            if let (Some(value), false) = (hit, opts.skip_cache) {
                debug!(method = %opts.method, url = %url, "query served from cache");
                tokio::task::yield_now().await;
                return Ok(value);
            }
        }

        let Some(transport) = self.inner.transport.clone() else {
            return Err(DataError::Transport {
                url,
                message: "no transport configured".into(),
            });
        };

        debug!(method = %opts.method, url = %url, "query");
        let mut request = ApiRequest::new(opts.method, url.clone());
        request.data.clone_from(&opts.data);
        let response = transport
            .request(request)
            .await
            .map_err(|e| DataError::from(e).at(&url))?;

        if response.is_unauthorized() {
            return self.unauthorized(url, opts).await;
        }

        let value = unwrap_response(&url, &response)?;
        if let (Some(key), Some(policy)) = (cache_key, opts.cache) {
            self.inner.cache.store(key, value.clone(), policy);
        }
        Ok(value)
    }

    async fn unauthorized(&self, url: String, opts: QueryOptions) -> Result<Value, DataError> {
        warn!(url = %url, "query unauthorized");
        let (reply, pending) = oneshot::channel();
        self.inner.hooks.on_unauthorized(RetryHandle {
            registry: self.clone(),
            opts,
            reply,
        });
        match pending.await {
            Ok(result) => result,
            Err(_) => Err(DataError::Unauthorized { url }),
        }
    }
}

/// Turn a response into the `data` payload or an error.
fn unwrap_response(url: &str, response: &ApiResponse) -> Result<Value, DataError> {
    let parsed: Option<Value> = serde_json::from_str(&response.body).ok();

    if !response.is_success() {
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        return Err(match message {
            Some(message) => DataError::Server {
                url: url.to_owned(),
                status: response.status,
                message,
            },
            None => DataError::server_status(url, response.status, response.reason.as_deref()),
        });
    }

    let Some(Value::Object(mut envelope)) = parsed else {
        return Err(DataError::Server {
            url: url.to_owned(),
            status: response.status,
            message: format!("Error posting to {url}, result: {}", response.body),
        });
    };

    if is_error_envelope(&envelope) {
        let message = envelope
            .get("error")
            .and_then(Value::as_str)
            .map_or_else(
                || format!("Error posting to {url}, result: {}", response.body),
                str::to_owned,
            );
        return Err(DataError::Server {
            url: url.to_owned(),
            status: response.status,
            message,
        });
    }

    Ok(match envelope.remove("data") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(data) => data,
    })
}

fn is_error_envelope(envelope: &Map<String, Value>) -> bool {
    envelope.get("errcode").is_some_and(|v| !v.is_null())
        || envelope.get("status").and_then(Value::as_str) == Some("error")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::RegistryOptions;

    fn response(status: u16, body: Value) -> ApiResponse {
        ApiResponse::new(status, body.to_string())
    }

    #[test]
    fn envelope_data_is_unwrapped() {
        let value = unwrap_response("u", &response(200, json!({"data": [1, 2]}))).unwrap();
        assert_eq!(value, json!([1, 2]));
    }

    #[test]
    fn missing_data_becomes_empty_object() {
        let value = unwrap_response("u", &response(200, json!({"status": "ok"}))).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn error_envelopes_on_success_status() {
        let err = unwrap_response("u", &response(200, json!({"status": "error", "error": "Nope."})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Nope.");

        let err = unwrap_response("u", &response(200, json!({"errcode": 3}))).unwrap_err();
        assert!(err.to_string().starts_with("Error posting to u, result:"));

        assert!(unwrap_response("u", &response(200, json!([1]))).is_err());
        assert!(unwrap_response("u", &ApiResponse::new(200, "not json")).is_err());
    }

    #[test]
    fn error_status_prefers_body_message() {
        let err = unwrap_response("u", &response(409, json!({"error": "Table is full."})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Table is full.");

        let err = unwrap_response("api/x", &ApiResponse::new(500, "boom")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error posting to api/x, result: 500 (Internal Server Error)"
        );
    }

    #[test]
    fn urls_resolve_under_root() {
        let registry = DataRegistry::builder()
            .options(RegistryOptions::default().with_root_url("http://host/api/"))
            .build();
        assert_eq!(registry.resolve_url("tables"), "http://host/api/tables");
        assert_eq!(registry.resolve_url("/tables"), "http://host/api/tables");
        assert_eq!(registry.resolve_url("http://host/api/poll"), "http://host/api/poll");

        let bare = DataRegistry::builder()
            .options(RegistryOptions::default().with_root_url("/api"))
            .build();
        assert_eq!(bare.resolve_url("tables"), "/api/tables");
    }

    #[tokio::test]
    async fn query_without_transport_fails() {
        let registry = DataRegistry::local();
        let err = registry.query("tables").send().await.unwrap_err();
        assert!(matches!(err, DataError::Transport { .. }));
    }
}
