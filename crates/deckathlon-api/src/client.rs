// HTTP transport backed by reqwest.
//
// Encodes `GET` payloads as query parameters and everything else as a JSON
// body. The response is handed back verbatim -- envelope interpretation
// lives in `deckathlon-core`.

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::request::{ApiRequest, ApiResponse, Method, Transport};
use crate::transport::TransportConfig;

/// Raw HTTP client for the game server's JSON API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport from a `TransportConfig`.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http })
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        let mut url = Url::parse(&request.url)?;
        debug!("{} {}", request.method, url);

        let builder = match request.method {
            Method::Get => {
                if let Some(ref data) = request.data {
                    append_query(&mut url, data);
                }
                self.http.get(url)
            }
            Method::Post => self.http.post(url),
            Method::Put => self.http.put(url),
            Method::Delete => self.http.delete(url),
        };

        let builder = match (request.method, request.data) {
            (Method::Get, _) | (_, None) => builder,
            (_, Some(data)) => builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(&data)?),
        };

        let resp = builder.send().await.map_err(Error::Transport)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(Error::Transport)?;

        Ok(ApiResponse::new(status, body))
    }
}

impl Transport for HttpTransport {
    fn request(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, Error>> {
        Box::pin(self.send(request))
    }
}

/// Append a JSON object as `key=value` pairs. Strings go in verbatim,
/// other values as their JSON text; a non-object payload becomes a single
/// `data` parameter.
fn append_query(url: &mut Url, data: &Value) {
    match data {
        Value::Null => {}
        Value::Object(map) if map.is_empty() => {}
        Value::Object(map) => {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in map {
                match value {
                    Value::String(s) => pairs.append_pair(key, s),
                    Value::Null => pairs.append_pair(key, ""),
                    other => pairs.append_pair(key, &other.to_string()),
                };
            }
        }
        other => {
            url.query_pairs_mut()
                .append_pair("data", &other.to_string());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn query_encodes_scalars_and_nested_values() {
        let mut url = Url::parse("http://host/api/poll").unwrap();
        append_query(&mut url, &json!({"dt_from": "2020-01-01", "ids": [1, 2], "n": 3}));
        assert_eq!(
            url.query(),
            Some("dt_from=2020-01-01&ids=%5B1%2C2%5D&n=3")
        );
    }

    #[test]
    fn query_ignores_null_payload() {
        let mut url = Url::parse("http://host/api/poll").unwrap();
        append_query(&mut url, &Value::Null);
        assert_eq!(url.query(), None);
    }
}
