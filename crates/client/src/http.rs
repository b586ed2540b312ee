//! REST client for the hosted entity backend.
//!
//! Every collection lives under `{base_url}/entities/{Entity}`. Filters are
//! sent as a JSON predicate in the `q` query parameter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

use crate::error::ClientError;
use crate::store::{EntityStore, Filter, Record};

const BODY_PREVIEW_CHARS: usize = 160;

/// [`EntityStore`] backed by the hosted HTTP API.
#[derive(Debug)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpStore {
    /// Create a store for `base_url` (e.g. `https://fleet.example.org/api`).
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(client, base_url, api_key)
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
    ) -> Result<Self, ClientError> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(ClientError::Config("base URL must not be empty".to_string()));
        }
        let base_url = Url::parse(trimmed)
            .map_err(|e| ClientError::Config(format!("invalid base URL '{trimmed}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "base URL '{trimmed}' cannot carry a path"
            )));
        }
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn collection_url(&self, entity: &str) -> Url {
        self.entity_url(&[entity])
    }

    fn row_url(&self, entity: &str, id: &str) -> Url {
        self.entity_url(&[entity, id])
    }

    /// Append `entities/{segments..}` to the base path, percent-encoding
    /// each segment.
    fn entity_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("entities").extend(segments);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or the mapped error.
    async fn ensure_success(
        response: reqwest::Response,
        entity: &str,
        id: &str,
    ) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = match response.bytes().await {
            Ok(bytes) => body_preview(&bytes),
            Err(_) => "<unreadable body>".to_string(),
        };
        Err(map_status_error(status, body, entity, id))
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        entity: &str,
        id: &str,
    ) -> Result<T, ClientError> {
        let response = Self::ensure_success(response, entity, id).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl EntityStore for HttpStore {
    async fn list(&self, entity: &str) -> Result<Vec<Record>, ClientError> {
        let response = self
            .authorize(self.client.get(self.collection_url(entity)))
            .send()
            .await?;
        Self::parse_response(response, entity, "").await
    }

    async fn filter(&self, entity: &str, predicate: &Filter) -> Result<Vec<Record>, ClientError> {
        let q = serde_json::to_string(predicate)?;
        let response = self
            .authorize(self.client.get(self.collection_url(entity)))
            .query(&[("q", q)])
            .send()
            .await?;
        Self::parse_response(response, entity, "").await
    }

    async fn get(&self, entity: &str, id: &str) -> Result<Record, ClientError> {
        let response = self
            .authorize(self.client.get(self.row_url(entity, id)))
            .send()
            .await?;
        Self::parse_response(response, entity, id).await
    }

    async fn create(&self, entity: &str, payload: &Value) -> Result<Record, ClientError> {
        let response = self
            .authorize(self.client.post(self.collection_url(entity)))
            .json(payload)
            .send()
            .await?;
        Self::parse_response(response, entity, "").await
    }

    async fn update(&self, entity: &str, id: &str, patch: &Value) -> Result<Record, ClientError> {
        let response = self
            .authorize(self.client.put(self.row_url(entity, id)))
            .json(patch)
            .send()
            .await?;
        Self::parse_response(response, entity, id).await
    }

    async fn delete(&self, entity: &str, id: &str) -> Result<(), ClientError> {
        let response = self
            .authorize(self.client.delete(self.row_url(entity, id)))
            .send()
            .await?;
        Self::ensure_success(response, entity, id).await?;
        Ok(())
    }

    async fn bulk_create(&self, entity: &str, payloads: &[Value]) -> Result<Vec<Record>, ClientError> {
        let response = self
            .authorize(self.client.post(self.entity_url(&[entity, "bulk"])))
            .json(payloads)
            .send()
            .await?;
        Self::parse_response(response, entity, "").await
    }
}

fn map_status_error(status: StatusCode, body: String, entity: &str, id: &str) -> ClientError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited(if body.is_empty() {
            format!("status {}", status.as_u16())
        } else {
            format!("status {}: {}", status.as_u16(), body)
        }),
        StatusCode::NOT_FOUND => ClientError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        },
        _ => ClientError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

/// Whitespace-compacted, length-capped body text for error messages.
fn body_preview(body: &[u8]) -> String {
    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(BODY_PREVIEW_CHARS).collect::<String>();
    if compact.chars().count() > BODY_PREVIEW_CHARS {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn status_mapping() {
        assert_matches!(
            map_status_error(StatusCode::TOO_MANY_REQUESTS, String::new(), "VRApp", ""),
            ClientError::RateLimited(msg) if msg == "status 429"
        );
        assert_matches!(
            map_status_error(StatusCode::NOT_FOUND, "gone".into(), "DeviceApp", "r1"),
            ClientError::NotFound { entity, id } if entity == "DeviceApp" && id == "r1"
        );
        assert_matches!(
            map_status_error(StatusCode::BAD_GATEWAY, "upstream".into(), "VRApp", ""),
            ClientError::Api { status: 502, body } if body == "upstream"
        );
    }

    #[test]
    fn preview_compacts_and_truncates() {
        assert_eq!(body_preview(b"  bad \n request  "), "bad request");
        let long = "x".repeat(400);
        let preview = body_preview(long.as_bytes());
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), BODY_PREVIEW_CHARS + 3);
    }

    #[test]
    fn empty_base_url_is_rejected() {
        assert_matches!(
            HttpStore::new("  ", None, Duration::from_secs(5)),
            Err(ClientError::Config(_))
        );
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        assert_matches!(
            HttpStore::new("fleet.example.org", None, Duration::from_secs(5)),
            Err(ClientError::Config(_))
        );
    }

    #[test]
    fn urls_strip_trailing_slash() {
        let store = HttpStore::with_client(reqwest::Client::new(), "http://h/api/", None).unwrap();
        assert_eq!(store.collection_url("VRApp").as_str(), "http://h/api/entities/VRApp");
        assert_eq!(store.row_url("VRApp", "a1").as_str(), "http://h/api/entities/VRApp/a1");
        assert_eq!(
            store.entity_url(&["VRApp", "bulk"]).as_str(),
            "http://h/api/entities/VRApp/bulk"
        );
    }

    #[test]
    fn row_ids_are_percent_encoded() {
        let store = HttpStore::with_client(reqwest::Client::new(), "http://h/api", None).unwrap();
        assert_eq!(
            store.row_url("DeviceApp", "a/b?c#d e").as_str(),
            "http://h/api/entities/DeviceApp/a%2Fb%3Fc%23d%20e"
        );
    }
}
