/// HTTP client for a managed search index (Azure Cognitive Search REST shape).
///
/// Sends `POST {endpoint}/indexes/{index}/docs/search?api-version=...` with a
/// free-text query and maps the `value` array into typed documents. The
/// `@search.score` field becomes the document score; remaining scalar fields
/// are kept as string metadata.
use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::http::{envelope_message, read_limited_text};

const SCORE_FIELD: &str = "@search.score";

#[derive(Clone, Debug)]
pub struct SearchClientConfig {
    pub endpoint: String,
    pub index: String,
    /// Sent as the `api-key` header when present.
    pub api_key: Option<String>,
    pub api_version: String,
    /// Name of the document field holding the unique key.
    pub id_field: String,
    /// Name of the document field holding the searchable text.
    pub content_field: String,
    pub default_timeout: Duration,
    pub max_error_body_bytes: usize,
}

impl SearchClientConfig {
    /// Load from environment variables.
    ///
    /// Required:
    /// - `SEARCH_ENDPOINT`: service URL, e.g. "https://myservice.search.windows.net"
    /// - `SEARCH_INDEX`: index name
    ///
    /// Optional:
    /// - `SEARCH_API_KEY`: query key (omit for keyless local services)
    /// - `SEARCH_API_VERSION` (default "2023-11-01")
    /// - `SEARCH_ID_FIELD` (default "id")
    /// - `SEARCH_CONTENT_FIELD` (default "content")
    /// - `SEARCH_TIMEOUT_SECS` (default 10)
    pub fn from_env() -> Result<Self, SearchClientError> {
        let endpoint = std::env::var("SEARCH_ENDPOINT").map_err(|_| {
            SearchClientError::Config("SEARCH_ENDPOINT environment variable is required".into())
        })?;
        let index = std::env::var("SEARCH_INDEX").map_err(|_| {
            SearchClientError::Config("SEARCH_INDEX environment variable is required".into())
        })?;

        let api_key = std::env::var("SEARCH_API_KEY").ok();
        let api_version =
            std::env::var("SEARCH_API_VERSION").unwrap_or_else(|_| "2023-11-01".to_string());
        let id_field = std::env::var("SEARCH_ID_FIELD").unwrap_or_else(|_| "id".to_string());
        let content_field =
            std::env::var("SEARCH_CONTENT_FIELD").unwrap_or_else(|_| "content".to_string());

        let default_timeout = std::env::var("SEARCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(10));

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index,
            api_key,
            api_version,
            id_field,
            content_field,
            default_timeout,
            max_error_body_bytes: 8 * 1024,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchClientError {
    #[error("config error: {0}")]
    Config(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("search service rejected credentials: status={status}")]
    Auth { status: StatusCode },

    #[error("search service returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("search service returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },
}

/// One document returned from the index.
#[derive(Debug, Clone)]
pub struct SearchDocument {
    pub id: String,
    pub content: String,
    /// Raw relevance score as reported by the service (unbounded).
    pub score: f32,
    /// Remaining scalar fields of the document.
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    search: &'a str,
    top: usize,
}

#[derive(Clone)]
pub struct SearchClient {
    config: SearchClientConfig,
    http: reqwest::Client,
}

impl SearchClient {
    pub fn new(config: SearchClientConfig) -> Result<Self, SearchClientError> {
        let http = reqwest::Client::builder()
            .user_agent("car-advisor/search")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &SearchClientConfig {
        &self.config
    }

    /// Run a free-text search, returning up to `top` documents ranked by the
    /// service. Zero hits is an empty vector, not an error.
    pub async fn search(
        &self,
        text: &str,
        top: usize,
    ) -> Result<Vec<SearchDocument>, SearchClientError> {
        let url = format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.config.endpoint, self.config.index, self.config.api_version
        );

        let mut req = self
            .http
            .post(&url)
            .timeout(self.config.default_timeout)
            .json(&SearchRequest { search: text, top });
        if let Some(key) = &self.config.api_key {
            req = req.header("api-key", key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SearchClientError::Auth { status });
        }
        if !status.is_success() {
            let body = read_limited_text(resp, self.config.max_error_body_bytes).await;
            return Err(match envelope_message(&body) {
                Some(message) => SearchClientError::Upstream { status, message },
                None => SearchClientError::UpstreamBody { status, body },
            });
        }

        let body: Value = resp.json().await?;
        Ok(self.extract_documents(&body))
    }

    /// Map the response `value` array into documents. Entries missing the id
    /// or content field are skipped with a warning rather than failing the
    /// whole result.
    fn extract_documents(&self, body: &Value) -> Vec<SearchDocument> {
        let Some(entries) = body.get("value").and_then(Value::as_array) else {
            warn!("search response missing 'value' array");
            return Vec::new();
        };

        let mut documents = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(obj) = entry.as_object() else {
                warn!("search result entry is not an object, skipping");
                continue;
            };

            let Some(id) = obj.get(&self.config.id_field).and_then(Value::as_str) else {
                warn!(field = %self.config.id_field, "search result missing id field, skipping");
                continue;
            };
            let Some(content) = obj.get(&self.config.content_field).and_then(Value::as_str)
            else {
                warn!(
                    id,
                    field = %self.config.content_field,
                    "search result missing content field, skipping"
                );
                continue;
            };

            let score = obj
                .get(SCORE_FIELD)
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as f32;

            let mut fields = BTreeMap::new();
            for (key, value) in obj {
                if key == &self.config.id_field
                    || key == &self.config.content_field
                    || key.starts_with("@search.")
                {
                    continue;
                }
                // Vectors and nested objects are index internals, not metadata.
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                fields.insert(key.clone(), text);
            }

            documents.push(SearchDocument {
                id: id.to_string(),
                content: content.to_string(),
                score,
                fields,
            });
        }
        documents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> SearchClient {
        SearchClient::new(SearchClientConfig {
            endpoint: "http://localhost".into(),
            index: "cars".into(),
            api_key: None,
            api_version: "2023-11-01".into(),
            id_field: "id".into(),
            content_field: "content".into(),
            default_timeout: Duration::from_secs(1),
            max_error_body_bytes: 1024,
        })
        .expect("client")
    }

    #[test]
    fn extracts_documents_with_metadata() {
        let body = serde_json::json!({
            "value": [
                {
                    "@search.score": 2.5,
                    "id": "doc-1",
                    "content": "A compact hatchback.",
                    "brand": "Fiat",
                    "year": 2021,
                    "embedding": [0.1, 0.2]
                }
            ]
        });
        let docs = test_client().extract_documents(&body);
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.id, "doc-1");
        assert_eq!(doc.content, "A compact hatchback.");
        assert!((doc.score - 2.5).abs() < f32::EPSILON);
        assert_eq!(doc.fields.get("brand").map(String::as_str), Some("Fiat"));
        assert_eq!(doc.fields.get("year").map(String::as_str), Some("2021"));
        assert!(!doc.fields.contains_key("embedding"));
        assert!(!doc.fields.contains_key("@search.score"));
    }

    #[test]
    fn skips_entries_missing_required_fields() {
        let body = serde_json::json!({
            "value": [
                { "@search.score": 1.0, "content": "no id here" },
                { "@search.score": 1.0, "id": "doc-2", "content": "ok" }
            ]
        });
        let docs = test_client().extract_documents(&body);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "doc-2");
    }

    #[test]
    fn empty_value_array_is_empty_result() {
        let body = serde_json::json!({ "value": [] });
        assert!(test_client().extract_documents(&body).is_empty());
    }
}
