//! Gemini embedding adapter.
//!
//! Talks to the `models/{model}:batchEmbedContents` endpoint of the Generative
//! Language API. Retries are not performed here; this adapter only classifies
//! failures so [`crate::EmbedderPool`] can decide what to retry.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use semdex_core::{EmbedError, Embedder, Embedding};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "text-embedding-004";

/// Longest provider error body forwarded into [`EmbedError::Provider`].
const MAX_ERROR_BODY: usize = 512;

/// Settings for [`GeminiEmbedder`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key, resolved by the caller
    pub api_key: String,
    /// Model name, with or without the `models/` prefix
    pub model_name: String,
    /// API base URL
    pub base_url: String,
    /// Output dimensionality requested from the model
    pub dimension: usize,
    /// Maximum texts per request
    pub max_batch_size: usize,
    /// HTTP request timeout
    pub timeout: Duration,
    /// Task type for document batches (`RETRIEVAL_DOCUMENT`, `SEMANTIC_SIMILARITY`, ...)
    pub task_type: Option<String>,
    /// Task type for search queries; falls back to `task_type` when unset
    pub query_task_type: Option<String>,
}

/// Default task type for indexed documents.
pub const DOCUMENT_TASK_TYPE: &str = "RETRIEVAL_DOCUMENT";

/// Default task type for search queries.
pub const QUERY_TASK_TYPE: &str = "RETRIEVAL_QUERY";

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model_name: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            dimension: 768,
            max_batch_size: 100,
            timeout: Duration::from_secs(30),
            task_type: Some(DOCUMENT_TASK_TYPE.to_string()),
            query_task_type: Some(QUERY_TASK_TYPE.to_string()),
        }
    }
}

/// Embedder backed by the Gemini embedding API.
pub struct GeminiEmbedder {
    client: Client,
    endpoint: String,
    model_path: String,
    config: GeminiConfig,
}

impl GeminiEmbedder {
    /// Build a client for the configured model.
    pub fn new(config: GeminiConfig) -> Result<Self, EmbedError> {
        if config.api_key.trim().is_empty() {
            return Err(EmbedError::Config("missing Gemini API key".to_string()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(config.api_key.trim())
                .map_err(|_| EmbedError::Config("invalid Gemini API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbedError::Transport(format!("failed to build HTTP client: {e}")))?;

        let model_path = model_path(&config.model_name);
        let endpoint = format!(
            "{}/{}:batchEmbedContents",
            config.base_url.trim_end_matches('/'),
            model_path
        );

        Ok(Self {
            client,
            endpoint,
            model_path,
            config,
        })
    }

    /// Request URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn query_task_type(&self) -> Option<&str> {
        self.config
            .query_task_type
            .as_deref()
            .or(self.config.task_type.as_deref())
    }

    fn request_body<'a>(&'a self, texts: &[&'a str], task_type: Option<&'a str>) -> BatchRequest<'a> {
        BatchRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: &self.model_path,
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    output_dimensionality: Some(self.config.dimension),
                    task_type,
                })
                .collect(),
        }
    }

    fn map_transport(&self, err: &reqwest::Error) -> EmbedError {
        if err.is_timeout() {
            EmbedError::Timeout(self.config.timeout)
        } else if err.is_decode() {
            EmbedError::InvalidResponse(err.to_string())
        } else {
            EmbedError::Transport(err.to_string())
        }
    }
}

fn model_path(model_name: &str) -> String {
    if model_name.starts_with("models/") {
        model_name.to_string()
    } else {
        format!("models/{model_name}")
    }
}

/// Classify a non-success HTTP response.
fn classify_status(status: StatusCode, retry_after: Option<&str>, body: &str) -> EmbedError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return EmbedError::RateLimited {
            retry_after: retry_after
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        };
    }
    let mut message: String = body.chars().take(MAX_ERROR_BODY).collect();
    if message.is_empty() {
        message = status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string();
    }
    EmbedError::Provider {
        status: status.as_u16(),
        message,
    }
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<&'a str>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbedError> {
        self.send(texts, self.config.task_type.as_deref()).await
    }

    async fn embed_query(&self, query: &str) -> Result<Embedding, EmbedError> {
        let mut vectors = self.send(&[query], self.query_task_type()).await?;
        vectors.pop().ok_or(EmbedError::LengthMismatch {
            expected: 1,
            actual: 0,
        })
    }
}

impl GeminiEmbedder {
    async fn send(&self, texts: &[&str], task_type: Option<&str>) -> Result<Vec<Embedding>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > self.config.max_batch_size {
            return Err(EmbedError::BatchTooLarge {
                size: texts.len(),
                max: self.config.max_batch_size,
            });
        }

        debug!("Requesting {} embeddings from {}", texts.len(), self.model_path);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(texts, task_type))
            .send()
            .await
            .map_err(|e| self.map_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after.as_deref(), &body));
        }

        let parsed: BatchResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport(&e))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(EmbedError::LengthMismatch {
                expected: texts.len(),
                actual: parsed.embeddings.len(),
            });
        }

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}
