//! Gemini API client: batched embeddings and SSE-streamed generation

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::{EmbeddingConfig, GeminiConfig};
use crate::error::{Error, Result};
use crate::providers::embedding::EmbeddingProvider;
use crate::providers::generation::{GenerationOptions, TextGenerator, TokenStream};

/// The batchEmbedContents endpoint caps requests per call
const MAX_EMBED_BATCH: usize = 100;

/// Gemini API client authenticated by API key
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
    api_key: String,
    dimensions: usize,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbedContentRequest {
    model: String,
    content: RequestContent,
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Serialize)]
struct RequestContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: RequestGenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
}

#[derive(Deserialize)]
struct StreamResponse {
    candidates: Option<Vec<StreamCandidate>>,
}

#[derive(Deserialize)]
struct StreamCandidate {
    content: Option<StreamContent>,
}

#[derive(Deserialize)]
struct StreamContent {
    parts: Option<Vec<StreamPart>>,
}

#[derive(Deserialize)]
struct StreamPart {
    text: Option<String>,
}

impl GeminiClient {
    /// Create a client, reading the API key from the configured env var
    pub fn new(config: &GeminiConfig, embedding: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| Error::Config(format!("{} environment variable is not set", config.api_key_env)))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
            dimensions: embedding.dimensions,
            max_retries: embedding.max_retries,
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.config.base_url, model, method)
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        let delay = Duration::from_secs(2u64.pow(attempt));
                        tracing::warn!(
                            "Gemini request failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            self.max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Embedding("Unknown error".to_string())))
    }

    async fn embed_batch_call(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.model_url(&self.config.embedding_model, "batchEmbedContents");
        let model_path = format!("models/{}", self.config.embedding_model);

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: model_path.clone(),
                    content: content_for_embedding(text),
                })
                .collect(),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Batch embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Batch embedding failed: HTTP {} - {}",
                status, body
            )));
        }

        let batch: BatchEmbedResponse = response.json().await.map_err(|e| {
            Error::Embedding(format!("Failed to parse batch embedding response: {}", e))
        })?;

        if batch.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Batch embedding returned {} vectors for {} texts",
                batch.embeddings.len(),
                texts.len()
            )));
        }

        Ok(batch.embeddings.into_iter().map(|e| e.values).collect())
    }
}

/// The API rejects empty content, so blank pages embed as a single space
fn content_for_embedding(text: &str) -> RequestContent {
    let text = if text.trim().is_empty() { " " } else { text };
    RequestContent {
        role: None,
        parts: vec![RequestPart {
            text: text.to_string(),
        }],
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = self.model_url(&self.config.embedding_model, "embedContent");
        let model_path = format!("models/{}", self.config.embedding_model);
        let text = text.to_string();
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        self.retry_request(|| {
            let url = url.clone();
            let model_path = model_path.clone();
            let text = text.clone();
            let client = client.clone();
            let api_key = api_key.clone();

            async move {
                let request = EmbedContentRequest {
                    model: model_path,
                    content: content_for_embedding(&text),
                };

                let response = client
                    .post(&url)
                    .header("x-goog-api-key", &api_key)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| Error::Embedding(format!("Embedding request failed: {}", e)))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::Embedding(format!(
                        "Embedding failed: HTTP {} - {}",
                        status, body
                    )));
                }

                let embed_response: EmbedContentResponse = response.json().await.map_err(|e| {
                    Error::Embedding(format!("Failed to parse embedding response: {}", e))
                })?;

                Ok(embed_response.embedding.values)
            }
        })
        .await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for group in texts.chunks(MAX_EMBED_BATCH) {
            let batch = self.retry_request(|| self.embed_batch_call(group)).await?;
            embeddings.extend(batch);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/v1beta/models?pageSize=1", self.config.base_url);

        match self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_stream(
        &self,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<TokenStream> {
        let url = format!(
            "{}?alt=sse",
            self.model_url(&self.config.generation_model, "streamGenerateContent")
        );

        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: Some("user".to_string()),
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: RequestGenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_output_tokens,
                top_p: options.top_p,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::GenerationStream(format!("Stream request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::GenerationStream(format!(
                "Stream failed: HTTP {} - {}",
                status, body
            )));
        }

        // SSE data lines can split across network chunks; buffer until newline
        let mut line_buf = String::new();
        let stream = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => {
                    line_buf.push_str(&String::from_utf8_lossy(&bytes));
                    drain_sse_lines(&mut line_buf)
                }
                Err(e) => vec![Err(Error::GenerationStream(format!("Stream error: {}", e)))],
            })
            .flat_map(futures_util::stream::iter);

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<bool> {
        EmbeddingProvider::health_check(self).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Parse every complete SSE line in the buffer, leaving any partial
/// trailing line in place. Only `data:` lines carry payloads.
fn drain_sse_lines(buf: &mut String) -> Vec<Result<String>> {
    let mut pieces = Vec::new();

    while let Some(pos) = buf.find('\n') {
        let line: String = buf.drain(..=pos).collect();
        let line = line.trim_end_matches(['\n', '\r']);

        let Some(payload) = line.strip_prefix("data:") else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            continue;
        }

        match serde_json::from_str::<StreamResponse>(payload) {
            Ok(response) => {
                let text = extract_candidate_text(&response);
                if !text.is_empty() {
                    pieces.push(Ok(text));
                }
            }
            Err(e) => pieces.push(Err(Error::GenerationStream(format!(
                "Malformed stream event: {}",
                e
            )))),
        }
    }

    pieces
}

fn extract_candidate_text(response: &StreamResponse) -> String {
    let mut out = String::new();
    let Some(candidates) = &response.candidates else {
        return out;
    };
    for candidate in candidates {
        let parts = candidate
            .content
            .as_ref()
            .and_then(|c| c.parts.as_ref());
        if let Some(parts) = parts {
            for part in parts {
                if let Some(text) = &part.text {
                    out.push_str(text);
                }
            }
        }
    }
    out
}
