//! OpenRouter HTTP client.
//!
//! Wire protocol:
//!
//! - `POST <base>/chat/completions` with `{model, messages, temperature,
//!   response_format?, max_tokens?}`, OpenAI-compatible response.
//! - `POST <base>/embeddings` with `{model, input: [..]}`. Some providers
//!   return errors inside a 200 body; an `error` field is treated as a
//!   failure.
//!
//! Retry ladder: 429 waits `Retry-After` (or `2^attempt` seconds) and
//! retries; 5xx and transport errors retry with exponential backoff;
//! other 4xx fail immediately with the provider's message.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use gofriq::config::GofrIqConfig;
use gofriq::{Error, Result};
use gofriq_chroma::Embedder;

/// A chat message in API format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    /// A `system` role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    /// A `user` role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Result of a chat completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
}

impl ChatCompletion {
    /// Parse the content as JSON, stripping markdown code fences if the
    /// model wrapped its output.
    pub fn as_json(&self) -> Result<Value> {
        let content = strip_code_fences(&self.content);
        serde_json::from_str(content.trim())
            .map_err(|e| Error::ExtractionParse(format!("response is not valid JSON: {e}")))
    }
}

/// Strip a leading/trailing markdown code fence (```json ... ```).
#[must_use]
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence line (``` or ```json).
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").map_or(body, str::trim_end).trim()
}

/// Result of a batch embedding call.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingBatch {
    pub embeddings: Vec<Vec<f32>>,
    pub model: String,
}

impl EmbeddingBatch {
    /// Dimensionality of the returned vectors.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.embeddings.first().map_or(0, Vec::len)
    }
}

/// OpenRouter API client.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    max_retries: u32,
}

impl OpenRouterClient {
    /// Build a client from resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no API key is configured.
    pub fn from_config(config: &GofrIqConfig) -> Result<Self> {
        let api_key = config
            .openrouter_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::config("GOFR_IQ_OPENROUTER_API_KEY must be set"))?;

        let http = reqwest::Client::builder()
            .timeout(config.llm_timeout)
            .build()
            .map_err(|e| Error::llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.openrouter_base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model: config.llm_model.clone(),
            embedding_model: config.embedding_model.clone(),
            max_retries: config.llm_max_retries,
        })
    }

    /// Build a client against an explicit base URL (tests, self-hosted
    /// gateways).
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(gofriq::config::DEFAULT_LLM_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::llm(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            chat_model: gofriq::config::DEFAULT_LLM_MODEL.to_string(),
            embedding_model: gofriq::config::DEFAULT_EMBEDDING_MODEL.to_string(),
            max_retries: gofriq::config::DEFAULT_LLM_MAX_RETRIES,
        })
    }

    /// Set the chat model.
    #[must_use]
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Set the embedding model.
    #[must_use]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn post_json(&self, endpoint: &str, payload: &Value) -> Result<Value> {
        let url = format!("{}{endpoint}", self.base_url);
        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .header("HTTP-Referer", "https://github.com/gofr/gofr-iq")
                .header("X-Title", "Gofr-IQ News Intelligence")
                .json(payload)
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(Error::llm(format!("network error: {e}")));
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<f64>().ok());
                if attempt < self.max_retries {
                    let wait = retry_after
                        .map(Duration::from_secs_f64)
                        .unwrap_or_else(|| backoff(attempt));
                    tracing::warn!(attempt, wait_secs = wait.as_secs_f64(), "rate limited, backing off");
                    tokio::time::sleep(wait).await;
                    continue;
                }
                return Err(Error::RateLimited { retry_after });
            }

            if status.is_server_error() {
                last_error =
                    Some(Error::llm(format!("server error ({})", status.as_u16())));
                if attempt < self.max_retries {
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
                break;
            }

            if status.is_client_error() {
                let body = response.text().await.unwrap_or_default();
                let detail = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")
                            .and_then(|e| e.get("message"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .unwrap_or(body);
                return Err(Error::llm(format!(
                    "API error ({}): {detail}",
                    status.as_u16()
                )));
            }

            return response
                .json()
                .await
                .map_err(|e| Error::llm(format!("invalid response body: {e}")));
        }

        Err(last_error.unwrap_or_else(|| Error::llm("request failed after all retries")))
    }

    /// Generate a chat completion.
    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        json_mode: bool,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<ChatCompletion> {
        let mut payload = json!({
            "model": self.chat_model,
            "messages": messages,
            "temperature": temperature,
        });
        if json_mode {
            payload["response_format"] = json!({"type": "json_object"});
        }
        if let Some(max_tokens) = max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        tracing::debug!(model = %self.chat_model, json_mode, messages = messages.len(), "chat completion");
        let response = self.post_json("/chat/completions", &payload).await?;

        let choice = response
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| Error::llm("response carried no choices"))?;
        let content = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::llm("response carried no message content"))?;

        Ok(ChatCompletion {
            content: content.to_string(),
            model: response
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&self.chat_model)
                .to_string(),
            finish_reason: choice
                .get("finish_reason")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Generate embeddings for a batch of texts.
    pub async fn generate_embeddings(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch { embeddings: Vec::new(), model: self.embedding_model.clone() });
        }

        let payload = json!({
            "model": self.embedding_model,
            "input": texts,
        });
        tracing::debug!(model = %self.embedding_model, texts = texts.len(), "embeddings");
        let response = self.post_json("/embeddings", &payload).await?;

        // Some providers return 200 with an embedded error object.
        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown embedding error");
            return Err(Error::llm(format!("embedding failed: {message}")));
        }

        let data = response
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::llm("embedding response missing 'data' field"))?;

        let mut embeddings = Vec::with_capacity(data.len());
        for item in data {
            let vector: Vec<f32> = item
                .get("embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::llm("embedding item missing vector"))?
                .iter()
                .filter_map(Value::as_f64)
                .map(|f| f as f32)
                .collect();
            embeddings.push(vector);
        }

        Ok(EmbeddingBatch {
            embeddings,
            model: response
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&self.embedding_model)
                .to_string(),
        })
    }
}

#[async_trait]
impl Embedder for OpenRouterClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.generate_embeddings(texts).await?.embeddings)
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}
