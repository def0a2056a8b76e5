use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::{description_prompt, GenAiError, TextGenerator};

/// Configuration for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL including the version segment, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Expected embedding length for `embedding_model`.
    pub dimensions: usize,
    /// Client-side deadline per request. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            chat_model: "gpt-4o-mini".into(),
            embedding_model: "text-embedding-ada-002".into(),
            temperature: 0.7,
            max_tokens: 100,
            dimensions: 1536,
            timeout_secs: None,
        }
    }
}

pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, GenAiError> {
        if config.api_key.trim().is_empty() {
            return Err(GenAiError::MissingApiKey { provider: "openai" });
        }

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().map_err(|e| GenAiError::Request {
            message: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, GenAiError> {
        let url = self.endpoint(path);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenAiError::Request {
                message: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| GenAiError::Request {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            tracing::warn!(%url, status = status.as_u16(), "generation provider rejected request");
            return Err(GenAiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| GenAiError::malformed(e.to_string()))
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn describe_book(
        &self,
        title: &str,
        author: &str,
        genre: &str,
    ) -> Result<String, GenAiError> {
        let body = json!({
            "model": self.config.chat_model,
            "messages": [{
                "role": "user",
                "content": description_prompt(title, author, genre),
            }],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let completion: ChatCompletion = self.post("chat/completions", body).await?;
        completion.into_text()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GenAiError> {
        let body = json!({
            "model": self.config.embedding_model,
            "input": text,
        });

        let response: EmbeddingResponse = self.post("embeddings", body).await?;
        response.into_vector(self.config.dimensions)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl ChatCompletion {
    fn into_text(self) -> Result<String, GenAiError> {
        let content = self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenAiError::malformed("completion has no message content"))?;

        let content = content.trim();
        if content.is_empty() {
            return Err(GenAiError::malformed("completion is empty"));
        }
        Ok(content.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_vector(self, expected: usize) -> Result<Vec<f32>, GenAiError> {
        let vector = self
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| GenAiError::malformed("embedding response has no data"))?;

        if vector.len() != expected {
            return Err(GenAiError::malformed(format!(
                "expected {} dimensions, got {}",
                expected,
                vector.len()
            )));
        }
        Ok(vector)
    }
}
