//! Text generation collaborators for the book catalog.
//!
//! A [`TextGenerator`] writes a short description for a book and turns text
//! into a fixed-length embedding vector. Two providers ship here:
//!
//! - [`OpenAiClient`]: an OpenAI-compatible REST API.
//! - [`LocalGenerator`]: a deterministic offline stand-in for development.

use async_trait::async_trait;
use thiserror::Error;

mod local;
mod openai;

pub use local::LocalGenerator;
pub use openai::{OpenAiClient, OpenAiConfig};

/// Errors from a text generation provider.
#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("no API key configured for {provider}")]
    MissingApiKey { provider: &'static str },

    #[error("generation request failed: {message}")]
    Request { message: String },

    #[error("generation provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse generation response: {message}")]
    MalformedResponse { message: String },
}

impl GenAiError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &'static str;

    /// Length of every vector returned by [`TextGenerator::embed`].
    fn dimensions(&self) -> usize;

    /// Write a short description for the given book.
    async fn describe_book(
        &self,
        title: &str,
        author: &str,
        genre: &str,
    ) -> Result<String, GenAiError>;

    /// Embed `text` as a vector of [`TextGenerator::dimensions`] floats.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GenAiError>;
}

/// Prompt sent to chat models when a description is requested.
pub fn description_prompt(title: &str, author: &str, genre: &str) -> String {
    format!(
        "Write a short, engaging description for a book titled '{}' by {} in the {} genre.",
        title, author, genre
    )
}
