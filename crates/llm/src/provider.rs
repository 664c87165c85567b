use async_trait::async_trait;

/// Trait for text-generation backends — each provider implements this.
///
/// This is the system's single external collaborator: it may fail, hang, or
/// return arbitrary text. Callers own prompt construction and response
/// parsing; providers only move bytes.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send a system prompt plus a user prompt and return the raw response text.
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} — {body}")]
    ApiError { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}
