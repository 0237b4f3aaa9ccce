//! Error types for ragbot.

use std::path::PathBuf;

use thiserror::Error;

use crate::provider::Provider;

/// Errors raised by the retrieval, prompt and model layers.
///
/// Only [`ChatError::IndexUnavailable`] and [`ChatError::InvalidTemplate`] are
/// allowed to stop the application, and only at startup. Everything else is
/// contained by the worker that hit it and shown as an `Error: ` chat entry.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The chunk index directory or one of its files is missing or unreadable.
    #[error("No chunk index found at {path:?}: {reason}")]
    IndexUnavailable { path: PathBuf, reason: String },

    /// The index files exist but disagree with each other.
    #[error("Chunk index is corrupt: {0}")]
    IndexCorrupt(String),

    /// The query embedding model failed to load or to embed.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The language-model backend answered with a failure.
    #[error("{provider} error: {message}")]
    Provider { provider: Provider, message: String },

    #[error("{} API key not configured. Set {} or add it to the config file", .0.display_name(), .0.api_key_env().unwrap_or("an API key"))]
    MissingApiKey(Provider),

    #[error("Invalid instruction template: {0}")]
    InvalidTemplate(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_names_env_var() {
        let msg = ChatError::MissingApiKey(Provider::OpenAI).to_string();
        assert!(msg.contains("OPENAI_API_KEY"));
        assert!(msg.contains("ChatGPT (OpenAI)"));
    }

    #[test]
    fn test_provider_error_display() {
        let err = ChatError::Provider {
            provider: Provider::Claude,
            message: "429 Too Many Requests".to_string(),
        };
        assert_eq!(err.to_string(), "claude error: 429 Too Many Requests");
    }
}
