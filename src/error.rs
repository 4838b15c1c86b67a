//! Crate-wide error type.

use thiserror::Error;

use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no API key configured; set GEMINI_API_KEY or provide a key for this session")]
    NotConfigured,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    #[error("error generating response: {0}")]
    Provider(#[from] ProviderError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for ChatError {
    fn from(e: rusqlite::Error) -> Self {
        ChatError::Storage(e.to_string())
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
