//! Provider abstraction over the external AI services.
//!
//! `LlmProvider` is an enum over the concrete backends so callers need no
//! trait objects. Adding a backend means a new module in `providers/`, a new
//! variant here and a new arm in `complete`.

pub mod providers;

use thiserror::Error;

use crate::config::GenerationParams;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("response blocked: {0}")]
    Blocked(String),
    #[error("empty response from provider")]
    Empty,
}

/// One outbound generation request.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    /// Used by session-aware backends such as Dialogflow.
    pub session_id: &'a str,
    pub params: GenerationParams,
}

#[derive(Debug, Clone)]
pub enum LlmProvider {
    Gemini(providers::gemini::GeminiProvider),
    Dialogflow(providers::dialogflow::DialogflowProvider),
    Echo(providers::echo::EchoProvider),
}

impl LlmProvider {
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Gemini(_) => "gemini",
            LlmProvider::Dialogflow(_) => "dialogflow",
            LlmProvider::Echo(_) => "echo",
        }
    }

    /// Send the request to the backend and return its text reply.
    pub async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Gemini(p) => p.complete(request).await,
            LlmProvider::Dialogflow(p) => p.complete(request).await,
            LlmProvider::Echo(p) => p.complete(request).await,
        }
    }
}
