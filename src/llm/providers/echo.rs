//! Echo provider: returns the prompt prefixed with `[echo]`.
//! Lets the whole UI round-trip run without vendor credentials.

use crate::llm::{CompletionRequest, ProviderError};

#[derive(Debug, Clone)]
pub struct EchoProvider;

impl EchoProvider {
    pub async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        Ok(format!("[echo] {}", request.prompt))
    }
}
