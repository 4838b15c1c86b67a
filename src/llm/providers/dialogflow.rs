//! Dialogflow ES `detectIntent` client.
//!
//! Each chat session maps onto a Dialogflow session, so the agent keeps its
//! own context between turns. Authentication is a bearer access token
//! (e.g. from `gcloud auth print-access-token`).

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::llm::{CompletionRequest, ProviderError};

#[derive(Clone)]
pub struct DialogflowProvider {
    client: Client,
    api_base: String,
    project_id: String,
    access_token: String,
    language_code: String,
}

impl std::fmt::Debug for DialogflowProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogflowProvider")
            .field("api_base", &self.api_base)
            .field("project_id", &self.project_id)
            .field("language_code", &self.language_code)
            .finish_non_exhaustive()
    }
}

impl DialogflowProvider {
    pub fn new(
        api_base: String,
        project_id: String,
        access_token: String,
        language_code: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        if project_id.trim().is_empty() {
            return Err(ProviderError::NotConfigured("Dialogflow project id is empty".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            project_id,
            access_token,
            language_code,
        })
    }

    /// Dialogflow sees only the raw utterance; it tracks context itself.
    #[instrument(skip(self, request), fields(project = %self.project_id, session = %request.session_id))]
    pub async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        let url = format!(
            "{}/projects/{}/agent/sessions/{}:detectIntent",
            self.api_base, self.project_id, request.session_id
        );
        let payload = DetectIntentRequest {
            query_input: QueryInput {
                text: TextInput {
                    text: request.prompt.to_string(),
                    language_code: self.language_code.clone(),
                },
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Dialogflow request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Dialogflow API request failed");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed = response
            .json::<DetectIntentResponse>()
            .await
            .map_err(|e| ProviderError::Request(format!("failed to parse response body: {e}")))?;
        reply_from(parsed)
    }
}

fn reply_from(response: DetectIntentResponse) -> Result<String, ProviderError> {
    let result = response.query_result.ok_or(ProviderError::Empty)?;
    debug!(
        intent = ?result.intent.as_ref().map(|i| i.display_name.as_str()),
        confidence = result.intent_detection_confidence,
        "detected intent"
    );
    if let Some(text) = result.fulfillment_text.filter(|t| !t.trim().is_empty()) {
        return Ok(text);
    }
    match result.intent {
        Some(intent) if !intent.display_name.is_empty() => Ok(format!("[intent: {}]", intent.display_name)),
        _ => Err(ProviderError::Empty),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectIntentRequest {
    query_input: QueryInput,
}

#[derive(Serialize)]
struct QueryInput {
    text: TextInput,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextInput {
    text: String,
    language_code: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DetectIntentResponse {
    query_result: Option<QueryResult>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    fulfillment_text: Option<String>,
    intent: Option<Intent>,
    #[serde(default)]
    intent_detection_confidence: f32,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Intent {
    #[serde(default)]
    display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> DetectIntentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn fulfillment_text_wins() {
        let r = parse(
            r#"{"queryResult":{"fulfillmentText":"Hi there!","intent":{"displayName":"greeting"},"intentDetectionConfidence":0.9}}"#,
        );
        assert_eq!(reply_from(r).unwrap(), "Hi there!");
    }

    #[test]
    fn falls_back_to_intent_name() {
        let r = parse(r#"{"queryResult":{"fulfillmentText":"","intent":{"displayName":"order.status"}}}"#);
        assert_eq!(reply_from(r).unwrap(), "[intent: order.status]");
    }

    #[test]
    fn nothing_matched_is_empty() {
        let r = parse(r#"{"queryResult":{}}"#);
        assert!(matches!(reply_from(r), Err(ProviderError::Empty)));
    }

    #[test]
    fn empty_project_rejected() {
        let err = DialogflowProvider::new(
            "http://localhost".into(),
            " ".into(),
            "tok".into(),
            "en".into(),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
