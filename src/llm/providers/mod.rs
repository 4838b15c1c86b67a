//! Provider implementations and the startup factory.

pub mod dialogflow;
pub mod echo;
pub mod gemini;

use crate::config::{ProviderKind, Settings};
use crate::llm::{LlmProvider, ProviderError};

/// Construct the server-wide provider from settings.
///
/// Returns `Ok(None)` when the selected backend has no credentials yet; the
/// web UI can still run and accept per-session Gemini keys.
pub fn build(settings: &Settings) -> Result<Option<LlmProvider>, ProviderError> {
    match settings.provider {
        ProviderKind::Echo => Ok(Some(LlmProvider::Echo(echo::EchoProvider))),
        ProviderKind::Gemini => match settings.gemini_api_key.as_deref() {
            Some(key) if !key.is_empty() => build_gemini(settings, key.to_string()).map(Some),
            _ => Ok(None),
        },
        ProviderKind::Dialogflow => {
            match (&settings.dialogflow_project_id, &settings.dialogflow_access_token) {
                (Some(project), Some(token)) => {
                    let p = dialogflow::DialogflowProvider::new(
                        settings.dialogflow_api_base.clone(),
                        project.clone(),
                        token.clone(),
                        settings.dialogflow_language_code.clone(),
                        settings.request_timeout(),
                    )?;
                    Ok(Some(LlmProvider::Dialogflow(p)))
                }
                _ => Ok(None),
            }
        }
    }
}

/// Build a Gemini provider for an explicit key, e.g. one a user pasted into the UI.
pub fn build_gemini(settings: &Settings, api_key: String) -> Result<LlmProvider, ProviderError> {
    let p = gemini::GeminiProvider::new(
        settings.gemini_api_base.clone(),
        settings.gemini_model.clone(),
        api_key,
        settings.request_timeout(),
    )?;
    Ok(LlmProvider::Gemini(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_always_builds() {
        let settings = Settings {
            provider: ProviderKind::Echo,
            ..Settings::default()
        };
        let p = build(&settings).unwrap().unwrap();
        assert_eq!(p.name(), "echo");
    }

    #[test]
    fn gemini_without_key_is_none() {
        let settings = Settings::default();
        assert!(build(&settings).unwrap().is_none());
    }

    #[test]
    fn gemini_with_key_builds() {
        let settings = Settings {
            gemini_api_key: Some("secret".into()),
            ..Settings::default()
        };
        assert_eq!(build(&settings).unwrap().unwrap().name(), "gemini");
    }

    #[test]
    fn dialogflow_needs_project_and_token() {
        let mut settings = Settings {
            provider: ProviderKind::Dialogflow,
            dialogflow_project_id: Some("proj".into()),
            ..Settings::default()
        };
        assert!(build(&settings).unwrap().is_none());
        settings.dialogflow_access_token = Some("tok".into());
        assert_eq!(build(&settings).unwrap().unwrap().name(), "dialogflow");
    }
}
