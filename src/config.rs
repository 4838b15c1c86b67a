//! Runtime settings, read from CLI flags or the environment (`.env` is loaded first).

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{ChatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini text generation.
    Gemini,
    /// Dialogflow ES intent detection.
    Dialogflow,
    /// Offline echo provider, useful for demos.
    Echo,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Dialogflow => "dialogflow",
            ProviderKind::Echo => "echo",
        };
        f.write_str(name)
    }
}

#[derive(Args, Debug, Clone)]
pub struct Settings {
    #[arg(long, global = true, value_enum, env = "CHATBOT_PROVIDER", default_value_t = ProviderKind::Gemini)]
    pub provider: ProviderKind,

    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, global = true, env = "GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    pub gemini_model: String,

    #[arg(long, global = true, env = "GEMINI_API_BASE", default_value = DEFAULT_GEMINI_API_BASE)]
    pub gemini_api_base: String,

    #[arg(long, global = true, env = "DIALOGFLOW_PROJECT_ID")]
    pub dialogflow_project_id: Option<String>,

    #[arg(long, global = true, env = "DIALOGFLOW_ACCESS_TOKEN", hide_env_values = true)]
    pub dialogflow_access_token: Option<String>,

    #[arg(long, global = true, env = "DIALOGFLOW_LANGUAGE_CODE", default_value = DEFAULT_LANGUAGE_CODE)]
    pub dialogflow_language_code: String,

    #[arg(long, global = true, env = "DIALOGFLOW_API_BASE", default_value = DEFAULT_DIALOGFLOW_API_BASE)]
    pub dialogflow_api_base: String,

    #[arg(long, global = true, env = "CHATBOT_TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    #[arg(long, global = true, env = "CHATBOT_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    #[arg(long, global = true, env = "CHATBOT_HISTORY_WINDOW", default_value_t = DEFAULT_HISTORY_WINDOW)]
    pub history_window: usize,

    #[arg(long, global = true, env = "CHATBOT_MIN_INTERVAL_MS", default_value_t = DEFAULT_MIN_INTERVAL_MS)]
    pub min_interval_ms: u64,

    #[arg(long, global = true, env = "CHATBOT_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    #[arg(long, global = true, env = "CHATBOT_MAX_SESSIONS", default_value_t = DEFAULT_MAX_SESSIONS)]
    pub max_sessions: usize,

    #[arg(long, global = true, env = "CHATBOT_DB", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    #[arg(long, global = true, env = "CHATBOT_TEMPLATES", default_value = DEFAULT_TEMPLATES_DIR)]
    pub templates_dir: PathBuf,

    #[arg(long, global = true, env = "CHATBOT_STATIC", default_value = DEFAULT_STATIC_DIR)]
    pub static_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            dialogflow_project_id: None,
            dialogflow_access_token: None,
            dialogflow_language_code: DEFAULT_LANGUAGE_CODE.to_string(),
            dialogflow_api_base: DEFAULT_DIALOGFLOW_API_BASE.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            history_window: DEFAULT_HISTORY_WINDOW,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            templates_dir: PathBuf::from(DEFAULT_TEMPLATES_DIR),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        GenerationParams::checked(self.temperature, self.max_tokens)
            .map_err(|e| ChatError::Config(e.to_string()))?;
        if self.history_window == 0 {
            return Err(ChatError::Config("history window must be at least 1".into()));
        }
        if self.max_sessions == 0 {
            return Err(ChatError::Config("max sessions must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ChatError::Config("request timeout must be at least 1 second".into()));
        }
        Ok(())
    }

    pub fn generation_defaults(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            max_output_tokens: self.max_tokens,
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether the server itself can answer without a per-session key.
    pub fn has_server_credentials(&self) -> bool {
        match self.provider {
            ProviderKind::Gemini => self.gemini_api_key.as_deref().is_some_and(|k| !k.is_empty()),
            ProviderKind::Dialogflow => {
                self.dialogflow_project_id.is_some() && self.dialogflow_access_token.is_some()
            }
            ProviderKind::Echo => true,
        }
    }
}

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    pub fn checked(temperature: f32, max_output_tokens: u32) -> Result<Self> {
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(ChatError::InvalidInput(format!(
                "temperature must be between {MIN_TEMPERATURE} and {MAX_TEMPERATURE}, got {temperature}"
            )));
        }
        if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&max_output_tokens) {
            return Err(ChatError::InvalidInput(format!(
                "max tokens must be between {MIN_MAX_TOKENS} and {MAX_MAX_TOKENS}, got {max_output_tokens}"
            )));
        }
        Ok(Self {
            temperature,
            max_output_tokens,
        })
    }

    /// Apply optional per-request overrides on top of these defaults.
    pub fn with_overrides(self, temperature: Option<f32>, max_tokens: Option<u32>) -> Result<Self> {
        Self::checked(
            temperature.unwrap_or(self.temperature),
            max_tokens.unwrap_or(self.max_output_tokens),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.generation_defaults().temperature, 0.7);
        assert_eq!(settings.generation_defaults().max_output_tokens, 500);
        assert_eq!(settings.min_interval(), Duration::from_secs(1));
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        assert!(GenerationParams::checked(1.5, 500).is_err());
        assert!(GenerationParams::checked(-0.1, 500).is_err());
        assert!(GenerationParams::checked(0.0, 500).is_ok());
        assert!(GenerationParams::checked(1.0, 500).is_ok());
    }

    #[test]
    fn max_tokens_out_of_range_rejected() {
        assert!(GenerationParams::checked(0.5, 99).is_err());
        assert!(GenerationParams::checked(0.5, 2001).is_err());
        assert!(GenerationParams::checked(0.5, 100).is_ok());
        assert!(GenerationParams::checked(0.5, 2000).is_ok());
    }

    #[test]
    fn overrides_fall_back_to_defaults() {
        let base = Settings::default().generation_defaults();
        let p = base.with_overrides(Some(0.2), None).unwrap();
        assert_eq!(p.temperature, 0.2);
        assert_eq!(p.max_output_tokens, 500);
        assert!(base.with_overrides(None, Some(5000)).is_err());
    }

    #[test]
    fn zero_history_window_is_config_error() {
        let settings = Settings {
            history_window: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ChatError::Config(_))));
    }

    #[test]
    fn zero_session_capacity_is_config_error() {
        let settings = Settings {
            max_sessions: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ChatError::Config(_))));
    }

    #[test]
    fn server_credentials_by_provider() {
        let mut settings = Settings::default();
        assert!(!settings.has_server_credentials());
        settings.gemini_api_key = Some(String::new());
        assert!(!settings.has_server_credentials());
        settings.gemini_api_key = Some("abc".into());
        assert!(settings.has_server_credentials());

        settings.provider = ProviderKind::Dialogflow;
        assert!(!settings.has_server_credentials());
        settings.dialogflow_project_id = Some("proj".into());
        settings.dialogflow_access_token = Some("tok".into());
        assert!(settings.has_server_credentials());

        settings.provider = ProviderKind::Echo;
        assert!(settings.has_server_credentials());
    }
}
