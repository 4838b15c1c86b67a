// Defaults for settings that may be overridden from the environment or the CLI.

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_DIALOGFLOW_API_BASE: &str = "https://dialogflow.googleapis.com/v2";
pub const DEFAULT_LANGUAGE_CODE: &str = "en";

pub const DEFAULT_DB_PATH: &str = "chat_history.db";
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_PORT: u16 = 8501;

// Slider ranges exposed by the web UI.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const MIN_MAX_TOKENS: u32 = 100;
pub const MAX_MAX_TOKENS: u32 = 2000;

/// Number of past exchanges folded into each prompt.
pub const DEFAULT_HISTORY_WINDOW: usize = 5;
/// Minimum spacing between outbound vendor calls.
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Live in-memory sessions; the least recently active one is evicted beyond this.
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

pub const EXPORT_FILE_PREFIX: &str = "chat_history_";
