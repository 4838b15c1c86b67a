//! Conversation state for a single chat session and prompt assembly.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::EXPORT_FILE_PREFIX;
use crate::error::{ChatError, Result};

/// One user turn and the assistant's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
    pub timestamp: DateTime<Utc>,
}

impl Exchange {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            timestamp: Utc::now(),
        }
    }

    /// `HH:MM:SS` in local time, as shown next to each message.
    pub fn time_label(&self) -> String {
        self.timestamp.with_timezone(&Local).format("%H:%M:%S").to_string()
    }
}

#[derive(Debug, Default, Clone)]
pub struct Conversation {
    exchanges: Vec<Exchange>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn export_text(&self) -> String {
        export_text(&self.exchanges)
    }
}

/// Render exchanges as the plain-text transcript offered for download.
pub fn export_text(exchanges: &[Exchange]) -> String {
    let mut lines = Vec::with_capacity(exchanges.len() * 3);
    for ex in exchanges {
        lines.push(format!("User: {}", ex.user));
        lines.push(format!("Assistant: {}", ex.assistant));
        lines.push("---".to_string());
    }
    lines.join("\n")
}

pub fn export_file_name(now: DateTime<Local>) -> String {
    format!("{}{}.txt", EXPORT_FILE_PREFIX, now.format("%Y%m%d_%H%M%S"))
}

/// Build the text sent to the model: the last `window` exchanges as context,
/// followed by the current question. Without history the prompt is sent as is.
pub fn build_prompt(history: &[Exchange], prompt: &str, window: usize) -> String {
    if history.is_empty() || window == 0 {
        return prompt.to_string();
    }
    let start = history.len().saturating_sub(window);
    let context = history[start..]
        .iter()
        .map(|ex| format!("User: {}\nAssistant: {}", ex.user, ex.assistant))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Previous conversation:\n{context}\n\nCurrent question: {prompt}")
}

/// Trim the message and reject it when nothing is left.
pub fn normalize_message(message: &str) -> Result<&str> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(ChatError::InvalidInput("message is empty".into()));
    }
    Ok(trimmed)
}

/// Canned prompts offered as one-click buttons.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuickAction {
    pub id: &'static str,
    pub label: &'static str,
    pub prompt: &'static str,
}

pub const QUICK_ACTIONS: &[QuickAction] = &[
    QuickAction {
        id: "explain-ai",
        label: "Explain AI",
        prompt: "What is artificial intelligence and how does it work?",
    },
    QuickAction {
        id: "coding-help",
        label: "Help with coding",
        prompt: "Can you help me with a coding problem?",
    },
    QuickAction {
        id: "creative-writing",
        label: "Creative writing",
        prompt: "Help me write a creative story or poem",
    },
];

pub fn quick_action(id: &str) -> Option<&'static QuickAction> {
    QUICK_ACTIONS.iter().find(|a| a.id == id)
}
