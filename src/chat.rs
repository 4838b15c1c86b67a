// Chat orchestration shared by the web UI and the terminal chat.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{GenerationParams, Settings};
use crate::conversation::{self, Exchange};
use crate::error::{ChatError, Result};
use crate::history::HistoryStore;
use crate::llm::{providers, CompletionRequest, LlmProvider};
use crate::rate_limit::Throttle;
use crate::session::SessionStore;

/// Optional per-message overrides of the sampling parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub exchange: Exchange,
}

pub struct ChatService {
    settings: Settings,
    provider: Option<LlmProvider>,
    sessions: SessionStore,
    history: HistoryStore,
    throttle: Throttle,
}

impl ChatService {
    pub fn new(settings: Settings, provider: Option<LlmProvider>, history: HistoryStore) -> Self {
        let throttle = Throttle::new(settings.min_interval());
        Self {
            sessions: SessionStore::with_capacity(settings.max_sessions),
            settings,
            provider,
            history,
            throttle,
        }
    }

    /// Build the service from settings: provider factory plus on-disk chat log.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let provider = providers::build(&settings)?;
        match &provider {
            Some(p) => info!(provider = p.name(), "server provider configured"),
            None => warn!(
                provider = %settings.provider,
                "no server credentials; users must supply an API key per session"
            ),
        }
        let history = HistoryStore::open(&settings.db_path)?;
        Ok(Self::new(settings, provider, history))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn server_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn session_configured(&self, session_id: Uuid) -> bool {
        self.provider.is_some() || self.sessions.provider(session_id).await.is_some()
    }

    /// Validate a user-supplied Gemini key and attach it to the session.
    #[instrument(skip(self, api_key))]
    pub async fn set_session_key(&self, session_id: Uuid, api_key: &str) -> Result<()> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ChatError::InvalidInput("API key is empty".into()));
        }
        let provider = providers::build_gemini(&self.settings, api_key.to_string())?;
        if let LlmProvider::Gemini(gemini) = &provider {
            self.throttle.acquire().await;
            gemini.ping().await?;
        }
        self.sessions.get_or_create(Some(session_id)).await;
        self.sessions.set_provider(session_id, provider).await?;
        info!(session = %session_id, "session API key configured");
        Ok(())
    }

    /// Session key override first, then the server provider.
    async fn resolve_provider(&self, session_id: Option<Uuid>) -> Result<LlmProvider> {
        let session_provider = match session_id {
            Some(id) => self.sessions.provider(id).await,
            None => None,
        };
        session_provider
            .or_else(|| self.provider.clone())
            .ok_or(ChatError::NotConfigured)
    }

    /// Run one chat turn. On any failure the session and the log are left untouched.
    #[instrument(skip(self, message, overrides), fields(session = tracing::field::Empty))]
    pub async fn send(
        &self,
        session_id: Option<Uuid>,
        message: &str,
        overrides: Overrides,
    ) -> Result<ChatReply> {
        let message = conversation::normalize_message(message)?;
        let params: GenerationParams = self
            .settings
            .generation_defaults()
            .with_overrides(overrides.temperature, overrides.max_tokens)?;

        let provider = self.resolve_provider(session_id).await?;
        let session_id = self.sessions.get_or_create(session_id).await;
        tracing::Span::current().record("session", tracing::field::display(session_id));

        let turn = self.sessions.begin_turn(session_id).await?;
        let prompt = conversation::build_prompt(&turn.history, message, self.settings.history_window);
        debug!(%prompt, "prompt assembled");

        self.throttle.acquire().await;

        let session_key = session_id.to_string();
        let request = CompletionRequest {
            prompt: &prompt,
            session_id: &session_key,
            params,
        };
        let reply = provider.complete(&request).await.map_err(|e| {
            error!(provider = provider.name(), error = %e, "provider call failed");
            ChatError::from(e)
        })?;

        let exchange = Exchange::new(message, reply);
        let store = self.history.clone();
        let logged = exchange.clone();
        tokio::task::spawn_blocking(move || store.append_exchange(session_id, &logged))
            .await
            .map_err(|e| ChatError::Storage(format!("chat log task failed: {e}")))??;

        let kept = self.sessions.finish_turn(session_id, &turn, exchange.clone()).await;
        info!(reply_len = exchange.assistant.len(), kept, "chat turn completed");

        Ok(ChatReply {
            session_id,
            exchange,
        })
    }
}

const TERMINAL_HELP: &str = "Commands: /clear  /export [path]  /help  /quit";

/// Interactive chat on stdin/stdout using the same session logic as the web UI.
pub async fn run_terminal_chat(service: Arc<ChatService>) -> anyhow::Result<()> {
    let session_id = service.sessions().create().await;
    if !service.session_configured(session_id).await {
        anyhow::bail!(ChatError::NotConfigured);
    }

    println!("AI Chatbot ({}). {}", service.settings().provider, TERMINAL_HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.split_once(' ').map_or((input, ""), |(c, rest)| (c, rest.trim())) {
            ("/quit" | "/exit", _) => break,
            ("/help", _) => println!("{TERMINAL_HELP}"),
            ("/clear", _) => {
                service.sessions().clear(session_id).await?;
                println!("Chat cleared.");
            }
            ("/export", path) => {
                let text = service.sessions().export_text(session_id).await?;
                if text.is_empty() {
                    println!("Nothing to export yet.");
                    continue;
                }
                let path = if path.is_empty() {
                    PathBuf::from(conversation::export_file_name(Local::now()))
                } else {
                    PathBuf::from(path)
                };
                tokio::fs::write(&path, text).await?;
                println!("Chat exported to {}", path.display());
            }
            _ => match service.send(Some(session_id), input, Overrides::default()).await {
                Ok(reply) => println!(
                    "AI Assistant ({}): {}",
                    reply.exchange.time_label(),
                    reply.exchange.assistant
                ),
                Err(e) => println!("Error: {e}"),
            },
        }
    }
    println!("Goodbye!");
    Ok(())
}
