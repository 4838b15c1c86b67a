//! A web chatbot that forwards conversations to Google Gemini (or a
//! Dialogflow agent), keeps per-user sessions in memory and appends every
//! exchange to a local SQLite log.

pub mod chat;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod error;
pub mod history;
pub mod llm;
pub mod rate_limit;
pub mod session;
pub mod web_server;

pub use chat::{ChatReply, ChatService, Overrides};
pub use config::{GenerationParams, ProviderKind, Settings};
pub use conversation::{Conversation, Exchange};
pub use error::ChatError;
pub use history::HistoryStore;
