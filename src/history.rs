//! Append-only SQLite log of chat messages.
//!
//! Every exchange lands as two rows (`user`, then `assistant`) inside one
//! transaction. Rows are never updated or deleted; clearing a conversation in
//! the UI only resets the in-memory session.
//!
//! The connection is synchronous; async callers go through
//! `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::conversation::{self, Exchange};
use crate::error::{ChatError, Result};

/// Stored in `PRAGMA user_version`; bump when the DDL changes.
const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Sender::User),
            "assistant" => Some(Sender::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub message_count: i64,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ChatError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| ChatError::Storage(format!("open {}: {e}", path.display())))?;
        Self::configure(conn, path)
    }

    /// Open a log that must already exist; never creates files or directories.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ChatError::Storage(format!("no chat log at {}", path.display())));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| ChatError::Storage(format!("open {}: {e}", path.display())))?;
        Self::configure(conn, path)
    }

    fn configure(conn: Connection, path: &Path) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        info!(path = %path.display(), "chat log opened");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < SCHEMA_VERSION {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL,
                    sender TEXT NOT NULL CHECK (sender IN ('user', 'assistant')),
                    text TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, id);
                PRAGMA user_version = 1;
                ",
            )?;
            debug!("chat log schema initialized");
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ChatError::Storage("chat log connection poisoned".into()))
    }

    /// Persist one exchange. Both rows are written or neither is.
    pub fn append_exchange(&self, session_id: Uuid, exchange: &Exchange) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let at = exchange.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        let session = session_id.to_string();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO messages (session_id, sender, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            )?;
            stmt.execute(params![session, Sender::User.as_str(), exchange.user, at])?;
            stmt.execute(params![session, Sender::Assistant.as_str(), exchange.assistant, at])?;
        }
        tx.commit()?;
        debug!(session = %session_id, "exchange appended to chat log");
        Ok(())
    }

    pub fn messages(&self, session_id: Uuid) -> Result<Vec<StoredMessage>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, session_id, sender, text, created_at FROM messages
             WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![session_id.to_string()], |row| {
            Ok(StoredMessage {
                id: row.get(0)?,
                session_id: parse_uuid(row.get::<_, String>(1)?, 1)?,
                sender: {
                    let s: String = row.get(2)?;
                    Sender::parse(&s).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            Type::Text,
                            format!("unknown sender {s:?}").into(),
                        )
                    })?
                },
                text: row.get(3)?,
                created_at: parse_time(row.get::<_, String>(4)?, 4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Sessions with at least one message, most recently active first.
    pub fn sessions(&self) -> Result<Vec<SessionSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT session_id, COUNT(*), MAX(created_at), MAX(id) AS last_id FROM messages
             GROUP BY session_id ORDER BY last_id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionSummary {
                session_id: parse_uuid(row.get::<_, String>(0)?, 0)?,
                message_count: row.get(1)?,
                last_activity: parse_time(row.get::<_, String>(2)?, 2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Rebuild the exchanges of a session by pairing consecutive user/assistant rows.
    pub fn exchanges(&self, session_id: Uuid) -> Result<Vec<Exchange>> {
        let mut exchanges = Vec::new();
        let mut pending: Option<StoredMessage> = None;
        for msg in self.messages(session_id)? {
            match msg.sender {
                Sender::User => pending = Some(msg),
                Sender::Assistant => {
                    if let Some(user) = pending.take() {
                        exchanges.push(Exchange {
                            user: user.text,
                            assistant: msg.text,
                            timestamp: user.created_at,
                        });
                    }
                }
            }
        }
        Ok(exchanges)
    }

    pub fn export_text(&self, session_id: Uuid) -> Result<String> {
        Ok(conversation::export_text(&self.exchanges(session_id)?))
    }
}

fn parse_uuid(s: String, idx: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_time(s: String, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read_back() {
        let store = HistoryStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        store.append_exchange(id, &Exchange::new("Hi", "Hello!")).unwrap();

        let msgs = store.messages(id).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].sender, Sender::User);
        assert_eq!(msgs[0].text, "Hi");
        assert_eq!(msgs[1].sender, Sender::Assistant);
        assert_eq!(msgs[1].text, "Hello!");
        assert!(msgs[0].id < msgs[1].id);
    }

    #[test]
    fn sessions_are_separate() {
        let store = HistoryStore::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append_exchange(a, &Exchange::new("a1", "r1")).unwrap();
        store.append_exchange(b, &Exchange::new("b1", "r1")).unwrap();
        store.append_exchange(a, &Exchange::new("a2", "r2")).unwrap();

        assert_eq!(store.messages(a).unwrap().len(), 4);
        assert_eq!(store.messages(b).unwrap().len(), 2);

        let sessions = store.sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, a);
        assert_eq!(sessions[0].message_count, 4);
    }

    #[test]
    fn exchanges_pair_rows() {
        let store = HistoryStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        store.append_exchange(id, &Exchange::new("q1", "a1")).unwrap();
        store.append_exchange(id, &Exchange::new("q2", "a2")).unwrap();
        let ex = store.exchanges(id).unwrap();
        assert_eq!(ex.len(), 2);
        assert_eq!(ex[1].user, "q2");
        assert_eq!(ex[1].assistant, "a2");
        assert_eq!(
            store.export_text(id).unwrap(),
            "User: q1\nAssistant: a1\n---\nUser: q2\nAssistant: a2\n---"
        );
    }

    #[test]
    fn unknown_session_is_empty() {
        let store = HistoryStore::open_in_memory().unwrap();
        assert!(store.messages(Uuid::new_v4()).unwrap().is_empty());
        assert!(store.sessions().unwrap().is_empty());
    }
}
