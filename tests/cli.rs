use assert_cmd::Command;
use gemini_chat::{Exchange, HistoryStore};
use predicates::prelude::*;
use uuid::Uuid;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("gemini-chat").unwrap();
    // Keep the host environment (and any .env) from leaking into assertions.
    cmd.env_remove("GEMINI_API_KEY").env_remove("CHATBOT_PROVIDER").env_remove("CHATBOT_DB");
    cmd
}

#[test]
fn test_cli_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: gemini-chat"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("--provider"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_cli_serve_help() {
    cmd()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: gemini-chat serve"))
        .stdout(predicate::str::contains("--port <PORT>"))
        .stdout(predicate::str::contains("--host <HOST>"));
}

#[test]
fn test_cli_no_command() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: gemini-chat"));
}

#[test]
fn test_cli_rejects_unknown_provider() {
    cmd()
        .args(["--provider", "openai", "history", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value 'openai'"));
}

#[test]
fn test_history_list_empty() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("log.db");
    cmd()
        .arg("--db-path")
        .arg(&db)
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No chat log at"));
    assert!(!db.exists());
}

#[test]
fn test_history_export_missing_log_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested").join("log.db");
    cmd()
        .arg("--db-path")
        .arg(&db)
        .args(["history", "export", &Uuid::new_v4().to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no chat log at"));
    assert!(!dir.path().join("nested").exists());
}

#[test]
fn test_history_list_and_export() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("log.db");
    let session = Uuid::new_v4();
    {
        let store = HistoryStore::open(&db).unwrap();
        store.append_exchange(session, &Exchange::new("Hi", "Hello!")).unwrap();
    }

    cmd()
        .arg("--db-path")
        .arg(&db)
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(session.to_string()))
        .stdout(predicate::str::contains("2 messages"));

    let out = dir.path().join("export.txt");
    cmd()
        .arg("--db-path")
        .arg(&db)
        .args(["history", "export", &session.to_string(), "--output"])
        .arg(&out)
        .assert()
        .success();
    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "User: Hi\nAssistant: Hello!\n---"
    );
}

#[test]
fn test_history_export_unknown_session_fails() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("log.db");
    HistoryStore::open(&db).unwrap();
    cmd()
        .arg("--db-path")
        .arg(&db)
        .args(["history", "export", &Uuid::new_v4().to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no messages logged"));
}

#[test]
fn test_chat_without_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .arg("--db-path")
        .arg(dir.path().join("log.db"))
        .arg("chat")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no API key configured"));
}

#[test]
fn test_chat_with_echo_provider() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .args(["--provider", "echo", "--min-interval-ms", "0", "--db-path"])
        .arg(dir.path().join("log.db"))
        .arg("chat")
        .write_stdin("hello there\n/quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("AI Assistant"))
        .stdout(predicate::str::contains("[echo] hello there"))
        .stdout(predicate::str::contains("Goodbye!"));
}
