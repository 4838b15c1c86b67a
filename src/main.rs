use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use gemini_chat::constants::DEFAULT_PORT;
use gemini_chat::{chat, web_server, ChatService, HistoryStore, Settings};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the chat web server.
    Serve {
        #[arg(long, default_value_t = DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "127.0.0.1", help = "Address to bind.")]
        host: IpAddr,
    },
    /// Chat in the terminal.
    Chat,
    /// Inspect the persisted chat log.
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
enum HistoryCommands {
    /// List sessions in the chat log, most recent first.
    List,
    /// Export a session's transcript.
    Export {
        session: Uuid,
        #[arg(long, short, help = "Write to this file instead of stdout.")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for API keys and project ids)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,gemini_chat=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("gemini-chat starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Serve { port, host } => {
            let service = Arc::new(
                ChatService::from_settings(cli.settings).context("Failed to initialize chat service")?,
            );

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {:?}", e);
                    std::future::pending::<()>().await;
                }
                info!("Ctrl-C received, initiating graceful shutdown...");
            };
            web_server::start_web_server(host, port, service, shutdown)
                .await
                .context("Web server failed")?;
            info!("Shutdown complete.");
        }
        Commands::Chat => {
            let service = Arc::new(
                ChatService::from_settings(cli.settings).context("Failed to initialize chat service")?,
            );
            chat::run_terminal_chat(service).await.context("Chat session failed")?;
        }
        Commands::History { command } => {
            let db_path = &cli.settings.db_path;
            if !db_path.is_file() {
                if let HistoryCommands::List = command {
                    println!("No chat log at {}.", db_path.display());
                    return Ok(());
                }
                anyhow::bail!("no chat log at {}", db_path.display());
            }
            let store = HistoryStore::open_existing(db_path)
                .with_context(|| format!("Failed to open chat log {}", db_path.display()))?;
            match command {
                HistoryCommands::List => {
                    let sessions = store.sessions()?;
                    if sessions.is_empty() {
                        println!("No chat history yet.");
                    }
                    for s in sessions {
                        println!(
                            "{}  {:>4} messages  last active {}",
                            s.session_id,
                            s.message_count,
                            s.last_activity.format("%Y-%m-%d %H:%M:%S UTC")
                        );
                    }
                }
                HistoryCommands::Export { session, output } => {
                    let text = store.export_text(session)?;
                    if text.is_empty() {
                        anyhow::bail!("no messages logged for session {session}");
                    }
                    match output {
                        Some(path) => {
                            std::fs::write(&path, text)
                                .with_context(|| format!("Failed to write {}", path.display()))?;
                            println!("Exported session {} to {}", session, path.display());
                        }
                        None => println!("{text}"),
                    }
                }
            }
        }
    }

    Ok(())
}
