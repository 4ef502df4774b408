//! Sessions management commands
//!
//! These work on the persisted session directories directly, so they are
//! meant for a host that is not running.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use sublink_core::{SessionLayout, is_valid_session_id};
use tracing::{info, warn};

use crate::config::ConfigLoader;

/// Sessions management arguments
#[derive(Args, Debug)]
pub struct SessionsArgs {
    #[command(subcommand)]
    pub command: SessionsCommands,
}

/// Sessions subcommands
#[derive(Subcommand, Debug)]
pub enum SessionsCommands {
    /// List persisted sessions
    List,
    /// Delete a persisted session and its credentials
    Purge {
        /// Session ID (phone number) to delete
        session_id: String,
    },
}

/// Run sessions command
pub async fn run(args: SessionsArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let layout = SessionLayout::new(config.root_dir);
    match args.command {
        SessionsCommands::List => list_sessions(&layout).await,
        SessionsCommands::Purge { session_id } => purge_session(&layout, &session_id).await,
    }
}

/// One row of `sessions list`
#[derive(Debug, PartialEq)]
struct PersistedSession {
    id: String,
    has_store: bool,
    started_at: Option<DateTime<Utc>>,
}

async fn collect(layout: &SessionLayout) -> Result<Vec<PersistedSession>> {
    let mut sessions = Vec::new();
    for id in layout.list_session_ids().await? {
        let started_at = match layout.read_metadata(&id).await {
            Ok(metadata) => metadata.and_then(|m| m.started_at()),
            Err(e) => {
                warn!(session_id = %id, error = %e, "Unreadable session metadata");
                None
            }
        };
        sessions.push(PersistedSession {
            has_store: layout.has_store(&id).await,
            started_at,
            id,
        });
    }
    Ok(sessions)
}

/// List persisted sessions
async fn list_sessions(layout: &SessionLayout) -> Result<()> {
    let sessions = collect(layout).await?;
    if sessions.is_empty() {
        println!("No persisted sessions in {}", layout.root().display());
        return Ok(());
    }

    println!("Persisted sessions in {}:", layout.root().display());
    println!();
    for session in sessions {
        let started = session
            .started_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let store = if session.has_store { "" } else { " (no credential store)" };
        println!("  {}{}", session.id, store);
        println!("    Started: {}", started);
    }
    Ok(())
}

/// Delete a persisted session
async fn purge_session(layout: &SessionLayout, session_id: &str) -> Result<()> {
    if !is_valid_session_id(session_id) {
        anyhow::bail!("Invalid session id: {}", session_id);
    }

    info!(session_id = %session_id, "Purging session");
    if layout.remove_session_dir(session_id).await? {
        println!("Deleted session {}", session_id);
    } else {
        println!("No persisted session {}", session_id);
    }
    Ok(())
}
