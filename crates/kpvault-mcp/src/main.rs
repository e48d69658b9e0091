// kpvault MCP server entry point.
//
// Reads configuration from the environment (KEEPASS_* variables, with a
// .env file honored when present), applies CLI overrides, and serves the
// vault tools over stdio. All logging goes to stderr so stdout stays
// clean for the MCP protocol.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;

use kpvault_core::{Config, Vault};

mod server;

use server::VaultServer;

#[derive(Parser, Debug)]
#[command(name = "kpvault-mcp", about = "KeePass credential vault over MCP", version)]
struct Args {
    /// Path to the .kdbx database (overrides KEEPASS_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Key file combined with the master password (overrides KEEPASS_KEY_FILE)
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Backup directory (overrides KEEPASS_BACKUP_DIR)
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Allow write operations (overrides KEEPASS_ACCESS_MODE)
    #[arg(long)]
    read_write: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol; everything else goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kpvault=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenvy::dotenv();
    let args = Args::parse();

    if let Some(db) = &args.db {
        std::env::set_var("KEEPASS_DB_PATH", db);
    }
    if let Some(key_file) = &args.key_file {
        std::env::set_var("KEEPASS_KEY_FILE", key_file);
    }
    if let Some(backup_dir) = &args.backup_dir {
        std::env::set_var("KEEPASS_BACKUP_DIR", backup_dir);
    }
    if args.read_write {
        std::env::set_var("KEEPASS_ACCESS_MODE", "readwrite");
    }

    let config = Config::from_env().context("invalid configuration")?;
    tracing::info!(
        db = %config.db_path.display(),
        mode = ?config.access_mode,
        "starting kpvault MCP server (stdio transport)"
    );

    let vault = Arc::new(Vault::new(config));
    let service = VaultServer::new(vault)
        .serve(rmcp::transport::stdio())
        .await
        .context("failed to start MCP server")?;

    service.waiting().await.context("MCP server error")?;
    Ok(())
}
