//! StoryLoom server binary.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storyloom::config::Config;
use storyloom::gateway;
use storyloom::store::UserStore;
use tracing_subscriber::EnvFilter;

/// StoryLoom — a one-line idea to short-story generation server
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Seed an empty user store and browser mirror
    InitStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("storyloom=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            gateway::run_gateway(&host, port, config).await
        }
        Command::InitStore => {
            let store = UserStore::new(&config.store.users_path, &config.store.mirror_path);
            store.ensure_initialized()?;
            println!(
                "Store initialized: {} (mirror: {})",
                config.store.users_path, config.store.mirror_path
            );
            Ok(())
        }
    }
}
