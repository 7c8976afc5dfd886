//! tkn
//!
//! Online token discovery: segments text into recurring patterns and
//! indexes them in a trie and a weighted transition graph.
//!
//! # Usage
//!
//! ```bash
//! tkn ingest <FILES>... [--top N] [--db-path PATH] [--json]
//! tkn top [--limit N]
//! tkn next <TOKEN>
//! tkn complete <PREFIX>
//! tkn admin stats|compact
//! tkn config
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/tkn/config.toml)
//! 3. Environment variables (TKN_*)
//! 4. CLI flags

use anyhow::Result;

use tkn_cli::{
    handle_admin, handle_complete, handle_ingest, handle_next, handle_top, init_logging,
    load_settings, show_config, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let settings = load_settings(
        cli.config.as_deref(),
        cli.log_level.as_deref(),
        cli.command.db_path(),
    )?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Ingest {
            files, top, json, ..
        } => {
            handle_ingest(&settings, &files, top, json).await?;
        }
        Commands::Top { limit, json, .. } => {
            handle_top(&settings, limit, json)?;
        }
        Commands::Next { token, json, .. } => {
            handle_next(&settings, &token, json)?;
        }
        Commands::Complete { prefix, json, .. } => {
            handle_complete(&settings, &prefix, json)?;
        }
        Commands::Admin { command, .. } => {
            handle_admin(&settings, command)?;
        }
        Commands::Config => {
            show_config(&settings)?;
        }
    }

    Ok(())
}
