//! CLI argument parsing for the tkn binary.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// tkn token discovery
///
/// Segments text into recurring patterns and indexes them in a lattice.
#[derive(Parser, Debug)]
#[command(name = "tkn")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/tkn/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream files through a sequencer into the lattice
    Ingest {
        /// Input files, separated by `<N>` sentinels in the stream
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Number of top tokens to print afterwards
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Store the lattice at this path (selects the durable backend)
        #[arg(long)]
        db_path: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Highest-scoring tokens in a stored lattice
    Top {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,

        #[arg(long)]
        db_path: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Patterns observed directly after TOKEN
    Next {
        token: String,

        #[arg(long)]
        db_path: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Characters that extend PREFIX in the trie
    Complete {
        prefix: String,

        #[arg(long)]
        db_path: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Administrative commands
    Admin {
        /// Database path (default from config)
        #[arg(long)]
        db_path: Option<String>,

        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Admin subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AdminCommands {
    /// Show database statistics
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Trigger RocksDB compaction
    Compact {
        /// Compact only specific column family
        #[arg(long)]
        cf: Option<String>,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

impl Commands {
    /// The `--db-path` override, if the command takes one.
    pub fn db_path(&self) -> Option<&str> {
        match self {
            Commands::Ingest { db_path, .. }
            | Commands::Top { db_path, .. }
            | Commands::Next { db_path, .. }
            | Commands::Complete { db_path, .. }
            | Commands::Admin { db_path, .. } => db_path.as_deref(),
            Commands::Config => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_ingest_files() {
        let cli = Cli::parse_from(["tkn", "ingest", "a.txt", "b.txt", "--top", "5"]);
        match cli.command {
            Commands::Ingest {
                files, top, json, ..
            } => {
                assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
                assert_eq!(top, 5);
                assert!(!json);
            }
            _ => panic!("Expected Ingest command"),
        }
    }

    #[test]
    fn test_cli_ingest_requires_files() {
        assert!(Cli::try_parse_from(["tkn", "ingest"]).is_err());
    }

    #[test]
    fn test_cli_ingest_with_db_path() {
        let cli = Cli::parse_from(["tkn", "ingest", "a.txt", "--db-path", "/custom/db", "--json"]);
        match cli.command {
            Commands::Ingest { db_path, json, .. } => {
                assert_eq!(db_path, Some("/custom/db".to_string()));
                assert!(json);
            }
            _ => panic!("Expected Ingest command"),
        }
    }

    #[test]
    fn test_cli_top_default_limit() {
        let cli = Cli::parse_from(["tkn", "top"]);
        match cli.command {
            Commands::Top { limit, .. } => assert_eq!(limit, 10),
            _ => panic!("Expected Top command"),
        }
    }

    #[test]
    fn test_cli_next_and_complete() {
        let cli = Cli::parse_from(["tkn", "next", "the"]);
        assert!(matches!(cli.command, Commands::Next { ref token, .. } if token == "the"));

        let cli = Cli::parse_from(["tkn", "complete", "th"]);
        assert!(matches!(cli.command, Commands::Complete { ref prefix, .. } if prefix == "th"));
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["tkn", "--config", "/path/to/config.toml", "config"]);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_cli_with_log_level() {
        let cli = Cli::parse_from(["tkn", "top", "--log-level", "debug"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_admin_compact_cf() {
        let cli = Cli::parse_from(["tkn", "admin", "compact", "--cf", "graph_edges"]);
        match cli.command {
            Commands::Admin { command, .. } => match command {
                AdminCommands::Compact { cf } => assert_eq!(cf, Some("graph_edges".to_string())),
                _ => panic!("Expected Compact command"),
            },
            _ => panic!("Expected Admin command"),
        }
    }
}
