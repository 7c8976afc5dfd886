//! tkn binary library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (ingest, queries, admin)

pub mod cli;
pub mod commands;

pub use cli::{AdminCommands, Cli, Commands};
pub use commands::{
    completions, handle_admin, handle_complete, handle_ingest, handle_next, handle_top, ingest,
    init_logging, load_settings, next_transitions, show_config, top_tokens, IngestReport,
};
