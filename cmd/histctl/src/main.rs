mod clipboard;
mod commands;
mod logging;
mod tui;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use history_core::Store;

/// Command-line front door for the persistent shell command history store.
#[derive(Debug, Parser)]
#[command(name = "histctl", author, version, about)]
struct Cli {
    #[command(flatten)]
    logging: logging::LogArgs,

    /// Path to the history database. Defaults to `~/.zigstory/history.db`.
    #[arg(long, env = "HISTCTL_DB", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record one executed command.
    Capture(commands::CaptureArgs),
    /// Bulk-load history from a file.
    Import {
        #[command(subcommand)]
        kind: commands::ImportKind,
    },
    /// Print prefix-matched command suggestions.
    Suggest(commands::SuggestArgs),
    /// Launch the interactive history browser.
    Browse(commands::BrowseArgs),
    /// Print a usage report.
    Stats,
    /// Force the schema migrator (and optionally a full rank recalculation).
    Migrate(commands::MigrateArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.logging);
    tracing::debug!(?cli.command, "parsed arguments");

    let db_path = cli.db.unwrap_or_else(history_core::default_db_path);
    let store = Store::open(&db_path)
        .with_context(|| format!("opening database at {}", db_path.display()))?;

    let result = match cli.command {
        Command::Capture(args) => commands::capture(&store, args),
        Command::Import { kind } => commands::import(&store, kind),
        Command::Suggest(args) => commands::suggest(&store, args),
        Command::Browse(args) => commands::browse(&store, args),
        Command::Stats => commands::stats(&store),
        Command::Migrate(args) => commands::migrate(&store, args),
    };

    if let Err(err) = &result {
        tracing::error!(error = ?err, "command failed");
    }
    result
}
