use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use history_core::model::CommandObservation;
use history_core::{analytics::Analytics, browser, migrator, predictor, writer::Writer, Store};

#[derive(Debug, Args)]
pub struct CaptureArgs {
    /// The command line as it was executed.
    pub cmd: String,
    /// Working directory the command ran in. Defaults to the current directory.
    #[arg(long)]
    pub cwd: Option<String>,
    #[arg(long, default_value_t = 0)]
    pub exit_code: i64,
    #[arg(long, default_value_t = 0)]
    pub duration_ms: i64,
    #[arg(long)]
    pub session_id: Option<String>,
    #[arg(long)]
    pub hostname: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ImportKind {
    /// Import a JSON array of `{cmd, cwd, exit_code, duration_ms}` objects.
    Json { path: PathBuf },
    /// Import a plain-text shell history file, one command per line.
    History {
        path: PathBuf,
        /// Working directory recorded for every imported line.
        #[arg(long, default_value = ".")]
        cwd: String,
    },
}

#[derive(Debug, Args)]
pub struct SuggestArgs {
    /// The partial command line typed so far.
    pub partial: String,
    #[arg(long, default_value_t = predictor::DEFAULT_LIMIT)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct BrowseArgs {
    /// Restrict results to the current working directory.
    #[arg(long)]
    pub dir: bool,
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Also recompute every row's rank from scratch.
    #[arg(long)]
    pub recalculate_ranks: bool,
}

/// Records one executed command. A failed capture must never block or
/// disrupt the user's prompt, so every failure here is logged and
/// swallowed rather than propagated: the process always exits 0.
pub fn capture(store: &Store, args: CaptureArgs) -> Result<()> {
    let cwd = match args.cwd {
        Some(cwd) => cwd,
        None => match std::env::current_dir() {
            Ok(dir) => dir.to_string_lossy().into_owned(),
            Err(err) => {
                tracing::warn!(error = %err, "resolving current directory failed, dropping capture");
                return Ok(());
            }
        },
    };

    let observation = CommandObservation {
        cmd: args.cmd,
        cwd,
        exit_code: args.exit_code,
        duration_ms: args.duration_ms,
        session_id: args.session_id,
        hostname: args.hostname,
    };

    match Writer::new(store).write_one(observation) {
        Ok(record) => tracing::debug!(id = record.id, rank = record.rank, "captured command"),
        Err(err) => tracing::warn!(error = %err, "recording command failed, dropping capture"),
    }
    Ok(())
}

pub fn import(store: &Store, kind: ImportKind) -> Result<()> {
    let writer = Writer::new(store);
    let report = match kind {
        ImportKind::Json { path } => writer.import_json(&path).context("importing JSON batch")?,
        ImportKind::History { path, cwd } => writer
            .import_history_text(&path, &cwd)
            .context("importing shell history file")?,
    };
    println!(
        "{} total, {} imported, {} skipped",
        report.total, report.imported, report.skipped
    );
    Ok(())
}

pub fn suggest(store: &Store, args: SuggestArgs) -> Result<()> {
    let predictor = predictor::Predictor::with_capacity(store, predictor::DEFAULT_CACHE_CAPACITY, args.limit);
    let cancel = predictor::CancelToken::new();
    for suggestion in predictor.get_suggestions(&args.partial, &cancel) {
        println!("{suggestion}");
    }
    Ok(())
}

pub fn stats(store: &Store) -> Result<()> {
    let report = Analytics::new(store).report(history_core::now()).context("computing analytics")?;
    print!("{}", report.render());
    Ok(())
}

pub fn migrate(store: &Store, args: MigrateArgs) -> Result<()> {
    // Store::open already ran the migrator; this subcommand exists for
    // operators who want to force it (e.g. after restoring an old backup)
    // without otherwise touching the database.
    if args.recalculate_ranks {
        migrator::recalculate_ranks(&store.write_handle(), migrator::BACKFILL_BATCH)
            .context("recalculating ranks")?;
    }
    println!("database at {} is up to date", store.path().display());
    Ok(())
}

pub fn browse(store: &Store, args: BrowseArgs) -> Result<()> {
    use crossterm::tty::IsTty;
    anyhow::ensure!(
        std::io::stdout().is_tty(),
        "browse must be run in an interactive terminal"
    );

    let scope = if args.dir {
        let cwd = std::env::current_dir()
            .context("resolving current directory")?
            .to_string_lossy()
            .into_owned();
        browser::Scope::Directory(cwd)
    } else {
        browser::Scope::Global
    };

    let outcome = crate::tui::run(store, scope)?;
    match outcome {
        Some(cmd) => {
            println!("{cmd}");
            crate::clipboard::copy(&cmd);
            Ok(())
        }
        None => std::process::exit(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("history.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn capture_writes_a_record() {
        let (_dir, store) = temp_store();
        let args = CaptureArgs {
            cmd: "ls -la".to_string(),
            cwd: Some("/tmp".to_string()),
            exit_code: 0,
            duration_ms: 12,
            session_id: None,
            hostname: None,
        };
        capture(&store, args).unwrap();

        let report = Analytics::new(&store).report(history_core::now()).unwrap();
        assert_eq!(report.total_commands, 1);
    }

    #[test]
    fn import_json_reports_counts() {
        let (dir, store) = temp_store();
        let batch_path = dir.path().join("batch.json");
        std::fs::write(
            &batch_path,
            r#"[{"cmd":"echo hi","cwd":"/tmp","exit_code":0,"duration_ms":1}]"#,
        )
        .unwrap();

        import(&store, ImportKind::Json { path: batch_path }).unwrap();

        let report = Analytics::new(&store).report(history_core::now()).unwrap();
        assert_eq!(report.total_commands, 1);
    }

    #[test]
    fn stats_renders_without_error_on_empty_store() {
        let (_dir, store) = temp_store();
        stats(&store).unwrap();
    }

    #[test]
    fn migrate_without_recalculation_is_a_noop() {
        let (_dir, store) = temp_store();
        migrate(&store, MigrateArgs { recalculate_ranks: false }).unwrap();
    }
}
