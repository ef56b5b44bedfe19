use serde::Deserialize;

/// One executed command, as persisted in the `history` table.
///
/// `id` is dense and monotonically increasing in insertion order (it is the
/// SQLite rowid). `event_time` and `cmd_hash` are immutable once written;
/// `rank` is the only column the core ever mutates after insert.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub cmd: String,
    pub cwd: String,
    pub exit_code: i64,
    pub duration_ms: i64,
    pub session_id: String,
    pub hostname: String,
    pub event_time: i64,
    pub cmd_hash: String,
    pub rank: f64,
}

/// Aggregate usage stats for a distinct command, keyed by its hash.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandStat {
    pub cmd_hash: String,
    pub cmd: String,
    pub frequency: i64,
    pub last_used_at: i64,
}

/// A single observed command, as handed to the Writer by the shell hook.
///
/// `session_id` and `hostname` are filled in by the writer from the current
/// process environment when left `None`.
#[derive(Debug, Clone, Default)]
pub struct CommandObservation {
    pub cmd: String,
    pub cwd: String,
    pub exit_code: i64,
    pub duration_ms: i64,
    pub session_id: Option<String>,
    pub hostname: Option<String>,
}

impl CommandObservation {
    pub fn new(cmd: impl Into<String>, cwd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            cwd: cwd.into(),
            ..Default::default()
        }
    }
}

/// Shape of one entry in a JSON batch import file. Unknown fields are
/// ignored by `serde_json` by default; missing optional fields default via
/// `#[serde(default)]`, matching the "silently drop malformed entries, not
/// the whole file" contract enforced by the caller of [`super::writer`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawImportEntry {
    pub cmd: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub exit_code: i64,
    #[serde(default)]
    pub duration_ms: i64,
}

impl From<RawImportEntry> for CommandObservation {
    fn from(raw: RawImportEntry) -> Self {
        CommandObservation {
            cmd: raw.cmd,
            cwd: raw.cwd,
            exit_code: raw.exit_code,
            duration_ms: raw.duration_ms,
            session_id: None,
            hostname: None,
        }
    }
}

/// Outcome of a shell-history text import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportReport {
    pub total: usize,
    pub imported: usize,
    pub skipped: usize,
}
