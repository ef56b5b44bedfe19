//! Turns an accepted command observation into a durable, indexed,
//! rank-annotated [`HistoryRecord`]. Grounded in
//! `other_examples/.../cmdai-src-history-manager.rs::store_entry` for the
//! shape of a pooled insert, and in `derive-sqlite/src/dbutil.rs` for the
//! "prepare once, bind per call" discipline (here realized with
//! `prepare_cached`, rusqlite's built-in per-connection statement cache).

use std::path::Path;
use std::thread;
use std::time::Duration;

use rusqlite::{params, Transaction};

use crate::error::{ImportError, WriterError};
use crate::model::{CommandObservation, HistoryRecord, ImportReport, RawImportEntry};
use crate::{ranking, store::Store};

const RETRY_BASE: Duration = Duration::from_millis(10);
const RETRY_MAX_ATTEMPTS: u32 = 4;

pub struct Writer<'s> {
    store: &'s Store,
}

impl<'s> Writer<'s> {
    pub fn new(store: &'s Store) -> Self {
        Writer { store }
    }

    /// Validate, then atomically insert the history row, upsert its
    /// command_stat, and update the new row's rank. Retries transient
    /// `SQLITE_BUSY` errors with exponential back-off before surfacing
    /// [`WriterError::Contention`].
    pub fn write_one(&self, obs: CommandObservation) -> Result<HistoryRecord, WriterError> {
        validate(&obs)?;
        let session_id = obs.session_id.clone().unwrap_or_else(crate::generate_session_id);
        let hostname = obs.hostname.clone().unwrap_or_else(crate::default_hostname);

        with_retry(|| {
            let mut conn = self.store.write_handle();
            let tx = conn.transaction()?;
            let now = crate::now();
            let record = insert_one(&tx, &obs, &session_id, &hostname, now)?;
            tx.commit()?;
            Ok(record)
        })
    }

    /// Insert an ordered list of observations inside one transaction. A
    /// single session tag and host tag apply to the whole batch; entries
    /// that fail validation are silently dropped rather than aborting the
    /// batch. On commit the whole batch becomes visible at once; on
    /// rollback, none of it does.
    pub fn write_batch(
        &self,
        observations: Vec<CommandObservation>,
        session_id: Option<String>,
        hostname: Option<String>,
    ) -> Result<usize, WriterError> {
        let session_id = session_id.unwrap_or_else(crate::generate_session_id);
        let hostname = hostname.unwrap_or_else(crate::default_hostname);

        with_retry(|| {
            let mut conn = self.store.write_handle();
            let tx = conn.transaction()?;
            let now = crate::now();
            let mut inserted = 0usize;
            for obs in &observations {
                if validate(obs).is_err() {
                    continue;
                }
                insert_one(&tx, obs, &session_id, &hostname, now)?;
                inserted += 1;
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    /// Like [`Writer::write_batch`], but each observation carries its own
    /// event time. Used by the shell-history text importer, whose lines
    /// are assigned synthetic descending timestamps before insertion.
    fn write_batch_at_times(
        &self,
        entries: Vec<(CommandObservation, i64)>,
        session_id: &str,
        hostname: &str,
    ) -> Result<usize, WriterError> {
        with_retry(|| {
            let mut conn = self.store.write_handle();
            let tx = conn.transaction()?;
            let mut inserted = 0usize;
            for (obs, event_time) in &entries {
                if validate(obs).is_err() {
                    continue;
                }
                insert_one(&tx, obs, session_id, hostname, *event_time)?;
                inserted += 1;
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    /// Read a JSON array of `{cmd, cwd, exit_code, duration_ms}` objects and
    /// feed them through the batch write path. Unknown fields are ignored;
    /// missing optional fields default; entries that aren't a well-formed
    /// object for this shape are silently skipped rather than failing the
    /// whole file.
    pub fn import_json(&self, path: &Path) -> Result<ImportReport, ImportError> {
        let content = std::fs::read_to_string(path).map_err(|detail| ImportError::Io {
            path: path.to_path_buf(),
            detail,
        })?;
        let raw_entries: Vec<serde_json::Value> =
            serde_json::from_str(&content).map_err(|detail| ImportError::Malformed {
                path: path.to_path_buf(),
                detail,
            })?;

        let total = raw_entries.len();
        let observations: Vec<CommandObservation> = raw_entries
            .into_iter()
            .filter_map(|value| serde_json::from_value::<RawImportEntry>(value).ok())
            .map(CommandObservation::from)
            .collect();

        let imported = self.write_batch(observations, None, None)?;
        Ok(ImportReport {
            total,
            imported,
            skipped: total - imported,
        })
    }

    /// Import a plain-text shell history file, one command per line.
    /// Assigns synthetic descending event times spaced one minute apart
    /// from "now" (the last non-blank line is newest); skips blank and
    /// whitespace-only lines; deduplicates against existing rows by
    /// `(cmd, cwd, event_time)`.
    pub fn import_history_text(
        &self,
        path: &Path,
        default_cwd: &str,
    ) -> Result<ImportReport, ImportError> {
        let content = std::fs::read_to_string(path).map_err(|detail| ImportError::Io {
            path: path.to_path_buf(),
            detail,
        })?;
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let total = lines.len();
        let now = crate::now();

        let conn = self
            .store
            .read_handle()
            .map_err(|err| ImportError::Writer(WriterError::Pool(err)))?;

        let mut to_insert = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            let event_time = now - ((total - 1 - i) as i64) * 60;
            let already_present: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM history WHERE cmd = ?1 AND cwd = ?2 AND event_time = ?3",
                    params![line, default_cwd, event_time],
                    |row| row.get(0),
                )
                .map_err(WriterError::Sqlite)?;
            if already_present > 0 {
                continue;
            }
            to_insert.push((CommandObservation::new(line.to_string(), default_cwd.to_string()), event_time));
        }
        drop(conn);

        let session_id = crate::generate_session_id();
        let hostname = crate::default_hostname();
        let wanted = to_insert.len();
        let imported = self.write_batch_at_times(to_insert, &session_id, &hostname)?;
        debug_assert_eq!(imported, wanted, "every deduplicated line passed validation");

        Ok(ImportReport {
            total,
            imported,
            skipped: total - imported,
        })
    }
}

fn validate(obs: &CommandObservation) -> Result<(), WriterError> {
    if obs.cmd.is_empty() {
        return Err(WriterError::EmptyCommand);
    }
    if obs.cwd.is_empty() {
        return Err(WriterError::EmptyPath);
    }
    Ok(())
}

/// Insert one row plus its stat-upsert and rank-update, all within the
/// caller's transaction. `event_time` is the row's recorded timestamp;
/// rank is always computed against the real wall-clock "now", which for a
/// live write coincides with `event_time` but for a backdated import does
/// not.
fn insert_one(
    tx: &Transaction,
    obs: &CommandObservation,
    session_id: &str,
    hostname: &str,
    event_time: i64,
) -> rusqlite::Result<HistoryRecord> {
    let now = crate::now();
    let cmd_hash = ranking::hash_command(&obs.cmd);
    let cmd_norm = obs.cmd.to_lowercase();

    tx.prepare_cached(
        "INSERT INTO history
            (cmd, cmd_norm, cwd, exit_code, duration_ms, session_id, hostname, event_time, cmd_hash, rank)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
    )?
    .execute(params![
        obs.cmd,
        cmd_norm,
        obs.cwd,
        obs.exit_code,
        obs.duration_ms,
        session_id,
        hostname,
        event_time,
        cmd_hash,
    ])?;
    let id = tx.last_insert_rowid();

    tx.prepare_cached(
        "INSERT INTO command_stat (cmd_hash, cmd, frequency, last_used_at)
         VALUES (?1, ?2, 1, ?3)
         ON CONFLICT(cmd_hash) DO UPDATE SET
            frequency = frequency + 1,
            last_used_at = MAX(last_used_at, excluded.last_used_at)",
    )?
    .execute(params![cmd_hash, obs.cmd, event_time])?;

    let (frequency, last_used_at): (i64, i64) = tx.query_row(
        "SELECT frequency, last_used_at FROM command_stat WHERE cmd_hash = ?1",
        params![cmd_hash],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let rank = ranking::rank(frequency, last_used_at, now);

    tx.prepare_cached("UPDATE history SET rank = ?1 WHERE id = ?2")?
        .execute(params![rank, id])?;

    Ok(HistoryRecord {
        id,
        cmd: obs.cmd.clone(),
        cwd: obs.cwd.clone(),
        exit_code: obs.exit_code,
        duration_ms: obs.duration_ms,
        session_id: session_id.to_string(),
        hostname: hostname.to_string(),
        event_time,
        cmd_hash,
        rank,
    })
}

fn with_retry<T>(mut op: impl FnMut() -> rusqlite::Result<T>) -> Result<T, WriterError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if is_busy(&err) && attempt + 1 < RETRY_MAX_ATTEMPTS => {
                let backoff = RETRY_BASE * 2u32.pow(attempt);
                tracing::debug!(attempt, ?backoff, "write contended, retrying");
                thread::sleep(backoff);
                attempt += 1;
            }
            Err(err) if is_busy(&err) => return Err(WriterError::Contention),
            Err(err) => return Err(WriterError::Sqlite(err)),
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::DatabaseBusy
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("history.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn rejects_empty_command() {
        let (_dir, store) = open_store();
        let writer = Writer::new(&store);
        let err = writer
            .write_one(CommandObservation::new("", "/tmp"))
            .unwrap_err();
        assert!(matches!(err, WriterError::EmptyCommand));
    }

    #[test]
    fn rejects_empty_directory() {
        let (_dir, store) = open_store();
        let writer = Writer::new(&store);
        let err = writer
            .write_one(CommandObservation::new("ls", ""))
            .unwrap_err();
        assert!(matches!(err, WriterError::EmptyPath));
    }

    #[test]
    fn fresh_ingestion_creates_record_and_stat() {
        let (_dir, store) = open_store();
        let writer = Writer::new(&store);

        let mut obs = CommandObservation::new("git status", "/p");
        obs.duration_ms = 125;
        let record = writer.write_one(obs).unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.cwd, "/p");
        assert_eq!(record.duration_ms, 125);

        let conn = store.read_handle().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);

        let (freq, _last_used): (i64, i64) = conn
            .query_row(
                "SELECT frequency, last_used_at FROM command_stat WHERE cmd_hash = ?1",
                [ranking::hash_command("git status")],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(freq, 1);
    }

    #[test]
    fn repeated_command_increments_frequency_never_decreases() {
        let (_dir, store) = open_store();
        let writer = Writer::new(&store);
        for _ in 0..3 {
            writer.write_one(CommandObservation::new("ls", "/p")).unwrap();
        }
        let conn = store.read_handle().unwrap();
        let freq: i64 = conn
            .query_row(
                "SELECT frequency FROM command_stat WHERE cmd_hash = ?1",
                [ranking::hash_command("ls")],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(freq, 3);
    }

    #[test]
    fn ids_are_strictly_increasing_in_insertion_order() {
        let (_dir, store) = open_store();
        let writer = Writer::new(&store);
        let a = writer.write_one(CommandObservation::new("a", "/p")).unwrap();
        let b = writer.write_one(CommandObservation::new("b", "/p")).unwrap();
        let c = writer.write_one(CommandObservation::new("c", "/p")).unwrap();
        assert!(a.id < b.id && b.id < c.id);
    }

    #[test]
    fn batch_write_is_all_or_nothing_visible() {
        let (_dir, store) = open_store();
        let writer = Writer::new(&store);
        let batch = vec![
            CommandObservation::new("one", "/p"),
            CommandObservation::new("two", "/p"),
            CommandObservation::new("three", "/p"),
        ];
        let inserted = writer.write_batch(batch, None, None).unwrap();
        assert_eq!(inserted, 3);

        let conn = store.read_handle().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn batch_write_silently_drops_invalid_entries() {
        let (_dir, store) = open_store();
        let writer = Writer::new(&store);
        let batch = vec![
            CommandObservation::new("good", "/p"),
            CommandObservation::new("", "/p"),
            CommandObservation::new("also good", "/p"),
        ];
        let inserted = writer.write_batch(batch, None, None).unwrap();
        assert_eq!(inserted, 2);
    }

    #[test]
    fn batch_write_matches_sequential_single_writes() {
        let cmds = vec!["alpha", "beta", "alpha", "gamma"];

        let (_dir_a, store_a) = open_store();
        let writer_a = Writer::new(&store_a);
        writer_a
            .write_batch(
                cmds.iter().map(|c| CommandObservation::new(*c, "/p")).collect(),
                Some("sess".to_string()),
                Some("host".to_string()),
            )
            .unwrap();

        let (_dir_b, store_b) = open_store();
        let writer_b = Writer::new(&store_b);
        for c in &cmds {
            writer_b
                .write_one(CommandObservation {
                    cmd: c.to_string(),
                    cwd: "/p".to_string(),
                    exit_code: 0,
                    duration_ms: 0,
                    session_id: Some("sess".to_string()),
                    hostname: Some("host".to_string()),
                })
                .unwrap();
        }

        let conn_a = store_a.read_handle().unwrap();
        let conn_b = store_b.read_handle().unwrap();
        let freq_a: i64 = conn_a
            .query_row(
                "SELECT frequency FROM command_stat WHERE cmd_hash = ?1",
                [ranking::hash_command("alpha")],
                |r| r.get(0),
            )
            .unwrap();
        let freq_b: i64 = conn_b
            .query_row(
                "SELECT frequency FROM command_stat WHERE cmd_hash = ?1",
                [ranking::hash_command("alpha")],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(freq_a, freq_b);
    }

    #[test]
    fn sql_injection_like_text_is_stored_as_a_literal_row() {
        let (_dir, store) = open_store();
        let writer = Writer::new(&store);
        let evil = "'; DROP TABLE history; --";
        writer.write_one(CommandObservation::new(evil, "/p")).unwrap();

        let conn = store.read_handle().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
        let stored: String = conn.query_row("SELECT cmd FROM history", [], |r| r.get(0)).unwrap();
        assert_eq!(stored, evil);
    }

    #[test]
    fn long_command_round_trips_intact() {
        let (_dir, store) = open_store();
        let writer = Writer::new(&store);
        let long = "x".repeat(1500);
        writer.write_one(CommandObservation::new(long.clone(), "/p")).unwrap();

        let conn = store.read_handle().unwrap();
        let stored: String = conn.query_row("SELECT cmd FROM history", [], |r| r.get(0)).unwrap();
        assert_eq!(stored.len(), 1500);
        assert_eq!(stored, long);
    }

    #[test]
    fn import_json_skips_malformed_entries_not_the_whole_file() {
        let (_dir, store) = open_store();
        let writer = Writer::new(&store);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"[
                {"cmd": "ls", "cwd": "/p"},
                {"not_cmd": "missing required field"},
                {"cmd": "pwd", "cwd": "/p", "exit_code": 1, "unknown_field": 42}
            ]"#,
        )
        .unwrap();

        let report = writer.import_json(&path).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn import_history_text_dedups_and_assigns_descending_times() {
        let (_dir, store) = open_store();
        let writer = Writer::new(&store);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shell_history");
        std::fs::write(&path, "A\n\nB\n   \nA\n").unwrap();

        let report = writer.import_history_text(&path, "/p").unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.imported, 3);

        let conn = store.read_handle().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 3);

        let mut stmt = conn
            .prepare("SELECT event_time FROM history ORDER BY event_time ASC")
            .unwrap();
        let times: Vec<i64> = stmt
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(times[2] - times[1], 60);
        assert_eq!(times[1] - times[0], 60);
    }
}
