//! DDL and pragmas applied when a database is first created.
//!
//! Mirrors the teacher's bootstrap-script approach
//! (`derive-sqlite/src/dbutil.rs`'s `BOOTSTRAP` constant executed inside one
//! `execute_batch`), adapted to the history/command_stat schema.

/// Run once, inside a transaction, against a brand new database file.
pub const BOOTSTRAP: &str = r#"
    -- Write-ahead logging so readers never block on an in-progress writer,
    -- and the writer never blocks readers beyond the duration of commit.
    PRAGMA journal_mode=WAL;
    -- Fsync at checkpoint time rather than on every commit.
    PRAGMA synchronous=NORMAL;
    -- Reader wait on a transient write lock before surfacing SQLITE_BUSY.
    PRAGMA busy_timeout=1000;

    CREATE TABLE IF NOT EXISTS history (
        id          INTEGER PRIMARY KEY,
        cmd         TEXT NOT NULL,
        cmd_norm    TEXT NOT NULL,
        cwd         TEXT NOT NULL,
        exit_code   INTEGER NOT NULL DEFAULT 0,
        duration_ms INTEGER NOT NULL DEFAULT 0,
        session_id  TEXT NOT NULL,
        hostname    TEXT NOT NULL,
        event_time  INTEGER NOT NULL,
        cmd_hash    TEXT,
        rank        REAL NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS command_stat (
        cmd_hash     TEXT PRIMARY KEY,
        cmd          TEXT NOT NULL,
        frequency    INTEGER NOT NULL DEFAULT 1,
        last_used_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_history_cmd_norm ON history(cmd_norm);
    CREATE INDEX IF NOT EXISTS idx_history_hash ON history(cmd_hash);
    CREATE INDEX IF NOT EXISTS idx_history_rank_event ON history(rank DESC, event_time DESC);
    CREATE INDEX IF NOT EXISTS idx_history_event_time ON history(event_time DESC);
    CREATE INDEX IF NOT EXISTS idx_history_cwd ON history(cwd);
    "#;

/// Applied on every `open()` regardless of whether the file is new, since
/// pragmas are per-connection, not persisted schema state.
pub const PER_CONNECTION_PRAGMAS: &str = r#"
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
    PRAGMA busy_timeout=1000;
    "#;
