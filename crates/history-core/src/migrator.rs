//! Idempotent startup routine that brings an existing database up to the
//! current schema without data loss or downtime. Mirrors the probe-then-act
//! shape of `derive-sqlite/src/dbutil.rs::apply_migrations`, but probes
//! column existence directly rather than tracking a migration-index table,
//! so an arbitrarily old database file converges in one pass without
//! needing to replay intermediate versions.

use rusqlite::Connection;

use crate::error::MigrationError;
use crate::ranking;
use crate::schema::BOOTSTRAP;

/// Default batch size for backfilling a derived column.
pub const BACKFILL_BATCH: usize = 1000;

/// Bring `conn`'s schema up to date. Safe to call on every `Store::open`.
pub fn migrate(conn: &Connection) -> Result<(), MigrationError> {
    if !table_exists(conn, "history")? {
        conn.execute_batch("BEGIN;")?;
        conn.execute_batch(BOOTSTRAP)?;
        conn.execute_batch("COMMIT;")?;
        return Ok(());
    }

    // Re-run the bootstrap's `CREATE TABLE IF NOT EXISTS` / pragmas: a no-op
    // on an already-current database, and picks up `command_stat` if this
    // file predates it.
    conn.execute_batch(BOOTSTRAP)?;

    if !column_exists(conn, "history", "cmd_hash")? {
        add_column(conn, "cmd_hash", "TEXT")?;
    }
    if !column_exists(conn, "history", "rank")? {
        add_column(conn, "rank", "REAL NOT NULL DEFAULT 0")?;
    }
    if !column_exists(conn, "history", "cmd_norm")? {
        add_column(conn, "cmd_norm", "TEXT")?;
        backfill_cmd_norm(conn)?;
    }

    backfill_hashes(conn)?;
    backfill_ranks(conn)?;
    create_indices_if_columns_present(conn)?;

    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, MigrationError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, MigrationError> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM pragma_table_info('{table}') WHERE name=?1"),
        [column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn add_column(conn: &Connection, column: &'static str, ddl_type: &str) -> Result<(), MigrationError> {
    conn.execute_batch(&format!("ALTER TABLE history ADD COLUMN {column} {ddl_type};"))
        .map_err(|detail| MigrationError::AddColumn { column, detail })
}

/// Backfill `cmd_norm` (the lowercased command text backing the
/// case-insensitive prefix index) in bounded batches.
fn backfill_cmd_norm(conn: &Connection) -> Result<(), MigrationError> {
    loop {
        let ids: Vec<i64> = {
            let mut stmt = conn.prepare(
                "SELECT id FROM history WHERE cmd_norm IS NULL LIMIT ?1",
            )?;
            let rows = stmt.query_map([BACKFILL_BATCH as i64], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        if ids.is_empty() {
            return Ok(());
        }

        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare("UPDATE history SET cmd_norm = lower(cmd) WHERE id = ?1")?;
            for id in &ids {
                stmt.execute([id])
                    .map_err(|detail| MigrationError::Backfill { column: "cmd_norm", detail })?;
            }
        }
        tx.commit()?;
    }
}

/// Backfill `cmd_hash` for rows that predate the column: read up to
/// `BACKFILL_BATCH` null rows, compute, update in one transaction, repeat.
/// The predicate (`cmd_hash IS NULL`) is what makes re-invocation safe
/// after a partial failure.
fn backfill_hashes(conn: &Connection) -> Result<(), MigrationError> {
    loop {
        let rows: Vec<(i64, String)> = {
            let mut stmt = conn.prepare(
                "SELECT id, cmd FROM history WHERE cmd_hash IS NULL LIMIT ?1",
            )?;
            let rows = stmt.query_map([BACKFILL_BATCH as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };
        if rows.is_empty() {
            return Ok(());
        }

        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE history SET cmd_hash = ?1 WHERE id = ?2")?;
            for (id, cmd) in &rows {
                let hash = ranking::hash_command(cmd);
                stmt.execute(rusqlite::params![hash, id])
                    .map_err(|detail| MigrationError::Backfill { column: "cmd_hash", detail })?;
            }
        }
        tx.commit()?;

        // A fresh hash means this row may now need a command_stat row too,
        // in case it was ingested before command_stat existed at all.
        upsert_stats_for_rows(conn, &rows)?;
    }
}

fn upsert_stats_for_rows(conn: &Connection, rows: &[(i64, String)]) -> Result<(), MigrationError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO command_stat (cmd_hash, cmd, frequency, last_used_at)
             SELECT cmd_hash, cmd, 1, event_time FROM history WHERE id = ?1
             ON CONFLICT(cmd_hash) DO UPDATE SET
                frequency = frequency + 1,
                last_used_at = MAX(last_used_at, excluded.last_used_at)",
        )?;
        for (id, _) in rows {
            stmt.execute([id])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Recompute `rank` for every row whose rank hasn't been touched since the
/// column was added. Driven by id ranges, using the direct-column-reference
/// update variant (the migrator has already guaranteed `command_stat` is
/// populated by this point).
fn backfill_ranks(conn: &Connection) -> Result<(), MigrationError> {
    recalculate_ranks(conn, BACKFILL_BATCH)
}

/// Recalculate `rank` for all rows, in batches of `batch_size` driven by id
/// ranges, joining via the hash index. Exposed for the admin-triggered
/// recalculation path (`histctl migrate --recalculate-ranks`).
pub fn recalculate_ranks(conn: &Connection, batch_size: usize) -> Result<(), MigrationError> {
    let max_id: Option<i64> = conn.query_row("SELECT MAX(id) FROM history", [], |row| row.get(0))?;
    let Some(max_id) = max_id else {
        return Ok(());
    };

    let now = crate::now();
    let mut lo = 1i64;
    while lo <= max_id {
        let hi = lo + batch_size as i64 - 1;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE history SET rank = (
                 SELECT ?1 * command_stat.frequency + ?2 / MAX(1, MIN(?3,
                     (?4 - command_stat.last_used_at) / 86400))
                 FROM command_stat
                 WHERE command_stat.cmd_hash = history.cmd_hash
             )
             WHERE id BETWEEN ?5 AND ?6 AND cmd_hash IS NOT NULL",
            rusqlite::params![ranking::ALPHA, ranking::BETA, ranking::MAX_DAYS, now, lo, hi],
        )?;
        tx.commit()?;
        lo = hi + 1;
    }
    Ok(())
}

fn create_indices_if_columns_present(conn: &Connection) -> Result<(), MigrationError> {
    if column_exists(conn, "history", "cmd_norm")? {
        create_index(conn, "idx_history_cmd_norm", "history(cmd_norm)")?;
    }
    if column_exists(conn, "history", "cmd_hash")? {
        create_index(conn, "idx_history_hash", "history(cmd_hash)")?;
    }
    if column_exists(conn, "history", "rank")? {
        create_index(conn, "idx_history_rank_event", "history(rank DESC, event_time DESC)")?;
    }
    Ok(())
}

fn create_index(conn: &Connection, index: &'static str, on: &str) -> Result<(), MigrationError> {
    conn.execute_batch(&format!("CREATE INDEX IF NOT EXISTS {index} ON {on};"))
        .map_err(|detail| MigrationError::CreateIndex { index, detail })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_memory() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn creates_schema_from_scratch() {
        let conn = open_memory();
        migrate(&conn).unwrap();
        assert!(table_exists(&conn, "history").unwrap());
        assert!(table_exists(&conn, "command_stat").unwrap());
        assert!(column_exists(&conn, "history", "cmd_hash").unwrap());
        assert!(column_exists(&conn, "history", "rank").unwrap());
    }

    #[test]
    fn second_invocation_is_a_no_op() {
        let conn = open_memory();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO history (cmd, cmd_norm, cwd, session_id, hostname, event_time, cmd_hash, rank)
             VALUES ('ls', 'ls', '/tmp', 's', 'h', 1, ?1, 5.0)",
            [ranking::hash_command("ls")],
        )
        .unwrap();

        migrate(&conn).unwrap();
        migrate(&conn).unwrap();

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1, "migrating twice must not duplicate or lose data");
    }

    #[test]
    fn backfills_legacy_rows_missing_derived_columns() {
        let conn = open_memory();
        conn.execute_batch(
            "CREATE TABLE history (
                id INTEGER PRIMARY KEY,
                cmd TEXT NOT NULL,
                cwd TEXT NOT NULL,
                exit_code INTEGER NOT NULL DEFAULT 0,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                session_id TEXT NOT NULL,
                hostname TEXT NOT NULL,
                event_time INTEGER NOT NULL
             );
             INSERT INTO history (cmd, cwd, session_id, hostname, event_time)
             VALUES ('git status', '/p', 's', 'h', 0);",
        )
        .unwrap();

        migrate(&conn).unwrap();

        let (hash, norm): (String, String) = conn
            .query_row(
                "SELECT cmd_hash, cmd_norm FROM history WHERE cmd = 'git status'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(hash, ranking::hash_command("git status"));
        assert_eq!(norm, "git status");

        let stat_freq: i64 = conn
            .query_row(
                "SELECT frequency FROM command_stat WHERE cmd_hash = ?1",
                [hash],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stat_freq, 1);
    }

    #[test]
    fn recalculating_ranks_twice_is_stable() {
        let conn = open_memory();
        migrate(&conn).unwrap();
        let hash = ranking::hash_command("npm install");
        conn.execute(
            "INSERT INTO command_stat (cmd_hash, cmd, frequency, last_used_at) VALUES (?1, 'npm install', 3, 0)",
            [&hash],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO history (cmd, cmd_norm, cwd, session_id, hostname, event_time, cmd_hash)
             VALUES ('npm install', 'npm install', '/p', 's', 'h', 0, ?1)",
            [&hash],
        )
        .unwrap();

        recalculate_ranks(&conn, 100).unwrap();
        let first: f64 = conn.query_row("SELECT rank FROM history", [], |r| r.get(0)).unwrap();
        recalculate_ranks(&conn, 100).unwrap();
        let second: f64 = conn.query_row("SELECT rank FROM history", [], |r| r.get(0)).unwrap();

        assert_eq!(first, second);
    }
}
