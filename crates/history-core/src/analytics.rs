//! Aggregation queries and the text report they drive. Read-only:
//! everything here goes through the pooled reader, never the write handle.

use rusqlite::params;

use crate::store::Store;

/// How many distinct commands and directories the report lists.
const TOP_N: usize = 10;
const HOUR_BUCKETS: usize = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct TopCommand {
    pub cmd: String,
    pub rank: f64,
    pub count: i64,
    pub last_used_relative: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopDirectory {
    pub cwd: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsReport {
    pub total_commands: i64,
    pub distinct_commands: i64,
    pub success_rate: f64,
    /// `(oldest, newest)` event dates, as calendar days, if any rows exist.
    pub date_range: Option<(String, String)>,
    pub top_commands: Vec<TopCommand>,
    pub hourly_histogram: [i64; HOUR_BUCKETS],
    pub top_directories: Vec<TopDirectory>,
}

impl AnalyticsReport {
    /// Render the plain-text report `histctl stats` prints to stdout.
    pub fn render(&self) -> String {
        if self.total_commands == 0 {
            return "No commands recorded yet.\n".to_string();
        }

        let mut out = String::new();
        out.push_str(&format!(
            "Total commands: {}\nDistinct commands: {}\nSuccess rate: {:.1}%\n",
            self.total_commands,
            self.distinct_commands,
            self.success_rate * 100.0
        ));
        if let Some((oldest, newest)) = &self.date_range {
            out.push_str(&format!("History spans {oldest} to {newest}\n"));
        }
        out.push('\n');

        out.push_str("Top commands:\n");
        for (i, c) in self.top_commands.iter().enumerate() {
            out.push_str(&format!(
                "  {:>2}. {:<30} rank {:>7.2}  {:>5} uses   last used {}\n",
                i + 1,
                c.cmd,
                c.rank,
                c.count,
                c.last_used_relative
            ));
        }

        out.push_str("\nActivity by hour:\n");
        let max_bin = self.hourly_histogram.iter().copied().max().unwrap_or(0).max(1);
        for (hour, count) in self.hourly_histogram.iter().enumerate() {
            let bar_len = (*count as f64 / max_bin as f64 * 40.0).round() as usize;
            out.push_str(&format!("  {:02}:00 {} {}\n", hour, "#".repeat(bar_len), count));
        }

        if !self.top_directories.is_empty() {
            out.push_str("\nTop directories:\n");
            for d in &self.top_directories {
                out.push_str(&format!("  {:<40} {:>5} uses\n", d.cwd, d.count));
            }
        }

        out
    }
}

pub struct Analytics<'s> {
    store: &'s Store,
}

impl<'s> Analytics<'s> {
    pub fn new(store: &'s Store) -> Self {
        Analytics { store }
    }

    pub fn report(&self, now: i64) -> Result<AnalyticsReport, rusqlite::Error> {
        let conn = self.store.read_handle().map_err(pool_err)?;

        let total_commands: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |r| r.get(0))?;
        if total_commands == 0 {
            return Ok(AnalyticsReport {
                total_commands: 0,
                distinct_commands: 0,
                success_rate: 0.0,
                date_range: None,
                top_commands: Vec::new(),
                hourly_histogram: [0; HOUR_BUCKETS],
                top_directories: Vec::new(),
            });
        }

        let (oldest, newest): (i64, i64) = conn.query_row(
            "SELECT MIN(event_time), MAX(event_time) FROM history",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let date_range = Some((format_calendar_day(oldest), format_calendar_day(newest)));

        let distinct_commands: i64 =
            conn.query_row("SELECT COUNT(*) FROM command_stat", [], |r| r.get(0))?;
        let successes: i64 =
            conn.query_row("SELECT COUNT(*) FROM history WHERE exit_code = 0", [], |r| r.get(0))?;
        let success_rate = successes as f64 / total_commands as f64;

        let mut stmt = conn.prepare_cached(
            "SELECT cmd, frequency, last_used_at FROM command_stat
             ORDER BY frequency DESC, last_used_at DESC LIMIT ?1",
        )?;
        let top_commands = stmt
            .query_map(params![TOP_N as i64], |row| {
                let cmd: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                let last_used_at: i64 = row.get(2)?;
                Ok((cmd, count, last_used_at))
            })?
            .map(|r| {
                let (cmd, count, last_used_at) = r?;
                Ok(TopCommand {
                    cmd,
                    rank: crate::ranking::rank(count, last_used_at, now),
                    count,
                    last_used_relative: crate::browser::relative_time(now - last_used_at),
                })
            })
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        let mut hourly_histogram = [0i64; HOUR_BUCKETS];
        {
            let mut stmt = conn.prepare_cached(
                "SELECT CAST(strftime('%H', event_time, 'unixepoch') AS INTEGER), COUNT(*)
                 FROM history GROUP BY 1",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (hour, count) = row?;
                if (0..HOUR_BUCKETS as i64).contains(&hour) {
                    hourly_histogram[hour as usize] = count;
                }
            }
        }

        let mut stmt = conn.prepare_cached(
            "SELECT cwd, COUNT(*) as n FROM history GROUP BY cwd ORDER BY n DESC LIMIT ?1",
        )?;
        let top_directories = stmt
            .query_map(params![TOP_N as i64], |row| {
                Ok(TopDirectory {
                    cwd: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        Ok(AnalyticsReport {
            total_commands,
            distinct_commands,
            success_rate,
            date_range,
            top_commands,
            hourly_histogram,
            top_directories,
        })
    }
}

fn pool_err(_: r2d2::Error) -> rusqlite::Error {
    rusqlite::Error::InvalidParameterName("connection pool exhausted".to_string())
}

fn format_calendar_day(epoch_secs: i64) -> String {
    chrono::DateTime::from_timestamp(epoch_secs, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommandObservation;
    use crate::writer::Writer;

    #[test]
    fn empty_database_reports_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("history.db")).unwrap();
        let analytics = Analytics::new(&store);
        let report = analytics.report(crate::now()).unwrap();
        assert_eq!(report.total_commands, 0);
        assert_eq!(report.render(), "No commands recorded yet.\n");
    }

    #[test]
    fn success_rate_and_top_commands_reflect_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("history.db")).unwrap();
        let writer = Writer::new(&store);

        writer.write_one(CommandObservation::new("ls", "/p")).unwrap();
        writer.write_one(CommandObservation::new("ls", "/p")).unwrap();
        let mut failing = CommandObservation::new("false", "/p");
        failing.exit_code = 1;
        writer.write_one(failing).unwrap();

        let analytics = Analytics::new(&store);
        let report = analytics.report(crate::now()).unwrap();
        assert_eq!(report.total_commands, 3);
        assert_eq!(report.distinct_commands, 2);
        assert!((report.success_rate - (2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(report.top_commands[0].cmd, "ls");
        assert_eq!(report.top_commands[0].count, 2);
    }

    #[test]
    fn top_directories_counts_by_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("history.db")).unwrap();
        let writer = Writer::new(&store);
        writer.write_one(CommandObservation::new("a", "/repo")).unwrap();
        writer.write_one(CommandObservation::new("b", "/repo")).unwrap();
        writer.write_one(CommandObservation::new("c", "/tmp")).unwrap();

        let analytics = Analytics::new(&store);
        let report = analytics.report(crate::now()).unwrap();
        assert_eq!(report.top_directories[0].cwd, "/repo");
        assert_eq!(report.top_directories[0].count, 2);
    }

    #[test]
    fn rendered_report_contains_header_and_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("history.db")).unwrap();
        let writer = Writer::new(&store);
        writer.write_one(CommandObservation::new("ls", "/p")).unwrap();

        let analytics = Analytics::new(&store);
        let rendered = analytics.report(crate::now()).unwrap().render();
        assert!(rendered.contains("Total commands: 1"));
        assert!(rendered.contains("Activity by hour"));
        assert!(rendered.contains("Top directories"));
    }
}
