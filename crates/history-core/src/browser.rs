//! Backs the interactive full-screen search UI: browse mode (paginated
//! reverse-chronological scan) and filter mode (capped, deduplicated
//! substring match), plus the pure navigation state machine the two modes
//! share.

use rusqlite::params;

use crate::store::Store;

/// Cap on substring-match results in filter mode.
pub const FILTER_RESULT_CAP: usize = 300;
/// Bound on the optional multi-select extension.
pub const SELECTED_SET_CAP: usize = 5;

/// Global vs current-directory scope. The directory is captured once at
/// launch and does not track later `cd`s.
#[derive(Debug, Clone)]
pub enum Scope {
    Global,
    Directory(String),
}

/// What the reader supplies for one displayed row: everything the terminal
/// front end needs to draw it without its own database access.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRow {
    pub cmd: String,
    pub cwd: String,
    pub relative_time: String,
    pub duration: Option<String>,
    pub failed: bool,
    pub highlights: Vec<(usize, usize)>,
}

pub struct Browser<'s> {
    store: &'s Store,
}

impl<'s> Browser<'s> {
    pub fn new(store: &'s Store) -> Self {
        Browser { store }
    }

    /// Total row count for the given scope, used for scrollbar rendering in
    /// browse mode.
    pub fn total_count(&self, scope: &Scope) -> Result<usize, rusqlite::Error> {
        let conn = self.store.read_handle().map_err(pool_err)?;
        let count: i64 = match scope {
            Scope::Global => conn.query_row("SELECT COUNT(*) FROM history", [], |r| r.get(0))?,
            Scope::Directory(dir) => conn.query_row(
                "SELECT COUNT(*) FROM history WHERE cwd = ?1",
                params![dir],
                |r| r.get(0),
            )?,
        };
        Ok(count as usize)
    }

    /// Browse mode: `ORDER BY event_time DESC LIMIT V OFFSET S`.
    pub fn browse_page(
        &self,
        scope: &Scope,
        scroll_offset: usize,
        viewport_rows: usize,
        now: i64,
    ) -> Result<Vec<DisplayRow>, rusqlite::Error> {
        let conn = self.store.read_handle().map_err(pool_err)?;
        let mut rows = Vec::new();

        let mut push_rows = |stmt: &mut rusqlite::Statement, params: &[&dyn rusqlite::ToSql]| -> Result<(), rusqlite::Error> {
            let mapped = stmt.query_map(params, row_to_raw)?;
            for r in mapped {
                rows.push(to_display_row(r?, now, ""));
            }
            Ok(())
        };

        match scope {
            Scope::Global => {
                let mut stmt = conn.prepare_cached(
                    "SELECT cmd, cwd, exit_code, duration_ms, event_time
                     FROM history ORDER BY event_time DESC, id DESC LIMIT ?1 OFFSET ?2",
                )?;
                push_rows(&mut stmt, params![viewport_rows as i64, scroll_offset as i64])?;
            }
            Scope::Directory(dir) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT cmd, cwd, exit_code, duration_ms, event_time
                     FROM history WHERE cwd = ?1
                     ORDER BY event_time DESC, id DESC LIMIT ?2 OFFSET ?3",
                )?;
                push_rows(&mut stmt, params![dir, viewport_rows as i64, scroll_offset as i64])?;
            }
        }

        Ok(rows)
    }

    /// Filter mode: substring match against `filter`, `%`/`_`/`\` escaped,
    /// grouped by command text, most-recent occurrence first, capped at
    /// `FILTER_RESULT_CAP`.
    pub fn filter_matches(
        &self,
        scope: &Scope,
        filter: &str,
        now: i64,
    ) -> Result<Vec<DisplayRow>, rusqlite::Error> {
        let conn = self.store.read_handle().map_err(pool_err)?;
        let pattern = format!("%{}%", escape_like(filter));

        let mut rows = Vec::new();
        let mut collect = |stmt: &mut rusqlite::Statement, p: &[&dyn rusqlite::ToSql]| -> Result<(), rusqlite::Error> {
            let mapped = stmt.query_map(p, row_to_raw)?;
            for r in mapped {
                rows.push(to_display_row(r?, now, filter));
            }
            Ok(())
        };

        match scope {
            Scope::Global => {
                let mut stmt = conn.prepare_cached(
                    "SELECT cmd, cwd, exit_code, duration_ms, MAX(event_time) as event_time
                     FROM history WHERE cmd LIKE ?1 ESCAPE '\\'
                     GROUP BY cmd ORDER BY event_time DESC LIMIT ?2",
                )?;
                collect(&mut stmt, params![pattern, FILTER_RESULT_CAP as i64])?;
            }
            Scope::Directory(dir) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT cmd, cwd, exit_code, duration_ms, MAX(event_time) as event_time
                     FROM history WHERE cwd = ?1 AND cmd LIKE ?2 ESCAPE '\\'
                     GROUP BY cmd ORDER BY event_time DESC LIMIT ?3",
                )?;
                collect(&mut stmt, params![dir, pattern, FILTER_RESULT_CAP as i64])?;
            }
        }

        Ok(rows)
    }
}

fn pool_err(_: r2d2::Error) -> rusqlite::Error {
    rusqlite::Error::InvalidParameterName("connection pool exhausted".to_string())
}

struct RawRow {
    cmd: String,
    cwd: String,
    exit_code: i64,
    duration_ms: i64,
    event_time: i64,
}

fn row_to_raw(row: &rusqlite::Row) -> Result<RawRow, rusqlite::Error> {
    Ok(RawRow {
        cmd: row.get(0)?,
        cwd: row.get(1)?,
        exit_code: row.get(2)?,
        duration_ms: row.get(3)?,
        event_time: row.get(4)?,
    })
}

fn to_display_row(raw: RawRow, now: i64, filter: &str) -> DisplayRow {
    DisplayRow {
        highlights: highlight_ranges(&raw.cmd, filter),
        relative_time: relative_time(now - raw.event_time),
        duration: format_duration(raw.duration_ms),
        failed: raw.exit_code != 0,
        cmd: raw.cmd,
        cwd: raw.cwd,
    }
}

/// Escape `%`, `_`, and `\` for use inside a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Byte ranges in `cmd` covering every case-insensitive occurrence of
/// `filter`. Uses ASCII-only case folding so byte offsets in the lowercased
/// haystack/needle line up with the original string.
fn highlight_ranges(cmd: &str, filter: &str) -> Vec<(usize, usize)> {
    if filter.is_empty() {
        return Vec::new();
    }
    let haystack = cmd.to_ascii_lowercase();
    let needle = filter.to_ascii_lowercase();
    let mut ranges = Vec::new();
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(&needle) {
        let begin = start + pos;
        let end = begin + needle.len();
        ranges.push((begin, end));
        start = end.max(begin + 1);
    }
    ranges
}

pub(crate) fn relative_time(elapsed_secs: i64) -> String {
    let secs = elapsed_secs.max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3_600)
    } else if secs < 7 * 86_400 {
        format!("{}d", secs / 86_400)
    } else if secs < 30 * 86_400 {
        format!("{}w", secs / (7 * 86_400))
    } else if secs < 365 * 86_400 {
        format!("{}mo", secs / (30 * 86_400))
    } else {
        format!("{}y", secs / (365 * 86_400))
    }
}

fn format_duration(duration_ms: i64) -> Option<String> {
    if duration_ms < 1000 {
        return None;
    }
    let total_secs = duration_ms / 1000;
    if total_secs < 60 {
        Some(format!("{:.1}s", duration_ms as f64 / 1000.0))
    } else if total_secs < 3600 {
        let (m, s) = (total_secs / 60, total_secs % 60);
        if s == 0 {
            Some(format!("{m}m"))
        } else {
            Some(format!("{m}m{s}s"))
        }
    } else {
        let (h, m) = (total_secs / 3600, (total_secs % 3600) / 60);
        if m == 0 {
            Some(format!("{h}h"))
        } else {
            Some(format!("{h}h{m}m"))
        }
    }
}

/// Pure navigation state machine shared by browse and filter mode. Holds no
/// database handle; the caller re-fetches the page after each event that
/// changes what should be visible.
#[derive(Debug, Clone)]
pub struct NavigationState {
    pub selected_index: usize,
    pub scroll_offset: usize,
    pub total_count: usize,
    pub viewport_rows: usize,
    pub in_filter_mode: bool,
    pub filter_buffer: String,
    selected_set: Vec<usize>,
}

impl NavigationState {
    pub fn new(viewport_rows: usize) -> Self {
        NavigationState {
            selected_index: 0,
            scroll_offset: 0,
            total_count: 0,
            viewport_rows,
            in_filter_mode: false,
            filter_buffer: String::new(),
            selected_set: Vec::new(),
        }
    }

    /// Called whenever the backing row count changes (a fresh page load or
    /// a filter edit). Re-clamps the selection into range.
    pub fn set_total(&mut self, total: usize) {
        self.total_count = total;
        if total == 0 {
            self.selected_index = 0;
            self.scroll_offset = 0;
            return;
        }
        if self.selected_index >= total {
            self.selected_index = total - 1;
        }
        self.clamp_scroll();
    }

    pub fn up(&mut self) {
        self.move_selection_by(-1);
    }

    pub fn down(&mut self) {
        self.move_selection_by(1);
    }

    pub fn page_up(&mut self) {
        self.page_by(-(self.viewport_rows as i64));
    }

    pub fn page_down(&mut self) {
        self.page_by(self.viewport_rows as i64);
    }

    pub fn home(&mut self) {
        if self.total_count == 0 {
            return;
        }
        self.selected_index = 0;
        self.scroll_offset = 0;
    }

    pub fn end(&mut self) {
        if self.total_count == 0 {
            return;
        }
        self.selected_index = self.total_count - 1;
        self.scroll_offset = self.max_scroll();
    }

    pub fn toggle_filter_mode(&mut self) {
        self.in_filter_mode = !self.in_filter_mode;
        self.selected_index = 0;
        self.scroll_offset = 0;
    }

    pub fn clear_filter(&mut self) {
        self.filter_buffer.clear();
        self.selected_index = 0;
        self.scroll_offset = 0;
    }

    /// In browse mode, the loaded page covers `[scroll_offset,
    /// scroll_offset + viewport_rows)`; this resolves `selected_index`
    /// back to an index into that page.
    pub fn selected_row_in_page(&self) -> usize {
        self.selected_index - self.scroll_offset
    }

    /// Bounded, chronological-order multi-select extension. Adds the
    /// current selection if not already present, capped at
    /// [`SELECTED_SET_CAP`].
    pub fn toggle_select_current(&mut self) {
        if let Some(pos) = self.selected_set.iter().position(|&i| i == self.selected_index) {
            self.selected_set.remove(pos);
        } else if self.selected_set.len() < SELECTED_SET_CAP {
            self.selected_set.push(self.selected_index);
        }
    }

    pub fn selected_set(&self) -> &[usize] {
        &self.selected_set
    }

    fn move_selection_by(&mut self, delta: i64) {
        if self.total_count == 0 {
            return;
        }
        let next = (self.selected_index as i64 + delta).clamp(0, self.total_count as i64 - 1);
        self.selected_index = next as usize;
        self.clamp_scroll();
    }

    fn page_by(&mut self, delta: i64) {
        if self.total_count == 0 {
            return;
        }
        let next_selected = (self.selected_index as i64 + delta).clamp(0, self.total_count as i64 - 1);
        let next_scroll = (self.scroll_offset as i64 + delta).clamp(0, self.max_scroll() as i64);
        self.selected_index = next_selected as usize;
        self.scroll_offset = next_scroll as usize;
        self.clamp_scroll();
    }

    fn max_scroll(&self) -> usize {
        self.total_count.saturating_sub(self.viewport_rows)
    }

    /// The minimal-nudge visibility rule: scroll just enough that the
    /// selected row stays on screen.
    fn clamp_scroll(&mut self) {
        if self.viewport_rows == 0 {
            return;
        }
        if self.selected_index < self.scroll_offset {
            self.scroll_offset = self.selected_index;
        } else if self.selected_index >= self.scroll_offset + self.viewport_rows {
            self.scroll_offset = self.selected_index + 1 - self.viewport_rows;
        }
        self.scroll_offset = self.scroll_offset.min(self.max_scroll());
    }
}
