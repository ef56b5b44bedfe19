//! Terminal front end for the interactive browser: a thin render/input loop
//! around `history_core::browser`'s pure navigation state machine and
//! read-only queries.

use std::io::{stdout, Write};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::ClearType;
use crossterm::{cursor, execute, queue, terminal};
use history_core::browser::{Browser, DisplayRow, NavigationState, Scope};
use history_core::Store;

/// Runs the browser until the user confirms (`Some(command)`) or cancels
/// (`None`). Takes over the whole terminal for the duration of the call.
pub fn run(store: &Store, scope: Scope) -> Result<Option<String>> {
    let browser = Browser::new(store);
    let mut out = stdout();

    terminal::enable_raw_mode()?;
    execute!(out, terminal::EnterAlternateScreen, cursor::Hide)?;
    let result = event_loop(&browser, &scope, &mut out);
    execute!(out, cursor::Show, terminal::LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;

    result
}

fn event_loop(browser: &Browser, scope: &Scope, out: &mut impl Write) -> Result<Option<String>> {
    let (_, term_rows) = terminal::size()?;
    let mut nav = NavigationState::new(viewport_rows(term_rows));
    let mut rows: Vec<DisplayRow> = Vec::new();
    let mut dirty = true;

    loop {
        if dirty {
            refresh(&mut nav, browser, scope, &mut rows)?;
            render(out, &nav, &rows)?;
            dirty = false;
        }

        match event::read()? {
            Event::Resize(_, new_rows) => {
                nav.viewport_rows = viewport_rows(new_rows);
                dirty = true;
            }
            Event::Key(KeyEvent { code, modifiers, .. }) => match code {
                KeyCode::Esc => {
                    if nav.in_filter_mode {
                        nav.toggle_filter_mode();
                        nav.filter_buffer.clear();
                    } else {
                        return Ok(None);
                    }
                    dirty = true;
                }
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return Ok(None),
                KeyCode::Enter => {
                    let selected = row_index(&nav).and_then(|i| rows.get(i)).map(|r| r.cmd.clone());
                    return Ok(selected);
                }
                KeyCode::Up => {
                    nav.up();
                    dirty = true;
                }
                KeyCode::Down => {
                    nav.down();
                    dirty = true;
                }
                KeyCode::PageUp => {
                    nav.page_up();
                    dirty = true;
                }
                KeyCode::PageDown => {
                    nav.page_down();
                    dirty = true;
                }
                KeyCode::Home => {
                    nav.home();
                    dirty = true;
                }
                KeyCode::End => {
                    nav.end();
                    dirty = true;
                }
                KeyCode::Tab => {
                    nav.toggle_select_current();
                    dirty = true;
                }
                KeyCode::Char('r') if modifiers.contains(KeyModifiers::CONTROL) => {
                    dirty = true;
                }
                KeyCode::Char('u') if modifiers.contains(KeyModifiers::CONTROL) && nav.in_filter_mode => {
                    nav.clear_filter();
                    dirty = true;
                }
                KeyCode::Char('/') if !nav.in_filter_mode => {
                    nav.toggle_filter_mode();
                    dirty = true;
                }
                KeyCode::Backspace if nav.in_filter_mode => {
                    nav.filter_buffer.pop();
                    dirty = true;
                }
                KeyCode::Char(c) if nav.in_filter_mode && modifiers & !KeyModifiers::SHIFT == KeyModifiers::NONE => {
                    nav.filter_buffer.push(c);
                    dirty = true;
                }
                _ => {}
            },
            _ => {}
        }
    }
}

fn viewport_rows(term_rows: u16) -> usize {
    term_rows.saturating_sub(3).max(1) as usize
}

fn row_index(nav: &NavigationState) -> Option<usize> {
    if nav.total_count == 0 {
        return None;
    }
    Some(if nav.in_filter_mode {
        nav.selected_index
    } else {
        nav.selected_row_in_page()
    })
}

fn refresh(
    nav: &mut NavigationState,
    browser: &Browser,
    scope: &Scope,
    rows: &mut Vec<DisplayRow>,
) -> Result<()> {
    let now = history_core::now();
    if nav.in_filter_mode && !nav.filter_buffer.is_empty() {
        *rows = browser.filter_matches(scope, &nav.filter_buffer, now)?;
        nav.set_total(rows.len());
    } else {
        let total = browser.total_count(scope)?;
        nav.set_total(total);
        *rows = browser.browse_page(scope, nav.scroll_offset, nav.viewport_rows, now)?;
    }
    Ok(())
}

fn render(out: &mut impl Write, nav: &NavigationState, rows: &[DisplayRow]) -> Result<()> {
    queue!(out, terminal::Clear(ClearType::All), cursor::MoveTo(0, 0))?;

    let header = if nav.in_filter_mode {
        format!("/{}", nav.filter_buffer)
    } else {
        format!("{} entries", nav.total_count)
    };
    queue!(out, Print(header), Print("\r\n"))?;

    for (i, row) in rows.iter().enumerate() {
        let is_selected = match (nav.in_filter_mode, nav.total_count) {
            (_, 0) => false,
            (true, _) => i == nav.selected_index,
            (false, _) => nav.scroll_offset + i == nav.selected_index,
        };
        render_row(out, row, is_selected)?;
    }

    queue!(
        out,
        cursor::MoveTo(0, nav.viewport_rows as u16 + 2),
        Print("up/down/pgup/pgdn/home/end move  /  filter  tab  select  enter  confirm  esc  cancel"),
    )?;
    out.flush()?;
    Ok(())
}

fn render_row(out: &mut impl Write, row: &DisplayRow, is_selected: bool) -> Result<()> {
    let marker = if is_selected { '>' } else { ' ' };
    let directory = truncate_left(&row.cwd, 24);
    let duration = row.duration.as_deref().unwrap_or("");

    if row.failed {
        queue!(out, SetForegroundColor(Color::Red))?;
    }
    queue!(
        out,
        Print(format!(
            "{marker} {:<50} {:<24} {:>7}  {:<8}\r\n",
            highlight_plain(row), directory, row.relative_time, duration
        )),
    )?;
    if row.failed {
        queue!(out, ResetColor)?;
    }
    Ok(())
}

/// Plain-text render of the command with filter-match substrings left
/// unstyled here; a richer terminal could use `row.highlights` to invert
/// just those ranges instead of coloring the whole failed row.
fn highlight_plain(row: &DisplayRow) -> &str {
    &row.cmd
}

fn truncate_left(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let tail: String = s.chars().rev().take(width.saturating_sub(1)).collect::<Vec<_>>().into_iter().rev().collect();
    format!("…{tail}")
}
