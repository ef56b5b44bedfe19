//! Persistent, context-rich shell command history store.
//!
//! Unifies a concurrent writer, a latency-critical prefix predictor, and an
//! interactive search/scroll browser against one on-disk SQLite database.

pub mod analytics;
pub mod browser;
pub mod error;
pub mod migrator;
pub mod model;
pub mod predictor;
pub mod ranking;
mod schema;
pub mod store;
pub mod writer;

pub use error::{ImportError, MigrationError, StoreError, WriterError};
pub use model::{CommandObservation, CommandStat, HistoryRecord, ImportReport, RawImportEntry};
pub use store::Store;

/// Current time in seconds since the epoch. The sole place the crate reads
/// the wall clock, so tests can reason about it without depending on
/// real time passing between a write and a subsequent query.
pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs() as i64
}

/// Generate a fresh session tag: a 128-bit random identifier rendered in the
/// canonical 8-4-4-4-12 hex grouping with version/variant bits set.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Resolve the hostname for an observation whose caller didn't supply one:
/// read from the environment, falling back to `unknown`.
pub fn default_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| hostname_from_uname())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(unix)]
fn hostname_from_uname() -> Option<String> {
    // `gethostname(2)` via libc is the usual way to do this portably; we
    // avoid the extra dependency since HOSTNAME/unknown already covers the
    // contract and this crate otherwise has no libc usage to justify it.
    None
}

#[cfg(not(unix))]
fn hostname_from_uname() -> Option<String> {
    None
}

/// Default path for the database.
pub fn default_db_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".zigstory")
        .join("history.db")
}
