use std::path::PathBuf;

/// Errors raised while opening or migrating the store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("failed to create parent directory for database at {path:?}")]
    DirectoryCreateFailed {
        path: PathBuf,
        #[source]
        detail: std::io::Error,
    },
    #[error("failed to create or open database at {path:?}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        detail: rusqlite::Error,
    },
    #[error("database at {path:?} exists but is not a readable database")]
    Corrupt {
        path: PathBuf,
        #[source]
        detail: rusqlite::Error,
    },
    #[error("failed to build connection pool")]
    Pool(#[from] r2d2::Error),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Errors raised while bringing a database up to the current schema.
#[derive(thiserror::Error, Debug)]
pub enum MigrationError {
    #[error("failed to add derived column {column}")]
    AddColumn {
        column: &'static str,
        #[source]
        detail: rusqlite::Error,
    },
    #[error("failed to backfill column {column}")]
    Backfill {
        column: &'static str,
        #[source]
        detail: rusqlite::Error,
    },
    #[error("failed to create index {index}")]
    CreateIndex {
        index: &'static str,
        #[source]
        detail: rusqlite::Error,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Errors raised by the Writer's validation and ingestion paths.
#[derive(thiserror::Error, Debug)]
pub enum WriterError {
    #[error("command text must not be empty")]
    EmptyCommand,
    #[error("working directory must not be empty")]
    EmptyPath,
    #[error("write was retried until contention could not be resolved")]
    Contention,
    #[error("failed to acquire a write connection")]
    Pool(#[from] r2d2::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Errors raised while importing a batch file or a plain-text shell history.
#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("failed to read import file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        detail: std::io::Error,
    },
    #[error("import file {path:?} is not valid JSON")]
    Malformed {
        path: PathBuf,
        #[source]
        detail: serde_json::Error,
    },
    #[error(transparent)]
    Writer(#[from] WriterError),
}
