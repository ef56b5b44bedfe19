//! The shared on-disk store: one writable connection behind a mutex, and a
//! pool of read-only connections behind `r2d2`. Grounded in the teacher's
//! `crates/catalog::open`/`open_unchecked` split (one path that creates,
//! one that only opens) and `derive-sqlite/src/dbutil.rs::open`'s
//! pragma-then-migrate sequencing, generalized to a pooled multi-reader
//! shape per `other_examples/.../cmdai-src-history-manager.rs`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::error::StoreError;
use crate::migrator;
use crate::schema::PER_CONNECTION_PRAGMAS;

pub type Pool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Default size of the read-only connection pool.
pub const DEFAULT_POOL_SIZE: u32 = 5;

/// A single on-disk database shared by one writer and many readers.
pub struct Store {
    path: PathBuf,
    write_conn: Mutex<Connection>,
    read_pool: Pool,
}

impl Store {
    /// Open (creating if absent) the database at `path`, run the migrator,
    /// and build the reader pool. Fails with [`StoreError::OpenFailed`] if
    /// the path cannot be created, [`StoreError::Corrupt`] if it exists but
    /// is not a readable SQLite database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_pool_size(path, DEFAULT_POOL_SIZE)
    }

    pub fn open_with_pool_size(path: impl AsRef<Path>, pool_size: u32) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|detail| {
                    StoreError::DirectoryCreateFailed {
                        path: path.clone(),
                        detail,
                    }
                })?;
            }
        }

        let write_conn = Connection::open(&path).map_err(|detail| StoreError::OpenFailed {
            path: path.clone(),
            detail,
        })?;
        write_conn
            .execute_batch(PER_CONNECTION_PRAGMAS)
            .map_err(|detail| StoreError::Corrupt {
                path: path.clone(),
                detail,
            })?;

        migrator::migrate(&write_conn)?;
        tracing::debug!(path = %path.display(), "ran migrator");

        let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
            conn.execute_batch(PER_CONNECTION_PRAGMAS)
        });
        let read_pool = r2d2::Pool::builder()
            .max_size(pool_size)
            .build(manager)?;

        Ok(Store {
            path,
            write_conn: Mutex::new(write_conn),
            read_pool,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exclusive access to the single writable connection. Blocks if
    /// another writer currently holds it.
    pub fn write_handle(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.write_conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A pooled read-only connection. Blocks briefly if the pool is
    /// exhausted.
    pub fn read_handle(&self) -> Result<PooledConnection, r2d2::Error> {
        self.read_pool.get()
    }

    pub fn read_pool(&self) -> Pool {
        self.read_pool.clone()
    }
}
