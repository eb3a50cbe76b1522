//! SQLite-backed persistence for codes, batches, profiles, and visits.
//!
//! One [`Store`] owns one connection. Every mutating operation runs inside a
//! single transaction; a returned error always means the whole operation
//! rolled back. Soft delete is an explicit nullable `deleted_at_ms` column
//! with explicit query modes ([`DeletedFilter`]), not an implicit scope.
//!
//! # Schema
//!
//! - `codes`: the resolve codes. `batch_id` is a weak reference (no FK) so a
//!   batch can be deleted without touching its members. Two CHECKs guard the
//!   rest-state invariants: `assigned` iff `user_id` set, and deleted implies
//!   detached.
//! - `batches`: `cached_count` is a materialized value, recomputed after every
//!   membership mutation and by [`crate::reconcile`].
//! - `profiles`: 1:1 with live codes via a partial unique index; `slug` is
//!   globally unique across live and soft-deleted rows.
//! - `visits`: append-only, removed only by cascade.
//! - `meta`: application tag + schema version, validated on open.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

pub(crate) mod batches;
pub(crate) mod binding;
pub(crate) mod codes;
mod error;
pub(crate) mod visits;

pub use batches::BatchCounts;
pub use binding::CascadeOutcome;
pub use codes::MAX_BATCH_QUANTITY;
pub use error::StoreError;

const SCHEMA_VERSION: u32 = 1;
const APP_TAG: &str = "taplink";
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Soft versus permanent removal. The cascade protocol is identical in both
/// modes; only the terminal write differs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteMode {
    Soft,
    Hard,
}

/// Query mode for soft-deleted rows. Default everywhere is `ExcludeDeleted`;
/// the other two must be asked for explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DeletedFilter {
    #[default]
    ExcludeDeleted,
    IncludeDeleted,
    OnlyDeleted,
}

impl DeletedFilter {
    pub(crate) fn clause(self) -> &'static str {
        match self {
            DeletedFilter::ExcludeDeleted => "deleted_at_ms IS NULL",
            DeletedFilter::IncludeDeleted => "1=1",
            DeletedFilter::OnlyDeleted => "deleted_at_ms IS NOT NULL",
        }
    }
}

/// Handle to the backing database.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if absent) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            reject_symlink(dir)?;
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        reject_symlink(path)?;

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let is_new = !table_exists(&conn, "meta")?;
        if is_new {
            initialize_schema(&conn)?;
            write_meta(&conn)?;
            debug!("initialized new store");
        } else {
            validate_meta(&conn)?;
        }

        Ok(Self { conn })
    }

    pub(crate) fn tx(&mut self) -> Result<rusqlite::Transaction<'_>, StoreError> {
        Ok(self.conn.transaction()?)
    }

    /// Read-only access for callers that need raw queries (tests, doctor
    /// tooling). Mutations must go through the typed operations.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn reject_symlink(path: &Path) -> Result<(), StoreError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(StoreError::Symlink {
            path: path.to_path_buf(),
        }),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS meta (
             key TEXT PRIMARY KEY,
             value TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS batches (
             id INTEGER PRIMARY KEY,
             name TEXT NOT NULL,
             prefix TEXT NOT NULL,
             cached_count INTEGER NOT NULL DEFAULT 0,
             created_by TEXT NOT NULL,
             created_at_ms INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS codes (
             id INTEGER PRIMARY KEY,
             code TEXT NOT NULL UNIQUE,
             status TEXT NOT NULL CHECK (status IN ('available', 'assigned')),
             kind TEXT NOT NULL,
             user_id TEXT,
             batch_id INTEGER,
             assigned_at_ms INTEGER,
             copied_at_ms INTEGER,
             created_by TEXT NOT NULL,
             created_at_ms INTEGER NOT NULL,
             deleted_at_ms INTEGER,
             CHECK ((status = 'assigned') = (user_id IS NOT NULL)),
             CHECK (deleted_at_ms IS NULL OR batch_id IS NULL)
         );
         CREATE INDEX IF NOT EXISTS codes_batch
             ON codes(batch_id) WHERE batch_id IS NOT NULL;
         CREATE TABLE IF NOT EXISTS profiles (
             id INTEGER PRIMARY KEY,
             user_id TEXT NOT NULL,
             code_id INTEGER NOT NULL REFERENCES codes(id),
             slug TEXT NOT NULL UNIQUE,
             first_name TEXT NOT NULL,
             last_name TEXT NOT NULL,
             bio TEXT,
             services TEXT NOT NULL,
             custom_links TEXT NOT NULL,
             is_public INTEGER NOT NULL,
             created_at_ms INTEGER NOT NULL,
             deleted_at_ms INTEGER
         );
         CREATE UNIQUE INDEX IF NOT EXISTS profiles_live_code
             ON profiles(code_id) WHERE deleted_at_ms IS NULL;
         CREATE TABLE IF NOT EXISTS visits (
             id INTEGER PRIMARY KEY,
             profile_id INTEGER NOT NULL REFERENCES profiles(id),
             ip TEXT,
             user_agent TEXT,
             referer TEXT,
             country TEXT,
             city TEXT,
             device TEXT NOT NULL,
             visited_at_ms INTEGER NOT NULL,
             deleted_at_ms INTEGER
         );
         CREATE INDEX IF NOT EXISTS visits_profile ON visits(profile_id);
         COMMIT;",
    )?;
    Ok(())
}

fn write_meta(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('app', ?1), ('schema_version', ?2)",
        rusqlite::params![APP_TAG, SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

fn validate_meta(conn: &Connection) -> Result<(), StoreError> {
    let app = read_meta(conn, "app")?;
    if app != APP_TAG {
        return Err(StoreError::MetaMismatch {
            key: "app",
            expected: APP_TAG.to_string(),
            got: app,
        });
    }
    let version = read_meta(conn, "schema_version")?;
    let got: u32 = version.parse().map_err(|_| StoreError::MetaMismatch {
        key: "schema_version",
        expected: SCHEMA_VERSION.to_string(),
        got: version.clone(),
    })?;
    if got != SCHEMA_VERSION {
        return Err(StoreError::SchemaVersionMismatch {
            expected: SCHEMA_VERSION,
            got,
        });
    }
    Ok(())
}

fn read_meta(conn: &Connection, key: &'static str) -> Result<String, StoreError> {
    use rusqlite::OptionalExtension;
    conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or(StoreError::MetaMismatch {
        key,
        expected: "present".to_string(),
        got: "missing".to_string(),
    })
}

/// Default database location under the data directory.
pub fn default_db_path() -> PathBuf {
    crate::paths::data_dir().join("taplink.sqlite")
}
