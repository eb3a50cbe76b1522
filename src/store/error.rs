//! Store capability errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::{BatchId, CodeString, CoreError, ProfileId, Slug};
use crate::error::{Effect, Transience};

/// Canonical error enum for the persistence capability.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path is a symlink: {path:?}")]
    Symlink { path: PathBuf },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("json payload encode/decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{table} row decode failed: {detail}")]
    RowDecode { table: &'static str, detail: String },

    #[error("store schema version mismatch: expected {expected}, got {got}")]
    SchemaVersionMismatch { expected: u32, got: u32 },

    #[error("store meta mismatch for {key}: expected {expected}, got {got}")]
    MetaMismatch {
        key: &'static str,
        expected: String,
        got: String,
    },

    /// Code-string uniqueness is global and permanent: a soft-deleted code
    /// still blocks re-creation of its string.
    #[error("resolve code `{code}` already exists")]
    DuplicateCode { code: CodeString },

    #[error("resolve code `{code}` not found")]
    CodeNotFound { code: CodeString },

    #[error("resolve code `{code}` is already assigned")]
    CodeAlreadyAssigned { code: CodeString },

    #[error("batch {id} not found")]
    BatchNotFound { id: BatchId },

    #[error("profile {id} not found")]
    ProfileNotFound { id: ProfileId },

    /// Ten thousand suffix probes failed. Treated as unreachable in practice.
    #[error("slug space exhausted for base `{base}`")]
    SlugSpaceExhausted { base: Slug },
}

impl StoreError {
    pub fn transience(&self) -> Transience {
        match self {
            StoreError::Sqlite(e) => sqlite_transience(e),
            StoreError::Io { .. } => Transience::Retryable,
            StoreError::Symlink { .. }
            | StoreError::Core(_)
            | StoreError::Json(_)
            | StoreError::RowDecode { .. }
            | StoreError::SchemaVersionMismatch { .. }
            | StoreError::MetaMismatch { .. }
            | StoreError::DuplicateCode { .. }
            | StoreError::CodeNotFound { .. }
            | StoreError::CodeAlreadyAssigned { .. }
            | StoreError::BatchNotFound { .. }
            | StoreError::ProfileNotFound { .. }
            | StoreError::SlugSpaceExhausted { .. } => Transience::Permanent,
        }
    }

    /// Every mutating store operation runs inside one transaction, so a
    /// surfaced error means the transaction rolled back: no side effects.
    pub fn effect(&self) -> Effect {
        match self {
            StoreError::Sqlite(_) | StoreError::Io { .. } => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

fn sqlite_transience(e: &rusqlite::Error) -> Transience {
    use rusqlite::ErrorCode;
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => Transience::Retryable,
        Some(_) => Transience::Permanent,
        None => Transience::Unknown,
    }
}
