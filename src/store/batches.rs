//! Batch ledger: authoritative active counts for code batches.
//!
//! `cached_count` is strictly a materialized view of `active_count`. It is
//! overwritten after every membership mutation and re-verified by the
//! reconciliation sweep - never maintained with increments, which drift under
//! partial failure.

use rusqlite::{Connection, params};
use serde::Serialize;

use crate::core::{BatchId, BatchPrefix, CodeBatch, Timestamp, UserId};

use super::{Store, StoreError};

/// A batch as the admin surface sees it: cached value next to the live one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub batch: CodeBatch,
    pub live_count: i64,
}

impl BatchCounts {
    pub fn is_drifted(&self) -> bool {
        self.batch.count != self.live_count
    }
}

impl Store {
    pub fn create_batch(
        &mut self,
        name: &str,
        prefix: &BatchPrefix,
        created_by: &UserId,
    ) -> Result<CodeBatch, StoreError> {
        let tx = self.tx()?;
        tx.execute(
            "INSERT INTO batches (name, prefix, cached_count, created_by, created_at_ms)
             VALUES (?1, ?2, 0, ?3, ?4)",
            params![
                name,
                prefix.as_str(),
                created_by.as_str(),
                Timestamp::now().as_millis(),
            ],
        )?;
        let id = BatchId(tx.last_insert_rowid());
        let batch = get_batch(&tx, id)?.ok_or(StoreError::BatchNotFound { id })?;
        tx.commit()?;
        Ok(batch)
    }

    pub fn get_batch(&self, id: BatchId) -> Result<Option<CodeBatch>, StoreError> {
        get_batch(self.connection(), id)
    }

    /// Authoritative count: non-deleted codes currently referencing the batch.
    pub fn active_count(&self, id: BatchId) -> Result<i64, StoreError> {
        active_count(self.connection(), id)
    }

    /// Overwrite the cached count with the authoritative one.
    pub fn recompute_count(&mut self, id: BatchId) -> Result<i64, StoreError> {
        let tx = self.tx()?;
        get_batch(&tx, id)?.ok_or(StoreError::BatchNotFound { id })?;
        let count = recompute_count(&tx, id)?;
        tx.commit()?;
        Ok(count)
    }

    /// All batches with cached and live counts, for admin inspection.
    pub fn list_batches(&self) -> Result<Vec<BatchCounts>, StoreError> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT id, name, prefix, cached_count, created_by, created_at_ms
             FROM batches ORDER BY id",
        )?;
        let mut rows = stmt.query(params![])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let batch = batch_from_row(row)?;
            let live_count = active_count(conn, batch.id)?;
            out.push(BatchCounts { batch, live_count });
        }
        Ok(out)
    }

    /// Delete the batch row. Non-cascading by design: member codes keep their
    /// now-dangling `batch_id` and read as unbatched from here on; the next
    /// reconciliation sweep detaches them properly.
    pub fn delete_batch(&mut self, id: BatchId) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let affected = tx.execute("DELETE FROM batches WHERE id = ?1", [id.as_i64()])?;
        if affected == 0 {
            return Err(StoreError::BatchNotFound { id });
        }
        tx.commit()?;
        Ok(())
    }
}

pub(crate) fn get_batch(conn: &Connection, id: BatchId) -> Result<Option<CodeBatch>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, prefix, cached_count, created_by, created_at_ms
         FROM batches WHERE id = ?1",
    )?;
    let mut rows = stmt.query([id.as_i64()])?;
    match rows.next()? {
        Some(row) => Ok(Some(batch_from_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn active_count(conn: &Connection, id: BatchId) -> Result<i64, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM codes WHERE batch_id = ?1 AND deleted_at_ms IS NULL",
        [id.as_i64()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Overwrite `cached_count` inside the caller's transaction. Tolerates a
/// missing batch row (the code's reference may dangle after batch deletion).
pub(crate) fn recompute_count(conn: &Connection, id: BatchId) -> Result<i64, StoreError> {
    let count = active_count(conn, id)?;
    conn.execute(
        "UPDATE batches SET cached_count = ?1 WHERE id = ?2",
        params![count, id.as_i64()],
    )?;
    Ok(count)
}

fn batch_from_row(row: &rusqlite::Row<'_>) -> Result<CodeBatch, StoreError> {
    let prefix_raw: String = row.get(2)?;
    let created_by_raw: String = row.get(4)?;

    let prefix = BatchPrefix::parse(&prefix_raw).map_err(|e| StoreError::RowDecode {
        table: "batches",
        detail: e.to_string(),
    })?;
    let created_by = UserId::new(created_by_raw).map_err(|e| StoreError::RowDecode {
        table: "batches",
        detail: e.to_string(),
    })?;

    Ok(CodeBatch {
        id: BatchId(row.get(0)?),
        name: row.get(1)?,
        prefix,
        count: row.get(3)?,
        created_by,
        created_at: Timestamp(row.get(5)?),
    })
}
