//! Code registry: creation, assignment, copy-tracking, orphan repair.
//!
//! Deletion is not here - it cascades across profiles and visits, so it lives
//! with the binding protocol in [`super::binding`].

use rusqlite::{Connection, params};
use tracing::info;

use crate::core::{
    BatchId, CodeId, CodeStatus, CodeString, InvalidQuantity, ResolveCode, Timestamp, UserId,
};

use super::{DeletedFilter, Store, StoreError, batches};

/// Upper bound for one bulk-generation call.
pub const MAX_BATCH_QUANTITY: u32 = 10_000;

impl Store {
    /// Mint a single code in `available` state.
    ///
    /// Uniqueness is global and permanent: a soft-deleted code still blocks
    /// its string.
    pub fn create_code(
        &mut self,
        code: &CodeString,
        kind: &str,
        batch: Option<BatchId>,
        created_by: &UserId,
    ) -> Result<ResolveCode, StoreError> {
        let tx = self.tx()?;

        if code_string_exists(&tx, code)? {
            return Err(StoreError::DuplicateCode { code: code.clone() });
        }
        if let Some(batch_id) = batch {
            // Fail loudly on a bad admin reference; dangling references only
            // ever arise from later batch deletion.
            batches::get_batch(&tx, batch_id)?.ok_or(StoreError::BatchNotFound { id: batch_id })?;
        }

        let id = insert_code(&tx, code, kind, batch, created_by, Timestamp::now())?;
        if let Some(batch_id) = batch {
            batches::recompute_count(&tx, batch_id)?;
        }

        let created = get_code_by_id(&tx, id, DeletedFilter::ExcludeDeleted)?
            .ok_or(StoreError::CodeNotFound { code: code.clone() })?;
        tx.commit()?;
        Ok(created)
    }

    /// Bulk-generate `quantity` codes into a batch, continuing the prefix
    /// sequence past its highest existing member (deleted members included,
    /// since their strings are permanently taken).
    pub fn create_batch_codes(
        &mut self,
        batch: BatchId,
        quantity: u32,
        kind: &str,
        created_by: &UserId,
    ) -> Result<Vec<ResolveCode>, StoreError> {
        if quantity == 0 || quantity > MAX_BATCH_QUANTITY {
            return Err(StoreError::Core(
                InvalidQuantity {
                    got: quantity,
                    max: MAX_BATCH_QUANTITY,
                }
                .into(),
            ));
        }

        let tx = self.tx()?;
        let batch_row =
            batches::get_batch(&tx, batch)?.ok_or(StoreError::BatchNotFound { id: batch })?;

        let start = highest_sequence(&tx, &batch_row.prefix)? + 1;
        let now = Timestamp::now();
        let mut created = Vec::with_capacity(quantity as usize);
        for n in start..start + quantity {
            let code = batch_row.prefix.sequence_code(n);
            if code_string_exists(&tx, &code)? {
                // A manually minted code can sit inside the sequence range.
                return Err(StoreError::DuplicateCode { code });
            }
            let id = insert_code(&tx, &code, kind, Some(batch), created_by, now)?;
            let row = get_code_by_id(&tx, id, DeletedFilter::ExcludeDeleted)?
                .ok_or(StoreError::CodeNotFound { code })?;
            created.push(row);
        }
        batches::recompute_count(&tx, batch)?;

        tx.commit()?;
        Ok(created)
    }

    /// Look up a code by its string.
    pub fn get_code(
        &self,
        code: &CodeString,
        filter: DeletedFilter,
    ) -> Result<Option<ResolveCode>, StoreError> {
        get_code(self.connection(), code, filter)
    }

    /// Codes in a batch (or unbatched codes when `batch` is `None`).
    pub fn list_codes(
        &self,
        batch: Option<BatchId>,
        filter: DeletedFilter,
    ) -> Result<Vec<ResolveCode>, StoreError> {
        let sql = match batch {
            Some(_) => format!(
                "SELECT id, code, status, kind, user_id, batch_id, assigned_at_ms, copied_at_ms, \
                        created_by, created_at_ms, deleted_at_ms \
                 FROM codes WHERE batch_id = ?1 AND {} ORDER BY code",
                filter.clause()
            ),
            None => format!(
                "SELECT id, code, status, kind, user_id, batch_id, assigned_at_ms, copied_at_ms, \
                        created_by, created_at_ms, deleted_at_ms \
                 FROM codes WHERE batch_id IS NULL AND {} ORDER BY code",
                filter.clause()
            ),
        };
        let conn = self.connection();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = match batch {
            Some(batch_id) => stmt.query(params![batch_id.as_i64()])?,
            None => stmt.query(params![])?,
        };
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(code_from_row(row)?);
        }
        Ok(out)
    }

    /// Record that an admin copied the token to a physical medium.
    ///
    /// Idempotent: the first timestamp wins, later calls are no-ops.
    pub fn mark_copied(&mut self, code: &CodeString) -> Result<ResolveCode, StoreError> {
        let tx = self.tx()?;
        let row = get_code(&tx, code, DeletedFilter::ExcludeDeleted)?
            .ok_or(StoreError::CodeNotFound { code: code.clone() })?;
        if row.copied_at.is_none() {
            tx.execute(
                "UPDATE codes SET copied_at_ms = ?1 WHERE id = ?2",
                params![Timestamp::now().as_millis(), row.id.as_i64()],
            )?;
        }
        let updated = get_code_by_id(&tx, row.id, DeletedFilter::ExcludeDeleted)?
            .ok_or(StoreError::CodeNotFound { code: code.clone() })?;
        tx.commit()?;
        Ok(updated)
    }

    /// Detect and repair an orphaned assignment: `assigned` with no live
    /// profile. Returns true if a repair was made.
    ///
    /// The resolution path runs this in its own transaction before routing;
    /// this entry point exists for admin tooling.
    pub fn check_and_fix_orphaned_state(
        &mut self,
        code: &CodeString,
    ) -> Result<bool, StoreError> {
        let tx = self.tx()?;
        let Some(row) = get_code(&tx, code, DeletedFilter::ExcludeDeleted)? else {
            return Err(StoreError::CodeNotFound { code: code.clone() });
        };
        let repaired = fix_orphan(&tx, &row)?;
        tx.commit()?;
        Ok(repaired)
    }
}

pub(crate) fn code_string_exists(
    conn: &Connection,
    code: &CodeString,
) -> Result<bool, StoreError> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM codes WHERE code = ?1)",
        [code.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists != 0)
}

pub(crate) fn insert_code(
    conn: &Connection,
    code: &CodeString,
    kind: &str,
    batch: Option<BatchId>,
    created_by: &UserId,
    now: Timestamp,
) -> Result<CodeId, StoreError> {
    conn.execute(
        "INSERT INTO codes (code, status, kind, batch_id, created_by, created_at_ms)
         VALUES (?1, 'available', ?2, ?3, ?4, ?5)",
        params![
            code.as_str(),
            kind,
            batch.map(BatchId::as_i64),
            created_by.as_str(),
            now.as_millis(),
        ],
    )?;
    Ok(CodeId(conn.last_insert_rowid()))
}

pub(crate) fn get_code(
    conn: &Connection,
    code: &CodeString,
    filter: DeletedFilter,
) -> Result<Option<ResolveCode>, StoreError> {
    let sql = format!(
        "SELECT id, code, status, kind, user_id, batch_id, assigned_at_ms, copied_at_ms, \
                created_by, created_at_ms, deleted_at_ms \
         FROM codes WHERE code = ?1 AND {}",
        filter.clause()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([code.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(code_from_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn get_code_by_id(
    conn: &Connection,
    id: CodeId,
    filter: DeletedFilter,
) -> Result<Option<ResolveCode>, StoreError> {
    let sql = format!(
        "SELECT id, code, status, kind, user_id, batch_id, assigned_at_ms, copied_at_ms, \
                created_by, created_at_ms, deleted_at_ms \
         FROM codes WHERE id = ?1 AND {}",
        filter.clause()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([id.as_i64()])?;
    match rows.next()? {
        Some(row) => Ok(Some(code_from_row(row)?)),
        None => Ok(None),
    }
}

/// Flip a code to `assigned`. Only the claim flow calls this, at the moment
/// the profile row is persisted - never at registration or login.
pub(crate) fn assign_code(
    conn: &Connection,
    id: CodeId,
    user: &UserId,
    now: Timestamp,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE codes SET status = 'assigned', user_id = ?1, assigned_at_ms = ?2 WHERE id = ?3",
        params![user.as_str(), now.as_millis(), id.as_i64()],
    )?;
    Ok(())
}

/// Return a code to `available`, clearing owner and assignment stamp.
pub(crate) fn release_code(conn: &Connection, id: CodeId) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE codes SET status = 'available', user_id = NULL, assigned_at_ms = NULL
         WHERE id = ?1",
        [id.as_i64()],
    )?;
    Ok(())
}

pub(crate) fn has_live_profile(conn: &Connection, code_id: CodeId) -> Result<bool, StoreError> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM profiles WHERE code_id = ?1 AND deleted_at_ms IS NULL)",
        [code_id.as_i64()],
        |row| row.get(0),
    )?;
    Ok(exists != 0)
}

/// Repair an orphaned assignment in the surrounding transaction.
///
/// An orphan is a transient inconsistency left by a partially-applied claim
/// (code updated, profile never persisted). Repaired silently: the caller
/// proceeds as though the code were always available.
pub(crate) fn fix_orphan(conn: &Connection, code: &ResolveCode) -> Result<bool, StoreError> {
    if !code.is_assigned() || has_live_profile(conn, code.id)? {
        return Ok(false);
    }
    release_code(conn, code.id)?;
    info!(code = %code.code, "repaired orphaned code assignment");
    Ok(true)
}

fn code_from_row(row: &rusqlite::Row<'_>) -> Result<ResolveCode, StoreError> {
    let code_raw: String = row.get(1)?;
    let status_raw: String = row.get(2)?;
    let user_raw: Option<String> = row.get(4)?;
    let created_by_raw: String = row.get(8)?;

    let code = CodeString::parse(&code_raw).map_err(|e| StoreError::RowDecode {
        table: "codes",
        detail: e.to_string(),
    })?;
    let status = CodeStatus::from_str(&status_raw).ok_or_else(|| StoreError::RowDecode {
        table: "codes",
        detail: format!("unknown status `{status_raw}`"),
    })?;
    let user_id = user_raw
        .map(|u| {
            UserId::new(u).map_err(|e| StoreError::RowDecode {
                table: "codes",
                detail: e.to_string(),
            })
        })
        .transpose()?;
    let created_by = UserId::new(created_by_raw).map_err(|e| StoreError::RowDecode {
        table: "codes",
        detail: e.to_string(),
    })?;

    Ok(ResolveCode {
        id: CodeId(row.get(0)?),
        code,
        status,
        kind: row.get(3)?,
        user_id,
        batch_id: row.get::<_, Option<i64>>(5)?.map(BatchId),
        assigned_at: row.get::<_, Option<i64>>(6)?.map(Timestamp),
        copied_at: row.get::<_, Option<i64>>(7)?.map(Timestamp),
        created_by,
        created_at: Timestamp(row.get(9)?),
        deleted_at: row.get::<_, Option<i64>>(10)?.map(Timestamp),
    })
}

fn highest_sequence(
    conn: &Connection,
    prefix: &crate::core::BatchPrefix,
) -> Result<u32, StoreError> {
    let mut stmt = conn.prepare("SELECT code FROM codes WHERE code LIKE ?1 || '%'")?;
    let mut rows = stmt.query([prefix.as_str()])?;
    let mut max = 0u32;
    while let Some(row) = rows.next()? {
        let raw: String = row.get(0)?;
        if let Ok(code) = CodeString::parse(&raw)
            && let Some(n) = prefix.sequence_of(&code)
        {
            max = max.max(n);
        }
    }
    Ok(max)
}
