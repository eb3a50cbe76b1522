//! Profile binding: the 1:1 code-profile edge and its cascade protocol.
//!
//! This module owns the two places where code and profile state must move
//! together: the claim flow (profile creation assigns the code as its final
//! step) and the ordered cascade delete. Both are single transactions; a
//! failure anywhere rolls the whole operation back.
//!
//! # Cascade protocol
//!
//! Deleting a code, soft or hard, performs in order:
//! 1. for each referencing profile (all rows in hard mode, the live one in
//!    soft mode): delete its visits, then the profile (matching mode)
//! 2. capture the batch reference
//! 3. detach (`batch_id = NULL`) before the code's own deletion, so no reader
//!    ever counts a deleted-but-attached code
//! 4. delete the code row
//! 5. recompute the captured batch's count
//!
//! Visits and profile go first so an interrupted cascade leaves an
//! orphaned-but-detectable profile rather than a silently miscounted batch.

use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::info;

use crate::core::{
    BatchId, CodeId, CodeString, CustomLink, Profile, ProfileFields, ProfileId, ServiceEntry,
    Slug, Timestamp, UserId, slug::slugify,
};

use super::{DeleteMode, DeletedFilter, Store, StoreError, batches, codes, visits};

/// Ten thousand suffix probes before giving up. Unreachable in practice.
const SLUG_PROBE_LIMIT: u32 = 10_000;

/// What a cascade delete actually removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CascadeOutcome {
    pub code: CodeString,
    pub profile_deleted: Option<ProfileId>,
    pub visits_removed: usize,
    pub detached_from: Option<BatchId>,
}

impl Store {
    /// The claim flow: create a profile against an available code.
    ///
    /// One transaction: validate fields, repair the code if it is orphaned,
    /// resolve a unique slug, insert the profile, and assign the code as the
    /// final step. An authenticated user who abandons the flow before this
    /// call leaves the code untouched and claimable by someone else.
    pub fn create_profile(
        &mut self,
        code: &CodeString,
        user: &UserId,
        fields: &ProfileFields,
    ) -> Result<Profile, StoreError> {
        fields.validate()?;

        let tx = self.tx()?;
        let code_row = codes::get_code(&tx, code, DeletedFilter::ExcludeDeleted)?
            .ok_or(StoreError::CodeNotFound { code: code.clone() })?;

        if code_row.is_assigned() {
            if codes::has_live_profile(&tx, code_row.id)? {
                return Err(StoreError::CodeAlreadyAssigned { code: code.clone() });
            }
            // Orphan left by a partial claim: repair and continue as available.
            codes::fix_orphan(&tx, &code_row)?;
        }

        let base = slugify(&fields.first_name, &fields.last_name)?;
        let slug = resolve_unique_slug(&tx, &base, None)?;

        let now = Timestamp::now();
        tx.execute(
            "INSERT INTO profiles (user_id, code_id, slug, first_name, last_name, bio, \
                                   services, custom_links, is_public, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user.as_str(),
                code_row.id.as_i64(),
                slug.as_str(),
                fields.first_name,
                fields.last_name,
                fields.bio,
                serde_json::to_string(&fields.services)?,
                serde_json::to_string(&fields.custom_links)?,
                fields.is_public,
                now.as_millis(),
            ],
        )?;
        let profile_id = ProfileId(tx.last_insert_rowid());

        // Final step: only now does the code become assigned.
        codes::assign_code(&tx, code_row.id, user, now)?;

        let profile = get_profile(&tx, profile_id, DeletedFilter::ExcludeDeleted)?.ok_or(
            StoreError::ProfileNotFound { id: profile_id },
        )?;
        tx.commit()?;
        Ok(profile)
    }

    /// Update display fields. The slug regenerates iff the name changed,
    /// excluding the profile's own row from the uniqueness probe.
    pub fn update_profile(
        &mut self,
        id: ProfileId,
        fields: &ProfileFields,
    ) -> Result<Profile, StoreError> {
        fields.validate()?;

        let tx = self.tx()?;
        let current = get_profile(&tx, id, DeletedFilter::ExcludeDeleted)?
            .ok_or(StoreError::ProfileNotFound { id })?;

        let slug = if current.fields.name_differs(fields) {
            let base = slugify(&fields.first_name, &fields.last_name)?;
            resolve_unique_slug(&tx, &base, Some(id))?
        } else {
            current.slug.clone()
        };

        tx.execute(
            "UPDATE profiles SET slug = ?1, first_name = ?2, last_name = ?3, bio = ?4, \
                                 services = ?5, custom_links = ?6, is_public = ?7
             WHERE id = ?8",
            params![
                slug.as_str(),
                fields.first_name,
                fields.last_name,
                fields.bio,
                serde_json::to_string(&fields.services)?,
                serde_json::to_string(&fields.custom_links)?,
                fields.is_public,
                id.as_i64(),
            ],
        )?;

        let updated = get_profile(&tx, id, DeletedFilter::ExcludeDeleted)?
            .ok_or(StoreError::ProfileNotFound { id })?;
        tx.commit()?;
        Ok(updated)
    }

    /// Delete a profile by owner or admin action. Visits go first, then the
    /// profile, then the owning code is released back to `available` - the
    /// code survives its profile.
    pub fn delete_profile(&mut self, id: ProfileId, mode: DeleteMode) -> Result<(), StoreError> {
        let lookup = match mode {
            DeleteMode::Soft => DeletedFilter::ExcludeDeleted,
            DeleteMode::Hard => DeletedFilter::IncludeDeleted,
        };

        let tx = self.tx()?;
        let profile =
            get_profile(&tx, id, lookup)?.ok_or(StoreError::ProfileNotFound { id })?;

        let now = Timestamp::now();
        visits::delete_visits_for_profile(&tx, id, mode, now)?;
        delete_profile_row(&tx, id, mode, now)?;

        // The code survives and becomes claimable again - but only when the
        // row removed here was its live binding. Purging an old soft-deleted
        // row must not touch a code that may have been claimed again since.
        if profile.deleted_at.is_none()
            && codes::get_code_by_id(&tx, profile.code_id, DeletedFilter::ExcludeDeleted)?.is_some()
        {
            codes::release_code(&tx, profile.code_id)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Delete a resolve code with the full cascade protocol (soft or hard).
    pub fn delete_code(
        &mut self,
        code: &CodeString,
        mode: DeleteMode,
    ) -> Result<CascadeOutcome, StoreError> {
        let lookup = match mode {
            DeleteMode::Soft => DeletedFilter::ExcludeDeleted,
            DeleteMode::Hard => DeletedFilter::IncludeDeleted,
        };

        let tx = self.tx()?;
        let code_row = codes::get_code(&tx, code, lookup)?
            .ok_or(StoreError::CodeNotFound { code: code.clone() })?;

        // Step 1: profiles and their visits, in that order. Hard mode must
        // sweep every row referencing the code - a re-claimed code carries
        // historical soft-deleted profiles alongside the live one, and any
        // survivor would trip the foreign key when the code row goes.
        let mut profile_deleted = None;
        let mut visits_removed = 0;
        let now = Timestamp::now();
        for profile in get_profiles_by_code(&tx, code_row.id, lookup)? {
            visits_removed += visits::delete_visits_for_profile(&tx, profile.id, mode, now)?;
            delete_profile_row(&tx, profile.id, mode, now)?;
            profile_deleted.get_or_insert(profile.id);
        }

        // Steps 2-3: capture the batch, then detach before the deletion
        // itself commits. A deleted code must never be counted as a member,
        // even transiently.
        let detached_from = code_row.batch_id;
        if detached_from.is_some() {
            tx.execute(
                "UPDATE codes SET batch_id = NULL WHERE id = ?1",
                [code_row.id.as_i64()],
            )?;
        }

        // Step 4: the code row itself.
        match mode {
            DeleteMode::Soft => {
                tx.execute(
                    "UPDATE codes SET deleted_at_ms = ?1 WHERE id = ?2",
                    params![Timestamp::now().as_millis(), code_row.id.as_i64()],
                )?;
            }
            DeleteMode::Hard => {
                tx.execute("DELETE FROM codes WHERE id = ?1", [code_row.id.as_i64()])?;
            }
        }

        // Step 5: the batch count no longer includes this code.
        if let Some(batch_id) = detached_from {
            batches::recompute_count(&tx, batch_id)?;
        }

        tx.commit()?;
        info!(
            code = %code, ?mode,
            profile = ?profile_deleted, visits = visits_removed,
            "cascade-deleted resolve code"
        );
        Ok(CascadeOutcome {
            code: code.clone(),
            profile_deleted,
            visits_removed,
            detached_from,
        })
    }

    pub fn get_profile(
        &self,
        id: ProfileId,
        filter: DeletedFilter,
    ) -> Result<Option<Profile>, StoreError> {
        get_profile(self.connection(), id, filter)
    }

    pub fn get_profile_by_slug(
        &self,
        slug: &Slug,
        filter: DeletedFilter,
    ) -> Result<Option<Profile>, StoreError> {
        let sql = format!(
            "SELECT id, user_id, code_id, slug, first_name, last_name, bio, services, \
                    custom_links, is_public, created_at_ms, deleted_at_ms
             FROM profiles WHERE slug = ?1 AND {}",
            filter.clause()
        );
        let conn = self.connection();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([slug.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(profile_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_profile_for_code(
        &self,
        code_id: CodeId,
        filter: DeletedFilter,
    ) -> Result<Option<Profile>, StoreError> {
        get_profile_by_code(self.connection(), code_id, filter)
    }
}

/// Probe `base`, `base1`, `base2`, ... against all profile rows (deleted ones
/// keep their slugs) until a free candidate appears. `exclude` skips the
/// profile's own row on update.
fn resolve_unique_slug(
    conn: &Connection,
    base: &Slug,
    exclude: Option<ProfileId>,
) -> Result<Slug, StoreError> {
    let mut candidate = base.clone();
    for n in 1..=SLUG_PROBE_LIMIT {
        if !slug_taken(conn, &candidate, exclude)? {
            return Ok(candidate);
        }
        candidate = base.with_suffix(n);
    }
    Err(StoreError::SlugSpaceExhausted { base: base.clone() })
}

fn slug_taken(
    conn: &Connection,
    slug: &Slug,
    exclude: Option<ProfileId>,
) -> Result<bool, StoreError> {
    let taken: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM profiles WHERE slug = ?1 AND (?2 IS NULL OR id != ?2))",
        params![slug.as_str(), exclude.map(ProfileId::as_i64)],
        |row| row.get(0),
    )?;
    Ok(taken != 0)
}

fn delete_profile_row(
    conn: &Connection,
    id: ProfileId,
    mode: DeleteMode,
    now: Timestamp,
) -> Result<(), StoreError> {
    match mode {
        DeleteMode::Soft => {
            conn.execute(
                "UPDATE profiles SET deleted_at_ms = ?1 WHERE id = ?2 AND deleted_at_ms IS NULL",
                params![now.as_millis(), id.as_i64()],
            )?;
        }
        DeleteMode::Hard => {
            conn.execute("DELETE FROM profiles WHERE id = ?1", [id.as_i64()])?;
        }
    }
    Ok(())
}

pub(crate) fn get_profile(
    conn: &Connection,
    id: ProfileId,
    filter: DeletedFilter,
) -> Result<Option<Profile>, StoreError> {
    let sql = format!(
        "SELECT id, user_id, code_id, slug, first_name, last_name, bio, services, \
                custom_links, is_public, created_at_ms, deleted_at_ms
         FROM profiles WHERE id = ?1 AND {}",
        filter.clause()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([id.as_i64()])?;
    match rows.next()? {
        Some(row) => Ok(Some(profile_from_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn get_profile_by_code(
    conn: &Connection,
    code_id: CodeId,
    filter: DeletedFilter,
) -> Result<Option<Profile>, StoreError> {
    Ok(get_profiles_by_code(conn, code_id, filter)?.into_iter().next())
}

/// All profile rows referencing a code, newest first. More than one row only
/// ever exists across soft-delete/re-claim cycles.
pub(crate) fn get_profiles_by_code(
    conn: &Connection,
    code_id: CodeId,
    filter: DeletedFilter,
) -> Result<Vec<Profile>, StoreError> {
    let sql = format!(
        "SELECT id, user_id, code_id, slug, first_name, last_name, bio, services, \
                custom_links, is_public, created_at_ms, deleted_at_ms
         FROM profiles WHERE code_id = ?1 AND {} ORDER BY id DESC",
        filter.clause()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([code_id.as_i64()])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(profile_from_row(row)?);
    }
    Ok(out)
}

fn profile_from_row(row: &rusqlite::Row<'_>) -> Result<Profile, StoreError> {
    let user_raw: String = row.get(1)?;
    let slug_raw: String = row.get(3)?;
    let services_raw: String = row.get(7)?;
    let links_raw: String = row.get(8)?;

    let user_id = UserId::new(user_raw).map_err(|e| StoreError::RowDecode {
        table: "profiles",
        detail: e.to_string(),
    })?;
    let slug = Slug::parse(&slug_raw).map_err(|e| StoreError::RowDecode {
        table: "profiles",
        detail: e.to_string(),
    })?;
    let services: Vec<ServiceEntry> = serde_json::from_str(&services_raw)?;
    let custom_links: Vec<CustomLink> = serde_json::from_str(&links_raw)?;

    Ok(Profile {
        id: ProfileId(row.get(0)?),
        user_id,
        code_id: CodeId(row.get(2)?),
        slug,
        fields: ProfileFields {
            first_name: row.get(4)?,
            last_name: row.get(5)?,
            bio: row.get(6)?,
            services,
            custom_links,
            is_public: row.get(9)?,
        },
        created_at: Timestamp(row.get(10)?),
        deleted_at: row.get::<_, Option<i64>>(11)?.map(Timestamp),
    })
}
