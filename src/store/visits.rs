//! Visit ledger: append-only profile view records.
//!
//! Pure collaborator of the binding layer. The only invariant is referential:
//! every visit belongs to exactly one profile and is removed only by that
//! profile's cascade.

use rusqlite::{Connection, params};
use tracing::{debug, warn};

use crate::core::{
    DeviceInfo, GeoInfo, ProfileId, ProfileVisit, Timestamp, VisitEnricher, VisitEnrichment,
    VisitId, VisitRequest,
};

use super::{DeleteMode, DeletedFilter, Store, StoreError, binding};

impl Store {
    /// Record one qualifying view of a public profile.
    ///
    /// Returns `None` without writing when the profile is missing, deleted,
    /// or not public. Enrichment failures are swallowed and logged: the visit
    /// is stored with whatever the enricher managed to produce.
    pub fn record_visit(
        &mut self,
        profile_id: ProfileId,
        request: &VisitRequest,
        enricher: &dyn VisitEnricher,
    ) -> Result<Option<ProfileVisit>, StoreError> {
        let tx = self.tx()?;

        let Some(profile) = binding::get_profile(&tx, profile_id, DeletedFilter::ExcludeDeleted)?
        else {
            debug!(%profile_id, "visit dropped: no live profile");
            return Ok(None);
        };
        if !profile.fields.is_public {
            debug!(%profile_id, "visit dropped: profile not public");
            return Ok(None);
        }

        let enrichment = match enricher.enrich(request) {
            Ok(enrichment) => enrichment,
            Err(e) => {
                warn!(%profile_id, error = %e, "visit enrichment failed, storing bare visit");
                VisitEnrichment::default()
            }
        };

        let device_json = serde_json::to_string(&enrichment.device)?;
        tx.execute(
            "INSERT INTO visits (profile_id, ip, user_agent, referer, country, city, device, \
                                 visited_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                profile_id.as_i64(),
                request.ip,
                request.user_agent,
                request.referer,
                enrichment.geo.country,
                enrichment.geo.city,
                device_json,
                Timestamp::now().as_millis(),
            ],
        )?;
        let id = VisitId(tx.last_insert_rowid());
        let visit = get_visit(&tx, id)?.ok_or(StoreError::RowDecode {
            table: "visits",
            detail: "inserted row missing".into(),
        })?;
        tx.commit()?;
        Ok(Some(visit))
    }

    pub fn visit_count(
        &self,
        profile_id: ProfileId,
        filter: DeletedFilter,
    ) -> Result<i64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM visits WHERE profile_id = ?1 AND {}",
            filter.clause()
        );
        let count: i64 = self
            .connection()
            .query_row(&sql, [profile_id.as_i64()], |row| row.get(0))?;
        Ok(count)
    }

    pub fn visits_for_profile(
        &self,
        profile_id: ProfileId,
        filter: DeletedFilter,
    ) -> Result<Vec<ProfileVisit>, StoreError> {
        let sql = format!(
            "SELECT id, profile_id, ip, user_agent, referer, country, city, device, \
                    visited_at_ms, deleted_at_ms
             FROM visits WHERE profile_id = ?1 AND {} ORDER BY id",
            filter.clause()
        );
        let conn = self.connection();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([profile_id.as_i64()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(visit_from_row(row)?);
        }
        Ok(out)
    }
}

/// Cascade helper: remove a profile's visits in the caller's transaction,
/// before the profile row itself goes.
pub(crate) fn delete_visits_for_profile(
    conn: &Connection,
    profile_id: ProfileId,
    mode: DeleteMode,
    now: Timestamp,
) -> Result<usize, StoreError> {
    let affected = match mode {
        DeleteMode::Soft => conn.execute(
            "UPDATE visits SET deleted_at_ms = ?1
             WHERE profile_id = ?2 AND deleted_at_ms IS NULL",
            params![now.as_millis(), profile_id.as_i64()],
        )?,
        DeleteMode::Hard => conn.execute(
            "DELETE FROM visits WHERE profile_id = ?1",
            [profile_id.as_i64()],
        )?,
    };
    Ok(affected)
}

fn get_visit(conn: &Connection, id: VisitId) -> Result<Option<ProfileVisit>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, profile_id, ip, user_agent, referer, country, city, device, \
                visited_at_ms, deleted_at_ms
         FROM visits WHERE id = ?1",
    )?;
    let mut rows = stmt.query([id.as_i64()])?;
    match rows.next()? {
        Some(row) => Ok(Some(visit_from_row(row)?)),
        None => Ok(None),
    }
}

fn visit_from_row(row: &rusqlite::Row<'_>) -> Result<ProfileVisit, StoreError> {
    let device_raw: String = row.get(7)?;
    let device: DeviceInfo = serde_json::from_str(&device_raw)?;

    Ok(ProfileVisit {
        id: VisitId(row.get(0)?),
        profile_id: ProfileId(row.get(1)?),
        request: VisitRequest {
            ip: row.get(2)?,
            user_agent: row.get(3)?,
            referer: row.get(4)?,
        },
        geo: GeoInfo {
            country: row.get(5)?,
            city: row.get(6)?,
        },
        device,
        visited_at: Timestamp(row.get(8)?),
        deleted_at: row.get::<_, Option<i64>>(9)?.map(Timestamp),
    })
}
