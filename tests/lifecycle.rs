//! Code/batch/profile lifecycle: counts, cascades, and invariants.

mod fixtures;

use fixtures::{TestStore, admin, code, fields, prefix, user};

use taplink::core::{CodeStatus, NoEnrichment, VisitRequest};
use taplink::store::{DeleteMode, DeletedFilter, StoreError};

#[test]
fn batch_count_tracks_code_creation() {
    let mut ts = TestStore::new();
    let batch = ts
        .store
        .create_batch("spring run", &prefix("AB"), &admin())
        .unwrap();
    assert_eq!(batch.count, 0);

    ts.store
        .create_code(&code("AB0001"), "profile", Some(batch.id), &admin())
        .unwrap();

    let batch = ts.store.get_batch(batch.id).unwrap().unwrap();
    assert_eq!(batch.count, 1);
    assert_eq!(ts.store.active_count(batch.id).unwrap(), 1);
}

#[test]
fn claim_assigns_code_at_profile_persist() {
    let mut ts = TestStore::new();
    let batch = ts
        .store
        .create_batch("b", &prefix("AB"), &admin())
        .unwrap();
    ts.store
        .create_code(&code("AB0001"), "profile", Some(batch.id), &admin())
        .unwrap();

    let claimer = user("u-1");
    let profile = ts
        .store
        .create_profile(&code("AB0001"), &claimer, &fields("John", "Smith"))
        .unwrap();
    assert_eq!(profile.slug.as_str(), "john-smith");

    let row = ts
        .store
        .get_code(&code("AB0001"), DeletedFilter::ExcludeDeleted)
        .unwrap()
        .unwrap();
    assert_eq!(row.status, CodeStatus::Assigned);
    assert_eq!(row.user_id, Some(claimer));
    assert!(row.assigned_at.is_some());
    assert!(row.status_consistent());

    // Assignment does not change batch membership.
    assert_eq!(ts.store.get_batch(batch.id).unwrap().unwrap().count, 1);
}

#[test]
fn soft_delete_cascades_profile_visits_and_detaches() {
    let mut ts = TestStore::new();
    let batch = ts
        .store
        .create_batch("b", &prefix("AB"), &admin())
        .unwrap();
    ts.store
        .create_code(&code("AB0001"), "profile", Some(batch.id), &admin())
        .unwrap();
    let profile = ts
        .store
        .create_profile(&code("AB0001"), &user("u-1"), &fields("John", "Smith"))
        .unwrap();

    for _ in 0..3 {
        ts.store
            .record_visit(profile.id, &VisitRequest::default(), &NoEnrichment)
            .unwrap()
            .unwrap();
    }
    assert_eq!(
        ts.store
            .visit_count(profile.id, DeletedFilter::ExcludeDeleted)
            .unwrap(),
        3
    );

    let outcome = ts.store.delete_code(&code("AB0001"), DeleteMode::Soft).unwrap();
    assert_eq!(outcome.profile_deleted, Some(profile.id));
    assert_eq!(outcome.visits_removed, 3);
    assert_eq!(outcome.detached_from, Some(batch.id));

    // Profile and visits are gone from the default view, present as deleted.
    assert!(
        ts.store
            .get_profile(profile.id, DeletedFilter::ExcludeDeleted)
            .unwrap()
            .is_none()
    );
    assert!(
        ts.store
            .get_profile(profile.id, DeletedFilter::OnlyDeleted)
            .unwrap()
            .is_some()
    );
    assert_eq!(
        ts.store
            .visit_count(profile.id, DeletedFilter::ExcludeDeleted)
            .unwrap(),
        0
    );
    assert_eq!(
        ts.store
            .visit_count(profile.id, DeletedFilter::OnlyDeleted)
            .unwrap(),
        3
    );

    // The code is detached and no longer counted.
    let row = ts
        .store
        .get_code(&code("AB0001"), DeletedFilter::OnlyDeleted)
        .unwrap()
        .unwrap();
    assert!(row.batch_id.is_none());
    assert_eq!(ts.store.get_batch(batch.id).unwrap().unwrap().count, 0);
}

#[test]
fn hard_delete_removes_rows_permanently() {
    let mut ts = TestStore::new();
    ts.store
        .create_code(&code("ZZ0001"), "profile", None, &admin())
        .unwrap();
    let profile = ts
        .store
        .create_profile(&code("ZZ0001"), &user("u-1"), &fields("Ada", "Lovelace"))
        .unwrap();
    ts.store
        .record_visit(profile.id, &VisitRequest::default(), &NoEnrichment)
        .unwrap()
        .unwrap();

    ts.store.delete_code(&code("ZZ0001"), DeleteMode::Hard).unwrap();

    assert!(
        ts.store
            .get_code(&code("ZZ0001"), DeletedFilter::IncludeDeleted)
            .unwrap()
            .is_none()
    );
    assert!(
        ts.store
            .get_profile(profile.id, DeletedFilter::IncludeDeleted)
            .unwrap()
            .is_none()
    );
    assert_eq!(
        ts.store
            .visit_count(profile.id, DeletedFilter::IncludeDeleted)
            .unwrap(),
        0
    );
}

#[test]
fn code_uniqueness_is_global_and_permanent() {
    let mut ts = TestStore::new();
    ts.store
        .create_code(&code("AB0001"), "profile", None, &admin())
        .unwrap();
    ts.store.delete_code(&code("AB0001"), DeleteMode::Soft).unwrap();

    let err = ts
        .store
        .create_code(&code("AB0001"), "profile", None, &admin())
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateCode { .. }));
}

#[test]
fn mark_copied_keeps_first_timestamp() {
    let mut ts = TestStore::new();
    ts.store
        .create_code(&code("AB0001"), "profile", None, &admin())
        .unwrap();

    let first = ts.store.mark_copied(&code("AB0001")).unwrap();
    let stamp = first.copied_at.expect("copied_at set");

    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = ts.store.mark_copied(&code("AB0001")).unwrap();
    assert_eq!(second.copied_at, Some(stamp));
}

#[test]
fn bulk_generation_continues_the_sequence() {
    let mut ts = TestStore::new();
    let batch = ts
        .store
        .create_batch("b", &prefix("AB"), &admin())
        .unwrap();

    let first = ts
        .store
        .create_batch_codes(batch.id, 3, "profile", &admin())
        .unwrap();
    let strings: Vec<_> = first.iter().map(|c| c.code.as_str().to_string()).collect();
    assert_eq!(strings, ["AB0001", "AB0002", "AB0003"]);

    // A soft-deleted member still occupies its slot.
    ts.store.delete_code(&code("AB0003"), DeleteMode::Soft).unwrap();

    let more = ts
        .store
        .create_batch_codes(batch.id, 2, "profile", &admin())
        .unwrap();
    let strings: Vec<_> = more.iter().map(|c| c.code.as_str().to_string()).collect();
    assert_eq!(strings, ["AB0004", "AB0005"]);

    assert_eq!(ts.store.get_batch(batch.id).unwrap().unwrap().count, 4);
}

#[test]
fn bulk_generation_rejects_bad_quantity() {
    let mut ts = TestStore::new();
    let batch = ts
        .store
        .create_batch("b", &prefix("AB"), &admin())
        .unwrap();
    assert!(ts.store.create_batch_codes(batch.id, 0, "profile", &admin()).is_err());
}

#[test]
fn creating_into_missing_batch_fails() {
    let mut ts = TestStore::new();
    let err = ts
        .store
        .create_code(
            &code("AB0001"),
            "profile",
            Some(taplink::core::BatchId(999)),
            &admin(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::BatchNotFound { .. }));
}

#[test]
fn batch_delete_keeps_codes_and_reconcile_detaches() {
    let mut ts = TestStore::new();
    let batch = ts
        .store
        .create_batch("b", &prefix("AB"), &admin())
        .unwrap();
    ts.store
        .create_code(&code("AB0001"), "profile", Some(batch.id), &admin())
        .unwrap();

    ts.store.delete_batch(batch.id).unwrap();

    // The code survives with a dangling reference until the sweep runs.
    let row = ts
        .store
        .get_code(&code("AB0001"), DeletedFilter::ExcludeDeleted)
        .unwrap()
        .unwrap();
    assert_eq!(row.batch_id, Some(batch.id));

    let report = ts.store.reconcile_batches().unwrap();
    assert_eq!(report.dangling_detached, 1);

    let row = ts
        .store
        .get_code(&code("AB0001"), DeletedFilter::ExcludeDeleted)
        .unwrap()
        .unwrap();
    assert!(row.batch_id.is_none());
}

#[test]
fn reconcile_corrects_count_drift() {
    let mut ts = TestStore::new();
    let batch = ts
        .store
        .create_batch("b", &prefix("AB"), &admin())
        .unwrap();
    ts.store
        .create_code(&code("AB0001"), "profile", Some(batch.id), &admin())
        .unwrap();

    // Simulate a code path that forgot to recompute.
    ts.store
        .connection()
        .execute("UPDATE batches SET cached_count = 42 WHERE id = ?1", [batch.id.as_i64()])
        .unwrap();
    assert!(
        ts.store
            .list_batches()
            .unwrap()
            .iter()
            .any(taplink::store::BatchCounts::is_drifted)
    );

    let report = ts.store.reconcile_batches().unwrap();
    assert_eq!(report.batches_checked, 1);
    assert_eq!(report.drift_corrected, 1);

    let batch = ts.store.get_batch(batch.id).unwrap().unwrap();
    assert_eq!(batch.count, 1);
}

#[test]
fn profile_delete_releases_code_for_reclaim() {
    let mut ts = TestStore::new();
    ts.store
        .create_code(&code("AB0001"), "profile", None, &admin())
        .unwrap();
    let profile = ts
        .store
        .create_profile(&code("AB0001"), &user("u-1"), &fields("John", "Smith"))
        .unwrap();

    ts.store.delete_profile(profile.id, DeleteMode::Soft).unwrap();

    let row = ts
        .store
        .get_code(&code("AB0001"), DeletedFilter::ExcludeDeleted)
        .unwrap()
        .unwrap();
    assert_eq!(row.status, CodeStatus::Available);
    assert!(row.user_id.is_none());
    assert!(row.assigned_at.is_none());
    assert!(row.status_consistent());

    // Claimable by someone else; the soft-deleted row still holds its slug.
    let second = ts
        .store
        .create_profile(&code("AB0001"), &user("u-2"), &fields("John", "Smith"))
        .unwrap();
    assert_eq!(second.slug.as_str(), "john-smith1");
}

#[test]
fn purging_old_profile_row_leaves_reclaimed_code_bound() {
    let mut ts = TestStore::new();
    ts.store
        .create_code(&code("AB0001"), "profile", None, &admin())
        .unwrap();
    let first = ts
        .store
        .create_profile(&code("AB0001"), &user("u-1"), &fields("John", "Smith"))
        .unwrap();
    ts.store.delete_profile(first.id, DeleteMode::Soft).unwrap();
    let second = ts
        .store
        .create_profile(&code("AB0001"), &user("u-2"), &fields("Jane", "Doe"))
        .unwrap();

    // Purge the historical row left by the first claim. The code's live
    // binding is the second profile and must stay assigned.
    ts.store.delete_profile(first.id, DeleteMode::Hard).unwrap();

    let row = ts
        .store
        .get_code(&code("AB0001"), DeletedFilter::ExcludeDeleted)
        .unwrap()
        .unwrap();
    assert_eq!(row.status, CodeStatus::Assigned);
    assert_eq!(row.user_id, Some(user("u-2")));
    assert!(
        ts.store
            .get_profile(second.id, DeletedFilter::ExcludeDeleted)
            .unwrap()
            .is_some()
    );

    // Still bound: a third claim is rejected cleanly.
    let err = ts
        .store
        .create_profile(&code("AB0001"), &user("u-3"), &fields("Eve", "Jones"))
        .unwrap_err();
    assert!(matches!(err, StoreError::CodeAlreadyAssigned { .. }));
}

#[test]
fn hard_delete_code_purges_historical_profile_rows() {
    let mut ts = TestStore::new();
    ts.store
        .create_code(&code("AB0001"), "profile", None, &admin())
        .unwrap();
    let first = ts
        .store
        .create_profile(&code("AB0001"), &user("u-1"), &fields("John", "Smith"))
        .unwrap();
    ts.store
        .record_visit(first.id, &VisitRequest::default(), &NoEnrichment)
        .unwrap()
        .unwrap();
    ts.store.delete_profile(first.id, DeleteMode::Soft).unwrap();
    let second = ts
        .store
        .create_profile(&code("AB0001"), &user("u-2"), &fields("Jane", "Doe"))
        .unwrap();
    ts.store
        .record_visit(second.id, &VisitRequest::default(), &NoEnrichment)
        .unwrap()
        .unwrap();

    // Hard delete must sweep the soft-deleted historical row too, or the
    // code row's removal would violate the profile foreign key.
    let outcome = ts.store.delete_code(&code("AB0001"), DeleteMode::Hard).unwrap();
    assert_eq!(outcome.profile_deleted, Some(second.id));
    assert_eq!(outcome.visits_removed, 2);

    assert!(
        ts.store
            .get_code(&code("AB0001"), DeletedFilter::IncludeDeleted)
            .unwrap()
            .is_none()
    );
    for id in [first.id, second.id] {
        assert!(
            ts.store
                .get_profile(id, DeletedFilter::IncludeDeleted)
                .unwrap()
                .is_none()
        );
        assert_eq!(
            ts.store
                .visit_count(id, DeletedFilter::IncludeDeleted)
                .unwrap(),
            0
        );
    }
}

#[test]
fn update_regenerates_slug_only_on_name_change() {
    let mut ts = TestStore::new();
    ts.store
        .create_code(&code("AB0001"), "profile", None, &admin())
        .unwrap();
    let profile = ts
        .store
        .create_profile(&code("AB0001"), &user("u-1"), &fields("John", "Smith"))
        .unwrap();

    // Bio-only change keeps the slug.
    let mut updated_fields = profile.fields.clone();
    updated_fields.bio = Some("hello".into());
    let updated = ts.store.update_profile(profile.id, &updated_fields).unwrap();
    assert_eq!(updated.slug.as_str(), "john-smith");

    // Name change regenerates, excluding the profile's own row.
    let mut renamed = updated.fields.clone();
    renamed.last_name = "Smythe".into();
    let renamed_profile = ts.store.update_profile(profile.id, &renamed).unwrap();
    assert_eq!(renamed_profile.slug.as_str(), "john-smythe");

    // Renaming back reclaims the original slug: the old row is its own.
    let mut back = renamed_profile.fields.clone();
    back.last_name = "Smith".into();
    let back_profile = ts.store.update_profile(profile.id, &back).unwrap();
    assert_eq!(back_profile.slug.as_str(), "john-smith");
}

#[test]
fn visits_skip_private_and_missing_profiles() {
    let mut ts = TestStore::new();
    ts.store
        .create_code(&code("AB0001"), "profile", None, &admin())
        .unwrap();
    let mut private = fields("Jane", "Doe");
    private.is_public = false;
    let profile = ts
        .store
        .create_profile(&code("AB0001"), &user("u-1"), &private)
        .unwrap();

    let recorded = ts
        .store
        .record_visit(profile.id, &VisitRequest::default(), &NoEnrichment)
        .unwrap();
    assert!(recorded.is_none());

    let missing = ts
        .store
        .record_visit(taplink::core::ProfileId(999), &VisitRequest::default(), &NoEnrichment)
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn failing_enrichment_never_blocks_the_visit() {
    use taplink::core::{EnrichError, VisitEnricher, VisitEnrichment};

    struct Failing;
    impl VisitEnricher for Failing {
        fn enrich(&self, _: &VisitRequest) -> Result<VisitEnrichment, EnrichError> {
            Err(EnrichError("geo provider down".into()))
        }
    }

    let mut ts = TestStore::new();
    ts.store
        .create_code(&code("AB0001"), "profile", None, &admin())
        .unwrap();
    let profile = ts
        .store
        .create_profile(&code("AB0001"), &user("u-1"), &fields("Jane", "Doe"))
        .unwrap();

    let visit = ts
        .store
        .record_visit(
            profile.id,
            &VisitRequest {
                ip: Some("203.0.113.9".into()),
                user_agent: Some("test-agent".into()),
                referer: None,
            },
            &Failing,
        )
        .unwrap()
        .expect("visit stored despite enrichment failure");

    assert_eq!(visit.request.ip.as_deref(), Some("203.0.113.9"));
    assert!(visit.geo.country.is_none());
    assert!(visit.device.device_type.is_none());
}
