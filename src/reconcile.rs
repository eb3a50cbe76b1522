//! Batch-count reconciliation.
//!
//! Every membership mutation recomputes its batch's cached count in-line, but
//! a scheduled sweep re-verifies all of them anyway: it is the guard against
//! any code path that forgot. The sweep also detaches codes whose `batch_id`
//! points at a batch that no longer exists (batch deletion is non-cascading,
//! so these dangle by design and read as unbatched until detached here).
//!
//! The sweep only recomputes derived counts; it never alters code, profile,
//! or visit rows beyond nulling dangling batch references, so it cannot race
//! the cascade protocol into a corrupt state - at worst a count is stale
//! until the next run.

use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};
use rusqlite::params;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::BatchId;
use crate::store::{Store, StoreError};

/// What one sweep found and fixed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub batches_checked: usize,
    pub drift_corrected: usize,
    pub dangling_detached: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.drift_corrected == 0 && self.dangling_detached == 0
    }
}

impl Store {
    /// One reconciliation pass over all batches, in one transaction.
    pub fn reconcile_batches(&mut self) -> Result<ReconcileReport, StoreError> {
        let tx = self.tx()?;
        let mut report = ReconcileReport::default();

        {
            let mut stmt = tx.prepare("SELECT id, cached_count FROM batches ORDER BY id")?;
            let mut rows = stmt.query(params![])?;
            while let Some(row) = rows.next()? {
                let id = BatchId(row.get(0)?);
                let cached: i64 = row.get(1)?;
                report.batches_checked += 1;

                let live = crate::store::batches::active_count(&tx, id)?;
                if cached != live {
                    warn!(batch = %id, cached, live, "batch count drift, correcting");
                    crate::store::batches::recompute_count(&tx, id)?;
                    report.drift_corrected += 1;
                }
            }
        }

        // Dangling references left by non-cascading batch deletion.
        report.dangling_detached = tx.execute(
            "UPDATE codes SET batch_id = NULL
             WHERE batch_id IS NOT NULL
               AND batch_id NOT IN (SELECT id FROM batches)",
            params![],
        )?;

        tx.commit()?;
        if report.is_clean() {
            info!(batches = report.batches_checked, "reconcile: no drift");
        } else {
            info!(
                batches = report.batches_checked,
                drift = report.drift_corrected,
                dangling = report.dangling_detached,
                "reconcile: corrected"
            );
        }
        Ok(report)
    }
}

/// Background reconciliation on a fixed interval (daily in production).
///
/// Owns its own store connection; the foreground connection is untouched.
pub struct Scheduler {
    handle: Option<JoinHandle<()>>,
    shutdown: Sender<()>,
}

impl Scheduler {
    pub fn start(db_path: PathBuf, interval: Duration) -> Self {
        let (shutdown, shutdown_rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("taplink-reconcile".into())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => match Store::open(&db_path) {
                            Ok(mut store) => {
                                if let Err(e) = store.reconcile_batches() {
                                    error!(error = %e, "scheduled reconcile failed");
                                }
                            }
                            Err(e) => error!(error = %e, "scheduled reconcile: store open failed"),
                        },
                        recv(shutdown_rx) -> _ => break,
                    }
                }
            })
            .expect("spawn reconcile thread");

        Self {
            handle: Some(handle),
            shutdown,
        }
    }

    pub fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
