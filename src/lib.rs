#![cfg_attr(not(test), forbid(unsafe_code))]
#![cfg_attr(test, deny(unsafe_code))]

//! Resolve-code identity platform core.
//!
//! Physical NFC/QR codes ("resolve codes") resolve to public user profiles.
//! Admins mint codes singly or in prefixed batches; an end user claims a code
//! by creating a profile against it; views of public profiles are recorded
//! for analytics.
//!
//! The interesting part is the code lifecycle and its consistency rules
//! across the four linked entities (code, batch, profile, visit): the
//! availability state machine, the ordered cascade delete, and the
//! self-healing repair of orphaned assignments discovered at read time. See
//! [`Store::delete_code`] for the cascade protocol and [`resolve`] for the
//! read-path decision function.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod paths;
pub mod reconcile;
pub mod resolve;
pub mod store;
pub mod telemetry;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    BatchId, BatchPrefix, CodeBatch, CodeId, CodeStatus, CodeString, CoreError, CustomLink,
    DeviceInfo, GeoInfo, NoEnrichment, Profile, ProfileFields, ProfileId, ProfileVisit,
    ResolveCode, ServiceEntry, Slug, Timestamp, UserId, VisitEnricher, VisitEnrichment, VisitId,
    VisitRequest,
};
pub use crate::reconcile::{ReconcileReport, Scheduler};
pub use crate::resolve::{AuthState, Resolution};
pub use crate::store::{
    BatchCounts, CascadeOutcome, DeleteMode, DeletedFilter, Store, StoreError,
};
