//! Pure domain layer: entities, identities, and the code state machine.
//!
//! Layering (each module depends only on lower layers):
//! 0. `time` - wall-clock stamps
//! 1. `identity` - validated newtypes
//! 2. `code` - resolve code + status machine
//! 3. `batch` - batches and sequence generation
//! 4. `slug` - slug derivation
//! 5. `profile` - the public profile
//! 6. `visit` - view records + enrichment boundary

pub mod batch;
pub mod code;
pub mod error;
pub mod identity;
pub mod profile;
pub mod slug;
pub mod time;
pub mod visit;

pub use batch::{BatchPrefix, CodeBatch};
pub use code::{CodeStatus, ResolveCode};
pub use error::{CoreError, EmptyProfileName, InvalidId, InvalidQuantity};
pub use identity::{BatchId, CodeId, CodeString, ProfileId, Slug, UserId, VisitId};
pub use profile::{CustomLink, Profile, ProfileFields, ServiceEntry};
pub use time::Timestamp;
pub use visit::{
    DeviceInfo, EnrichError, GeoInfo, NoEnrichment, ProfileVisit, VisitEnricher, VisitEnrichment,
    VisitRequest,
};
