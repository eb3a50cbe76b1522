//! Layer 6: Profile visits.
//!
//! Append-only view records. Geo/device enrichment is a best-effort
//! collaborator behind [`VisitEnricher`]: a failing enricher degrades the
//! record, never the request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::identity::{ProfileId, VisitId};
use super::time::Timestamp;

/// Raw request facts captured by the hosting HTTP layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VisitRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

/// Coarse geolocation derived from the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GeoInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// Structured device classification derived from the user agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
}

/// What an enricher adds to a raw request.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct VisitEnrichment {
    pub geo: GeoInfo,
    pub device: DeviceInfo,
}

/// Enrichment failure. Opaque on purpose: callers log it and move on.
#[derive(Debug, Error, Clone)]
#[error("visit enrichment failed: {0}")]
pub struct EnrichError(pub String);

/// Best-effort geo/device collaborator.
///
/// Implementations must not block the request path on network calls; the
/// store swallows and logs any error from here.
pub trait VisitEnricher {
    fn enrich(&self, request: &VisitRequest) -> Result<VisitEnrichment, EnrichError>;
}

/// Enricher that adds nothing. Default for deployments without a geo/device
/// pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEnrichment;

impl VisitEnricher for NoEnrichment {
    fn enrich(&self, _request: &VisitRequest) -> Result<VisitEnrichment, EnrichError> {
        Ok(VisitEnrichment::default())
    }
}

/// A recorded profile view. Never updated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileVisit {
    pub id: VisitId,
    pub profile_id: ProfileId,
    pub request: VisitRequest,
    pub geo: GeoInfo,
    pub device: DeviceInfo,
    pub visited_at: Timestamp,
    /// Set only by the soft cascade when the owning profile is soft-deleted.
    pub deleted_at: Option<Timestamp>,
}
