//! Core capability errors (parsing and validation).
//!
//! These are bounded and stable: core errors represent domain/refusal states,
//! not library implementation details.

use thiserror::Error;

use crate::error::{Effect, Transience};

/// Invalid identifier string.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("resolve code `{raw}` is invalid: {reason}")]
    Code { raw: String, reason: String },
    #[error("slug `{raw}` is invalid: {reason}")]
    Slug { raw: String, reason: String },
    #[error("user id `{raw}` is invalid: {reason}")]
    User { raw: String, reason: String },
    #[error("batch prefix `{raw}` is invalid: {reason}")]
    BatchPrefix { raw: String, reason: String },
}

/// Profile fields that cannot produce a slug.
#[derive(Debug, Error, Clone)]
#[error("profile name is empty: a first or last name is required")]
pub struct EmptyProfileName;

/// Bulk generation quantity out of range.
#[derive(Debug, Error, Clone)]
#[error("batch quantity {got} out of range 1..={max}")]
pub struct InvalidQuantity {
    pub got: u32,
    pub max: u32,
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    EmptyProfileName(#[from] EmptyProfileName),
    #[error(transparent)]
    InvalidQuantity(#[from] InvalidQuantity),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure domain/input failures.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
