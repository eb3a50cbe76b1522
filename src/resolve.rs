//! The resolution algorithm: what should happen when someone scans a code.
//!
//! Pure decision over `(code string, authentication state)`, with one
//! side-effect: orphan repair, which runs in the same transaction before any
//! routing decision so a stale `assigned` status can never leak a dead link.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{CodeString, Slug, UserId};
use crate::store::{DeletedFilter, Store, StoreError};

/// Authentication state of the caller, as reported by the session
/// collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated(UserId),
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}

/// Terminal routing decision for a resolve lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Resolution {
    NotFound,
    RedirectToProfile { slug: Slug },
    /// Authenticated caller, available code: claim it by building a profile.
    RedirectToProfileCreation { code: CodeString },
    /// Anonymous caller, available code: register first. The registration
    /// flow must carry the code through to profile creation.
    RedirectToRegistration { code: CodeString },
}

impl Store {
    /// Resolve a raw code string to a routing decision.
    ///
    /// A string that cannot even parse as a code resolves to `NotFound`
    /// rather than an error: from the caller's side it is just a URL that
    /// matches nothing. Assignment never happens here - a code is claimed
    /// only when a profile is actually persisted against it.
    pub fn resolve(&mut self, raw: &str, auth: &AuthState) -> Result<Resolution, StoreError> {
        let Ok(code) = CodeString::parse(raw) else {
            debug!(raw, "resolve: unparseable code string");
            return Ok(Resolution::NotFound);
        };

        let tx = self.tx()?;
        let Some(code_row) = crate::store::codes::get_code(&tx, &code, DeletedFilter::ExcludeDeleted)?
        else {
            return Ok(Resolution::NotFound);
        };

        if code_row.is_assigned() {
            if let Some(profile) =
                crate::store::binding::get_profile_by_code(&tx, code_row.id, DeletedFilter::ExcludeDeleted)?
            {
                return Ok(Resolution::RedirectToProfile {
                    slug: profile.slug,
                });
            }
            // Orphan: repair inside this transaction, then route as available.
            crate::store::codes::fix_orphan(&tx, &code_row)?;
            tx.commit()?;
            return Ok(route_available(&code, auth));
        }

        drop(tx);
        Ok(route_available(&code, auth))
    }
}

fn route_available(code: &CodeString, auth: &AuthState) -> Resolution {
    match auth {
        AuthState::Authenticated(_) => Resolution::RedirectToProfileCreation { code: code.clone() },
        AuthState::Anonymous => Resolution::RedirectToRegistration { code: code.clone() },
    }
}
