//! Layer 2: The resolve code.
//!
//! State machine (ground truth is code + profile together, not the status
//! column alone):
//!
//! ```text
//! [available] --(profile created for this code)--> [assigned+bound]
//! [assigned+bound] --(profile deleted)--> [available]
//! [assigned+bound] --(code deleted)--> [gone]    (profile+visits cascade first)
//! [assigned, no profile] (orphan) --(detected on read)--> [available]
//! [available] --(code deleted)--> [gone]
//! ```

use serde::{Deserialize, Serialize};

use super::identity::{BatchId, CodeId, CodeString, UserId};
use super::time::Timestamp;

/// Availability of a resolve code.
///
/// Invariant: `Assigned` iff `user_id` is set. A code claiming `Assigned`
/// with no live profile is an orphan and gets repaired on the next read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeStatus {
    Available,
    Assigned,
}

impl CodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CodeStatus::Available => "available",
            CodeStatus::Assigned => "assigned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "available" => Some(CodeStatus::Available),
            "assigned" => Some(CodeStatus::Assigned),
            _ => None,
        }
    }
}

/// A resolve code row.
///
/// `batch_id` is a weak reference: the batch may have been deleted out from
/// under it, in which case the code reads as unbatched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveCode {
    pub id: CodeId,
    pub code: CodeString,
    pub status: CodeStatus,
    /// Free-form tag, e.g. "profile".
    pub kind: String,
    pub user_id: Option<UserId>,
    pub batch_id: Option<BatchId>,
    pub assigned_at: Option<Timestamp>,
    /// Set once, when an admin copies the token to a physical card.
    pub copied_at: Option<Timestamp>,
    pub created_by: UserId,
    pub created_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl ResolveCode {
    pub fn is_assigned(&self) -> bool {
        self.status == CodeStatus::Assigned && self.user_id.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The status column and owner column must move together.
    pub fn status_consistent(&self) -> bool {
        (self.status == CodeStatus::Assigned) == self.user_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: CodeStatus, user: Option<&str>) -> ResolveCode {
        ResolveCode {
            id: CodeId(1),
            code: CodeString::parse("AB0001").unwrap(),
            status,
            kind: "profile".into(),
            user_id: user.map(|u| UserId::new(u).unwrap()),
            batch_id: None,
            assigned_at: None,
            copied_at: None,
            created_by: UserId::new("admin").unwrap(),
            created_at: Timestamp(0),
            deleted_at: None,
        }
    }

    #[test]
    fn assigned_requires_owner() {
        assert!(sample(CodeStatus::Assigned, Some("u1")).is_assigned());
        assert!(!sample(CodeStatus::Assigned, None).is_assigned());
        assert!(!sample(CodeStatus::Available, None).is_assigned());
    }

    #[test]
    fn consistency_tracks_both_columns() {
        assert!(sample(CodeStatus::Assigned, Some("u1")).status_consistent());
        assert!(sample(CodeStatus::Available, None).status_consistent());
        assert!(!sample(CodeStatus::Assigned, None).status_consistent());
        assert!(!sample(CodeStatus::Available, Some("u1")).status_consistent());
    }
}
