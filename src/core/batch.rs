//! Layer 3: Code batches.
//!
//! A batch is an administrative grouping of codes minted together with a
//! shared prefix. Membership is the weak `batch_id` edge on the code; the
//! batch's `count` is a cached value recomputed from membership, never
//! maintained incrementally.

use serde::{Deserialize, Serialize};

use super::error::{CoreError, InvalidId};
use super::identity::{BatchId, CodeString, UserId};
use super::time::Timestamp;

pub const PREFIX_MAX_LEN: usize = 8;

/// Width of the numeric tail in generated code strings: `AB` + 1 -> `AB0001`.
/// Sequences past 9999 simply widen.
const SEQUENCE_PAD: usize = 4;

/// Batch prefix - 1..=8 uppercase alphanumeric characters.
///
/// Canonicalized to uppercase like the code strings it prefixes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchPrefix(String);

impl BatchPrefix {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.is_empty() {
            return Err(InvalidId::BatchPrefix {
                raw: s.to_string(),
                reason: "empty".into(),
            }
            .into());
        }
        if s.len() > PREFIX_MAX_LEN {
            return Err(InvalidId::BatchPrefix {
                raw: s.to_string(),
                reason: format!("longer than {PREFIX_MAX_LEN} characters"),
            }
            .into());
        }
        let canonical = s.to_ascii_uppercase();
        if !canonical.bytes().all(|c| c.is_ascii_alphanumeric()) {
            return Err(InvalidId::BatchPrefix {
                raw: s.to_string(),
                reason: "contains non-alphanumeric character".into(),
            }
            .into());
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Code string for sequence member `n` of this batch.
    pub fn sequence_code(&self, n: u32) -> CodeString {
        let token = format!("{}{:0pad$}", self.0, n, pad = SEQUENCE_PAD);
        CodeString::parse(&token).expect("prefix and digits are valid code characters")
    }

    /// Extract the numeric tail of `code` if it belongs to this prefix's
    /// sequence. Used to continue generation past existing members.
    pub fn sequence_of(&self, code: &CodeString) -> Option<u32> {
        let tail = code.as_str().strip_prefix(self.0.as_str())?;
        if tail.is_empty() || !tail.bytes().all(|c| c.is_ascii_digit()) {
            return None;
        }
        tail.parse().ok()
    }
}

impl std::fmt::Debug for BatchPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BatchPrefix({:?})", self.0)
    }
}

impl std::fmt::Display for BatchPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A code batch row.
///
/// `count` is the cached active-member count; [`crate::store`] recomputes it
/// after every membership mutation and the reconciliation sweep corrects any
/// drift.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBatch {
    pub id: BatchId,
    pub name: String,
    pub prefix: BatchPrefix,
    pub count: i64,
    pub created_by: UserId,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_canonicalizes_and_validates() {
        assert_eq!(BatchPrefix::parse("ab").unwrap().as_str(), "AB");
        assert!(BatchPrefix::parse("").is_err());
        assert!(BatchPrefix::parse("TOOLONGXX").is_err());
        assert!(BatchPrefix::parse("A-B").is_err());
    }

    #[test]
    fn sequence_codes_are_zero_padded() {
        let prefix = BatchPrefix::parse("AB").unwrap();
        assert_eq!(prefix.sequence_code(1).as_str(), "AB0001");
        assert_eq!(prefix.sequence_code(9999).as_str(), "AB9999");
        assert_eq!(prefix.sequence_code(10000).as_str(), "AB10000");
    }

    #[test]
    fn sequence_of_inverts_generation() {
        let prefix = BatchPrefix::parse("AB").unwrap();
        let code = prefix.sequence_code(42);
        assert_eq!(prefix.sequence_of(&code), Some(42));

        let other = CodeString::parse("CD0001").unwrap();
        assert_eq!(prefix.sequence_of(&other), None);

        // Prefix match with a non-numeric tail is not a sequence member.
        let mixed = CodeString::parse("ABX001").unwrap();
        assert_eq!(prefix.sequence_of(&mixed), None);
    }
}
