//! Layer 1: Identity atoms.
//!
//! CodeString: the printed token on a physical NFC/QR code
//! Slug: URL-safe profile handle
//! UserId: external principal identity
//! Row ids: CodeId / BatchId / ProfileId / VisitId

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{CoreError, InvalidId};

/// Alphabet accepted in resolve codes. Canonical form is uppercase.
const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Alphabet used when generating code strings. Drops 0/O/1/I so a token
/// printed on a physical card cannot be misread.
const CODE_GEN_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

pub const CODE_MAX_LEN: usize = 32;

/// Resolve-code token - uppercase alphanumeric, 1..=32 chars.
///
/// Parsing canonicalizes to uppercase so `ab0001` and `AB0001` name the same
/// physical code.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeString(String);

impl CodeString {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.is_empty() {
            return Err(InvalidId::Code {
                raw: s.to_string(),
                reason: "empty".into(),
            }
            .into());
        }
        if s.len() > CODE_MAX_LEN {
            return Err(InvalidId::Code {
                raw: s.to_string(),
                reason: format!("longer than {CODE_MAX_LEN} characters"),
            }
            .into());
        }
        let canonical = s.to_ascii_uppercase();
        for c in canonical.bytes() {
            if !CODE_ALPHABET.contains(&c) {
                return Err(InvalidId::Code {
                    raw: s.to_string(),
                    reason: "contains non-alphanumeric character".into(),
                }
                .into());
            }
        }
        Ok(Self(canonical))
    }

    /// Generate a random code string of the given length.
    ///
    /// Used when an admin mints a single code without supplying a token.
    pub fn generate(len: usize) -> Self {
        use rand::Rng;
        assert!(len >= 4, "generated code must be >=4 chars");

        let mut rng = rand::rng();
        let token: String = (0..len)
            .map(|_| {
                let idx = rng.random_range(0..CODE_GEN_ALPHABET.len());
                CODE_GEN_ALPHABET[idx] as char
            })
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CodeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeString({:?})", self.0)
    }
}

impl fmt::Display for CodeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Profile slug - lowercase alphanumeric and hyphens, no edge hyphens.
///
/// Construction goes through [`Slug::parse`] or the slugifier in
/// [`crate::core::slug`]; both enforce the same shape.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.is_empty() {
            return Err(InvalidId::Slug {
                raw: s.to_string(),
                reason: "empty".into(),
            }
            .into());
        }
        if s.starts_with('-') || s.ends_with('-') {
            return Err(InvalidId::Slug {
                raw: s.to_string(),
                reason: "leading or trailing hyphen".into(),
            }
            .into());
        }
        for c in s.bytes() {
            if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'-') {
                return Err(InvalidId::Slug {
                    raw: s.to_string(),
                    reason: "contains character outside [a-z0-9-]".into(),
                }
                .into());
            }
        }
        Ok(Self(s.to_string()))
    }

    /// Append a decimal suffix for collision resolution. `john-smith` + 2 is
    /// `john-smith2`.
    pub fn with_suffix(&self, n: u32) -> Slug {
        Slug(format!("{}{n}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slug({:?})", self.0)
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External principal identifier - non-empty string.
///
/// The authentication collaborator names its principals. No validation beyond
/// non-empty.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            Err(InvalidId::User {
                raw: s,
                reason: "empty".into(),
            }
            .into())
        } else {
            Ok(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({:?})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! row_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Store row id of a resolve code.
    CodeId
);
row_id!(
    /// Store row id of a code batch.
    BatchId
);
row_id!(
    /// Store row id of a profile.
    ProfileId
);
row_id!(
    /// Store row id of a profile visit.
    VisitId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_string_canonicalizes_to_uppercase() {
        let code = CodeString::parse("ab0001").unwrap();
        assert_eq!(code.as_str(), "AB0001");
        assert_eq!(code, CodeString::parse("AB0001").unwrap());
    }

    #[test]
    fn code_string_rejects_symbols_and_empty() {
        assert!(CodeString::parse("").is_err());
        assert!(CodeString::parse("AB-01").is_err());
        assert!(CodeString::parse("AB 01").is_err());
        assert!(CodeString::parse(&"X".repeat(33)).is_err());
    }

    #[test]
    fn generated_code_parses_back() {
        let code = CodeString::generate(8);
        assert_eq!(code.as_str().len(), 8);
        assert_eq!(CodeString::parse(code.as_str()).unwrap(), code);
    }

    #[test]
    fn slug_rejects_bad_shapes() {
        assert!(Slug::parse("john-smith").is_ok());
        assert!(Slug::parse("-john").is_err());
        assert!(Slug::parse("john-").is_err());
        assert!(Slug::parse("John").is_err());
        assert!(Slug::parse("").is_err());
    }

    #[test]
    fn slug_suffix_appends_decimal() {
        let slug = Slug::parse("john-smith").unwrap();
        assert_eq!(slug.with_suffix(2).as_str(), "john-smith2");
    }

    #[test]
    fn user_id_rejects_empty() {
        assert!(UserId::new("").is_err());
        assert_eq!(UserId::new("u-1").unwrap().as_str(), "u-1");
    }
}
