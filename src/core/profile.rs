//! Layer 5: The profile.
//!
//! A profile is the public page a resolve code points at. Its existence is
//! the ground truth for the owning code's `assigned` status: every operation
//! must leave code and profile mutually consistent at rest.

use serde::{Deserialize, Serialize};

use super::error::{CoreError, EmptyProfileName};
use super::identity::{CodeId, ProfileId, Slug, UserId};
use super::time::Timestamp;

/// One entry in the structured services list ("what I offer").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One entry in the structured custom-links list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomLink {
    pub title: String,
    pub url: String,
}

/// Mutable display fields of a profile.
///
/// The slug is not here: it is derived from the name by the store whenever
/// the name changes, so callers cannot set it directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProfileFields {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub custom_links: Vec<CustomLink>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

impl ProfileFields {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            is_public: true,
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> String {
        let mut name = self.first_name.trim().to_string();
        let last = self.last_name.trim();
        if !last.is_empty() {
            if !name.is_empty() {
                name.push(' ');
            }
            name.push_str(last);
        }
        name
    }

    /// Pre-save validation: a profile must be able to produce a slug.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.first_name.trim().is_empty() && self.last_name.trim().is_empty() {
            return Err(EmptyProfileName.into());
        }
        Ok(())
    }

    /// Whether a name change between `self` and `other` forces slug
    /// regeneration.
    pub fn name_differs(&self, other: &ProfileFields) -> bool {
        self.first_name != other.first_name || self.last_name != other.last_name
    }
}

/// A profile row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub user_id: UserId,
    /// One-to-one edge to the owning resolve code.
    pub code_id: CodeId,
    pub slug: Slug,
    pub fields: ProfileFields,
    pub created_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Profile {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_joins_parts() {
        assert_eq!(ProfileFields::new("John", "Smith").display_name(), "John Smith");
        assert_eq!(ProfileFields::new("Prince", "").display_name(), "Prince");
        assert_eq!(ProfileFields::new("", "Sting").display_name(), "Sting");
    }

    #[test]
    fn validate_requires_some_name() {
        assert!(ProfileFields::new("", "").validate().is_err());
        assert!(ProfileFields::new("  ", " ").validate().is_err());
        assert!(ProfileFields::new("John", "").validate().is_ok());
    }

    #[test]
    fn name_differs_ignores_other_fields() {
        let a = ProfileFields::new("John", "Smith");
        let mut b = a.clone();
        b.bio = Some("hello".into());
        assert!(!a.name_differs(&b));
        b.last_name = "Smythe".into();
        assert!(a.name_differs(&b));
    }
}
