//! Layer 4: Slug derivation.
//!
//! A slug is derived from the profile's display name: lowercase, non-alphanumeric
//! runs collapsed to single hyphens. Collision resolution (the numeric-suffix
//! probe) lives in the store, where uniqueness can actually be checked; this
//! module is the pure part.

use super::error::{CoreError, EmptyProfileName};
use super::identity::Slug;

/// Build the base slug for a profile name.
///
/// `slugify("John", "Smith")` is `john-smith`. Fails only when the name
/// contains no usable characters at all.
pub fn slugify(first_name: &str, last_name: &str) -> Result<Slug, CoreError> {
    let mut out = String::new();
    let mut pending_hyphen = false;

    for c in first_name.chars().chain(" ".chars()).chain(last_name.chars()) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    if out.is_empty() {
        return Err(EmptyProfileName.into());
    }

    Ok(Slug::parse(&out).expect("slugify output is [a-z0-9-] with no edge hyphens"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn basic_name() {
        assert_eq!(slugify("John", "Smith").unwrap().as_str(), "john-smith");
    }

    #[test]
    fn collapses_punctuation_and_spaces() {
        assert_eq!(
            slugify("Mary Jane", "O'Brien").unwrap().as_str(),
            "mary-jane-o-brien"
        );
        assert_eq!(slugify("  Ada ", " Lovelace ").unwrap().as_str(), "ada-lovelace");
    }

    #[test]
    fn single_name_part_is_enough() {
        assert_eq!(slugify("Prince", "").unwrap().as_str(), "prince");
        assert_eq!(slugify("", "Sting").unwrap().as_str(), "sting");
    }

    #[test]
    fn empty_name_is_an_error() {
        assert!(slugify("", "").is_err());
        assert!(slugify("---", "!!!").is_err());
    }

    proptest! {
        #[test]
        fn output_always_parses_as_slug(first in ".{0,32}", last in ".{0,32}") {
            if let Ok(slug) = slugify(&first, &last) {
                prop_assert!(Slug::parse(slug.as_str()).is_ok());
            }
        }

        #[test]
        fn deterministic(first in ".{0,32}", last in ".{0,32}") {
            let a = slugify(&first, &last);
            let b = slugify(&first, &last);
            match (a, b) {
                (Ok(x), Ok(y)) => prop_assert_eq!(x, y),
                (Err(_), Err(_)) => {}
                _ => prop_assert!(false, "slugify not deterministic"),
            }
        }
    }
}
