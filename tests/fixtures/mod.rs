#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;

use taplink::core::{BatchPrefix, CodeString, ProfileFields, UserId};
use taplink::store::Store;

/// A store backed by a temp directory that lives as long as the fixture.
pub struct TestStore {
    _temp: TempDir,
    pub db_path: PathBuf,
    pub store: Store,
}

impl TestStore {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let db_path = temp.path().join("taplink.sqlite");
        let store = Store::open(&db_path).expect("open store");
        Self {
            _temp: temp,
            db_path,
            store,
        }
    }
}

pub fn admin() -> UserId {
    UserId::new("admin").expect("valid user id")
}

pub fn user(s: &str) -> UserId {
    UserId::new(s).unwrap_or_else(|e| panic!("invalid user id {s}: {e}"))
}

pub fn code(s: &str) -> CodeString {
    CodeString::parse(s).unwrap_or_else(|e| panic!("invalid code {s}: {e}"))
}

pub fn prefix(s: &str) -> BatchPrefix {
    BatchPrefix::parse(s).unwrap_or_else(|e| panic!("invalid prefix {s}: {e}"))
}

pub fn fields(first: &str, last: &str) -> ProfileFields {
    ProfileFields::new(first, last)
}
