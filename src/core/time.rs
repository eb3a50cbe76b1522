//! Layer 0: Time primitive.
//!
//! Wall-clock milliseconds for lifecycle stamps (created/assigned/copied/deleted).
//! There is no causal ordering requirement in this core; wall time is enough.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Wall-clock timestamp in milliseconds since the Unix epoch.
///
/// Copy is fine here - it's a measurement, not an identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        Self(ms)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// RFC 3339 rendering for human-facing output.
    ///
    /// Falls back to the raw millisecond value if the timestamp is out of the
    /// representable range.
    pub fn to_rfc3339(self) -> String {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000)
            .ok()
            .and_then(|dt| dt.format(&Rfc3339).ok())
            .unwrap_or_else(|| format!("{}ms", self.0))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_round_millis() {
        let ts = Timestamp(1_700_000_000_000);
        assert_eq!(ts.to_rfc3339(), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn now_is_positive() {
        assert!(Timestamp::now().as_millis() > 0);
    }
}
