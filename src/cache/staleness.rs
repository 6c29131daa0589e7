use chrono::{DateTime, Duration, Utc};

use super::entry::EntryHeader;

/// How long an undated entry is trusted before it is refetched.
pub const DEFAULT_UNDATED_TTL_DAYS: u32 = 60;

/// Decides whether a cached entry must be refreshed.
///
/// Dated entries pin a specific edition and never expire; only undated
/// entries are subject to the TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    undated_ttl: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::from_days(DEFAULT_UNDATED_TTL_DAYS)
    }
}

impl StalenessPolicy {
    pub fn new(undated_ttl: Duration) -> Self {
        Self { undated_ttl }
    }

    pub fn from_days(days: u32) -> Self {
        Self::new(Duration::days(i64::from(days)))
    }

    pub fn undated_ttl(&self) -> Duration {
        self.undated_ttl
    }

    pub fn is_stale(&self, header: &EntryHeader, now: DateTime<Utc>) -> bool {
        if header.dated {
            return false;
        }
        now.signed_duration_since(header.fetched) > self.undated_ttl
    }
}
