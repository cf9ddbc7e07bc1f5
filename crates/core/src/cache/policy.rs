//! Per-tier staleness and garbage-collection timing.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);

/// Freshness tier a cached record belongs to.
///
/// Tiers range from always-stale (`Critical`) to half-hour staleness
/// (`Static`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Critical,
    Realtime,
    Session,
    Profile,
    Static,
}

impl CacheTier {
    pub const ALL: [CacheTier; 5] = [
        CacheTier::Critical,
        CacheTier::Realtime,
        CacheTier::Session,
        CacheTier::Profile,
        CacheTier::Static,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Critical => "critical",
            CacheTier::Realtime => "realtime",
            CacheTier::Session => "session",
            CacheTier::Profile => "profile",
            CacheTier::Static => "static",
        }
    }

    /// Resolves a tier by name. Unknown names resolve to `Session`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "critical" => CacheTier::Critical,
            "realtime" => CacheTier::Realtime,
            "profile" => CacheTier::Profile,
            "static" | "analytics" => CacheTier::Static,
            _ => CacheTier::Session,
        }
    }

    /// Returns the staleness and GC timing for this tier.
    pub fn policy(&self) -> CachePolicy {
        match self {
            CacheTier::Critical => CachePolicy::new(Duration::ZERO, 5 * MINUTE),
            CacheTier::Realtime => CachePolicy::new(30 * SECOND, 5 * MINUTE),
            CacheTier::Session => CachePolicy::new(5 * MINUTE, 10 * MINUTE),
            CacheTier::Profile => CachePolicy::new(15 * MINUTE, 30 * MINUTE),
            CacheTier::Static => CachePolicy::new(30 * MINUTE, 60 * MINUTE),
        }
    }

    /// Returns how often the background scheduler refreshes this tier.
    pub fn refresh_interval(&self) -> Duration {
        match self {
            CacheTier::Critical => 60 * SECOND,
            CacheTier::Realtime => 2 * MINUTE,
            CacheTier::Session => 5 * MINUTE,
            CacheTier::Profile => 15 * MINUTE,
            CacheTier::Static => 30 * MINUTE,
        }
    }

    /// Returns true if this tier keeps refreshing while the page is hidden.
    pub fn refreshes_when_hidden(&self) -> bool {
        matches!(self, CacheTier::Critical)
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Staleness and GC timing applied when an entry is written.
///
/// `gc_time` is always strictly greater than `stale_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub stale_time: Duration,
    pub gc_time: Duration,
}

impl CachePolicy {
    /// Creates a policy, bumping `gc_time` past `stale_time` if needed.
    pub fn new(stale_time: Duration, gc_time: Duration) -> Self {
        let gc_time = if gc_time > stale_time {
            gc_time
        } else {
            stale_time + Duration::from_millis(1)
        };
        Self {
            stale_time,
            gc_time,
        }
    }
}

/// Resolves the policy for a class or tier name.
///
/// Unknown names fall back to the session tier.
///
/// # Examples
///
/// ```
/// use clinicsync_core::cache::{policy_for, CacheTier};
///
/// assert_eq!(policy_for("critical"), CacheTier::Critical.policy());
/// assert_eq!(policy_for("no-such-class"), CacheTier::Session.policy());
/// ```
pub fn policy_for(class: &str) -> CachePolicy {
    CacheTier::from_name(class).policy()
}
