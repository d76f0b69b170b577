//! Freshness classification of a data source's last successful update

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Three-level freshness label, plus `Unknown` for sources that have never
/// produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Unknown,
    Fresh,
    Normal,
    Stale,
}

impl Freshness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale)
    }
}

/// Classify the age of `last_update` against two bands.
///
/// Pure function of its inputs: `now` is a parameter, not read from a clock.
/// `Unknown` when no update was ever recorded; `Fresh` when the age is at
/// most `fresh`; `Stale` when it exceeds `stale`; `Normal` otherwise.
/// Negative ages (clock skew) clamp to zero.
pub fn classify(
    last_update: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    fresh: Duration,
    stale: Duration,
) -> Freshness {
    let Some(ts) = last_update else {
        return Freshness::Unknown;
    };

    let age = now.signed_duration_since(ts).max(Duration::zero());
    if age <= fresh {
        Freshness::Fresh
    } else if age > stale {
        Freshness::Stale
    } else {
        Freshness::Normal
    }
}
