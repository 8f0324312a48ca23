//! Staleness and expiry classification for access tokens.
//!
//! Pure decision logic with no side effects or I/O. Given "now" and a
//! session's expiry, it decides whether the token can be reused as-is,
//! should be proactively refreshed, or is already past its expiry.

use crate::types::Session;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Lead time before expiry at which a proactive refresh is triggered.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(300);

/// Classification of an access token relative to its expiry.
///
/// `Expired` implies stale; the distinction matters for the fallback
/// policy, which may reuse a stale-but-unexpired token when a refresh
/// fails transiently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Expiry is at least the threshold away; reuse the token as-is
    Fresh,
    /// Expiry is closer than the threshold but not yet crossed
    Stale,
    /// Expiry has been crossed
    Expired,
}

impl Freshness {
    /// Classify a token expiring at `expires_at` as seen at `now`.
    ///
    /// The boundary `expires_at - now == threshold` is `Fresh` (strict
    /// `<` on the staleness test); `expires_at <= now` is `Expired`.
    pub fn evaluate(expires_at: DateTime<Utc>, now: DateTime<Utc>, threshold_secs: i64) -> Self {
        if expires_at <= now {
            Freshness::Expired
        } else if expires_at - now < ChronoDuration::seconds(threshold_secs) {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    /// Classify a session as seen at `now`.
    pub fn of_session(session: &Session, now: DateTime<Utc>, threshold_secs: i64) -> Self {
        Self::evaluate(session.expires_at, now, threshold_secs)
    }

    /// Whether a refresh is due (`Stale` or `Expired`).
    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale | Freshness::Expired)
    }

    /// Whether the expiry has been crossed.
    pub fn is_expired(&self) -> bool {
        matches!(self, Freshness::Expired)
    }
}
