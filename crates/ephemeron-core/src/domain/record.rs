//! Tracking record: the metadata kept per tracked image.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one tracked image.
///
/// Design:
/// - Keyed by `repository:tag` in the tracking store; the key is not repeated here.
/// - A later track for the same key overwrites every field (last-write-wins).
/// - `size_bytes` is observational only and never affects reclamation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    /// When the image was most recently (re-)tracked.
    pub created_at: DateTime<Utc>,

    /// After this instant the image may be reaped.
    pub expires_at: DateTime<Utc>,

    /// Best-effort total size, 0 if unknown.
    pub size_bytes: u64,
}

impl TrackingRecord {
    pub fn new(created_at: DateTime<Utc>, expires_at: DateTime<Utc>, size_bytes: u64) -> Self {
        Self {
            created_at,
            expires_at,
            size_bytes,
        }
    }

    /// An image is expired once `now` has reached `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.expires_at, now)
    }
}

/// `now < expires_at` の間は回収しない
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expires_at
}
