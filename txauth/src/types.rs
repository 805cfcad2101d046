use std::fmt;

use chrono::{DateTime, Utc};
use crypto::{Classical, PostQuantum, PublicKey};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Revoked,
    Expired,
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStatus::Active => f.write_str("active"),
            KeyStatus::Revoked => f.write_str("revoked"),
            KeyStatus::Expired => f.write_str("expired"),
        }
    }
}

/// Inclusive validity interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

impl ValidityWindow {
    pub fn new(valid_from: DateTime<Utc>, valid_to: DateTime<Utc>) -> Self {
        Self {
            valid_from,
            valid_to,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && at <= self.valid_to
    }

    /// Overlap of two windows. An empty overlap yields a window with
    /// `valid_from > valid_to`, which contains no instant.
    pub fn intersect(&self, other: &ValidityWindow) -> ValidityWindow {
        ValidityWindow {
            valid_from: self.valid_from.max(other.valid_from),
            valid_to: self.valid_to.min(other.valid_to),
        }
    }
}

/// Public view of a user's hybrid key bundle. Holds no private material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyBundle {
    pub user_id: UserId,
    /// Increments on every generate/rotate for the user.
    pub generation: u64,
    pub pq: PublicKey<PostQuantum>,
    pub classical: PublicKey<Classical>,
    pub created_at: DateTime<Utc>,
    /// Effective status at the time this view was taken.
    pub status: KeyStatus,
    pub validity: ValidityWindow,
}

impl PublicKeyBundle {
    /// Short hex identity of the PQ public key, safe for logs.
    pub fn pq_key_id(&self) -> String {
        self.pq.key_id()
    }

    pub fn classical_key_id(&self) -> String {
        self.classical.key_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn window_bounds_are_inclusive() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(30);
        let window = ValidityWindow::new(start, end);
        assert!(window.contains(start));
        assert!(window.contains(end));
        assert!(!window.contains(end + Duration::milliseconds(1)));
        assert!(!window.contains(start - Duration::milliseconds(1)));
    }

    #[test]
    fn disjoint_intersection_contains_nothing() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let a = ValidityWindow::new(start, start + Duration::days(1));
        let b = ValidityWindow::new(start + Duration::days(2), start + Duration::days(3));
        let overlap = a.intersect(&b);
        assert!(!overlap.contains(start + Duration::days(1)));
        assert!(!overlap.contains(start + Duration::days(2)));
    }
}
