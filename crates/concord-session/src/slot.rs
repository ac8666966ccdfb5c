//! A single working-memory slot and its expiry.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

/// One key/value entry in a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    /// `None` means the slot never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub access_count: u32,
}

impl Slot {
    /// Create a slot that expires `ttl` after now.
    pub fn new(key: impl Into<String>, value: Value, ttl: Option<Duration>) -> Self {
        let created_at = Utc::now();
        // A TTL too large for chrono is as good as no TTL.
        let expires_at = ttl
            .and_then(|d| TimeDelta::from_std(d).ok())
            .and_then(|d| created_at.checked_add_signed(d));
        Self {
            key: key.into(),
            value,
            created_at,
            expires_at,
            access_count: 0,
        }
    }

    /// Expired once `now` reaches `expires_at`; a zero TTL is expired at once.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Time left before expiry, if the slot has a TTL and is still live.
    pub fn remaining(&self) -> Option<Duration> {
        let at = self.expires_at?;
        (at - Utc::now()).to_std().ok()
    }

    pub(crate) fn record_access(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_ttl_never_expires() {
        let slot = Slot::new("k", json!(1), None);
        assert!(!slot.is_expired());
        assert!(slot.remaining().is_none());
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let slot = Slot::new("k", json!(1), Some(Duration::ZERO));
        assert!(slot.is_expired());
    }

    #[test]
    fn test_expiry_boundary() {
        let slot = Slot::new("k", json!(1), Some(Duration::from_secs(60)));
        let at = slot.expires_at.unwrap();
        assert!(!slot.is_expired_at(at - TimeDelta::milliseconds(1)));
        assert!(slot.is_expired_at(at));
        assert!(slot.remaining().unwrap() <= Duration::from_secs(60));
    }

    #[test]
    fn test_huge_ttl_is_unbounded() {
        let slot = Slot::new("k", json!(1), Some(Duration::MAX));
        assert!(slot.expires_at.is_none());
    }
}
