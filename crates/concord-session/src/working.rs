//! Working memory store with per-session LRU eviction and TTL expiry.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::WorkingMemoryConfig;
use crate::error::{Error, Result};
use crate::slot::Slot;

type SessionSlots = LruCache<String, Slot>;

/// Session-scoped working memory.
///
/// Each session holds at most `max_slots` slots; inserting beyond that
/// evicts the least recently used slot. Every `get` or `set` of a key moves
/// it to the most recently used position. TTL is independent of LRU order:
/// a slot can expire long before it would be evicted.
///
/// All sessions share one lock, held for the duration of each call.
pub struct WorkingMemory {
    inner: Arc<Mutex<HashMap<String, SessionSlots>>>,
    config: WorkingMemoryConfig,
}

impl WorkingMemory {
    pub fn new(config: WorkingMemoryConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Get the working memory configuration.
    pub fn config(&self) -> &WorkingMemoryConfig {
        &self.config
    }

    fn capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.config.max_slots).unwrap_or(NonZeroUsize::MIN)
    }

    /// Write a slot, replacing any existing value under `key`.
    ///
    /// `ttl` of `None` falls back to the configured default TTL.
    pub fn set(&self, session_id: &str, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        if session_id.trim().is_empty() {
            return Err(Error::InvalidSession(session_id.to_string()));
        }
        if key.is_empty() {
            return Err(Error::InvalidKey(key.to_string()));
        }

        let ttl = ttl.or(self.config.default_ttl);
        let capacity = self.capacity();
        let mut sessions = self.inner.lock();
        let slots = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| LruCache::new(capacity));

        // Reclaim expired slots before evicting a live one.
        if slots.len() >= capacity.get() && !slots.contains(key) {
            purge_session(slots);
        }

        let slot = Slot::new(key, value, ttl);
        if let Some((evicted, _)) = slots.push(key.to_string(), slot)
            && evicted != key
        {
            debug!(session_id = %session_id, key = %evicted, "Evicted least recently used slot");
        }

        trace!(session_id = %session_id, key = %key, slots = slots.len(), "Slot written");
        Ok(())
    }

    /// Read a slot, refreshing its LRU position.
    ///
    /// Expired slots are removed on the way and read as absent.
    pub fn get(&self, session_id: &str, key: &str) -> Option<Value> {
        let mut sessions = self.inner.lock();
        let slots = sessions.get_mut(session_id)?;

        if slots.peek(key).is_some_and(Slot::is_expired) {
            slots.pop(key);
            debug!(session_id = %session_id, key = %key, "Slot expired");
            return None;
        }

        slots.get_mut(key).map(|slot| {
            slot.record_access();
            slot.value.clone()
        })
    }

    /// Read a slot or return `default`.
    pub fn get_or(&self, session_id: &str, key: &str, default: Value) -> Value {
        self.get(session_id, key).unwrap_or(default)
    }

    /// Read a full slot (value plus bookkeeping) without touching LRU order.
    pub fn peek_slot(&self, session_id: &str, key: &str) -> Option<Slot> {
        let sessions = self.inner.lock();
        sessions
            .get(session_id)
            .and_then(|slots| slots.peek(key))
            .filter(|slot| !slot.is_expired())
            .cloned()
    }

    /// Remove a slot. Returns whether a live slot was removed.
    pub fn delete(&self, session_id: &str, key: &str) -> bool {
        let mut sessions = self.inner.lock();
        sessions
            .get_mut(session_id)
            .and_then(|slots| slots.pop(key))
            .is_some_and(|slot| !slot.is_expired())
    }

    /// All live slots of a session, purging expired ones.
    ///
    /// Does not change LRU order.
    pub fn get_all(&self, session_id: &str) -> BTreeMap<String, Value> {
        let mut sessions = self.inner.lock();
        let Some(slots) = sessions.get_mut(session_id) else {
            return BTreeMap::new();
        };

        let purged = purge_session(slots);
        if purged > 0 {
            debug!(session_id = %session_id, purged, "Purged expired slots");
        }

        slots
            .iter()
            .map(|(k, slot)| (k.clone(), slot.value.clone()))
            .collect()
    }

    /// Keys of a session from most to least recently used.
    pub fn keys(&self, session_id: &str) -> Vec<String> {
        let sessions = self.inner.lock();
        let now = Utc::now();
        sessions
            .get(session_id)
            .map(|slots| {
                slots
                    .iter()
                    .filter(|(_, slot)| !slot.is_expired_at(now))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every slot of a session. Returns the number of slots removed.
    pub fn clear_session(&self, session_id: &str) -> usize {
        let mut sessions = self.inner.lock();
        let removed = sessions.remove(session_id).map(|s| s.len()).unwrap_or(0);
        if removed > 0 {
            debug!(session_id = %session_id, removed, "Session cleared");
        }
        removed
    }

    /// Remove expired slots across all sessions.
    ///
    /// Sessions left empty are dropped. Returns the number of slots removed.
    pub fn purge_expired(&self) -> usize {
        let mut sessions = self.inner.lock();
        let mut purged = 0;
        for slots in sessions.values_mut() {
            purged += purge_session(slots);
        }
        sessions.retain(|_, slots| !slots.is_empty());

        if purged > 0 {
            debug!(purged, "Purged expired working memory slots");
        }
        purged
    }

    /// Ids of sessions currently holding slots.
    pub fn session_ids(&self) -> Vec<String> {
        let sessions = self.inner.lock();
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> WorkingMemoryStats {
        let sessions = self.inner.lock();
        WorkingMemoryStats {
            sessions: sessions.len(),
            slots: sessions.values().map(|s| s.len()).sum(),
            max_slots_per_session: self.config.max_slots,
        }
    }
}

impl Clone for WorkingMemory {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new(WorkingMemoryConfig::default())
    }
}

/// Working memory statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkingMemoryStats {
    /// Sessions currently holding slots.
    pub sessions: usize,

    /// Slots across all sessions, including not-yet-purged expired ones.
    pub slots: usize,

    pub max_slots_per_session: usize,
}

fn purge_session(slots: &mut SessionSlots) -> usize {
    let now = Utc::now();
    let expired: Vec<String> = slots
        .iter()
        .filter(|(_, slot)| slot.is_expired_at(now))
        .map(|(k, _)| k.clone())
        .collect();
    for key in &expired {
        slots.pop(key);
    }
    expired.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn memory(max: usize) -> WorkingMemory {
        WorkingMemory::new(WorkingMemoryConfig::new().with_max_slots(max))
    }

    #[test]
    fn test_set_and_get() {
        let wm = memory(10);
        wm.set("s1", "k", json!({"a": 1}), None).unwrap();
        assert_eq!(wm.get("s1", "k"), Some(json!({"a": 1})));
        assert_eq!(wm.get("s1", "missing"), None);
        assert_eq!(wm.get("nope", "k"), None);
    }

    #[test]
    fn test_get_or_returns_default() {
        let wm = memory(10);
        assert_eq!(wm.get_or("s1", "k", json!("fallback")), json!("fallback"));
    }

    #[test]
    fn test_invalid_session_rejected() {
        let wm = memory(10);
        assert!(matches!(
            wm.set("  ", "k", json!(1), None),
            Err(Error::InvalidSession(_))
        ));
        assert!(matches!(
            wm.set("s1", "", json!(1), None),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_zero_ttl_reads_as_default() {
        let wm = memory(10);
        wm.set("s1", "k", json!("v"), Some(Duration::ZERO)).unwrap();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(wm.get_or("s1", "k", json!("default")), json!("default"));
        // Lazy expiry removed it.
        assert!(wm.peek_slot("s1", "k").is_none());
        assert_eq!(wm.stats().slots, 0);
    }

    #[test]
    fn test_default_ttl_applies() {
        let wm = WorkingMemory::new(
            WorkingMemoryConfig::new().with_default_ttl(Duration::from_millis(10)),
        );
        wm.set("s1", "k", json!(1), None).unwrap();
        assert!(wm.peek_slot("s1", "k").unwrap().expires_at.is_some());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(wm.get("s1", "k"), None);
    }

    #[test]
    fn test_lru_evicts_exactly_least_recent() {
        let wm = memory(3);
        for i in 0..3 {
            wm.set("s1", &format!("k{i}"), json!(i), None).unwrap();
        }
        wm.set("s1", "k3", json!(3), None).unwrap();

        assert_eq!(wm.get("s1", "k0"), None);
        assert_eq!(wm.get("s1", "k1"), Some(json!(1)));
        assert_eq!(wm.get("s1", "k2"), Some(json!(2)));
        assert_eq!(wm.get("s1", "k3"), Some(json!(3)));
    }

    #[test]
    fn test_access_refreshes_lru_position() {
        let wm = memory(3);
        for i in 0..3 {
            wm.set("s1", &format!("k{i}"), json!(i), None).unwrap();
        }
        // k0 becomes most recent, so k1 is now the eviction candidate.
        wm.get("s1", "k0");
        wm.set("s1", "k3", json!(3), None).unwrap();

        assert!(wm.get("s1", "k0").is_some());
        assert!(wm.get("s1", "k1").is_none());
        assert_eq!(wm.keys("s1").len(), 3);
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let wm = memory(2);
        wm.set("s1", "a", json!(1), None).unwrap();
        wm.set("s1", "b", json!(2), None).unwrap();
        wm.set("s1", "a", json!(10), None).unwrap();
        assert_eq!(wm.get("s1", "a"), Some(json!(10)));
        assert_eq!(wm.get("s1", "b"), Some(json!(2)));
    }

    #[test]
    fn test_expired_slot_reclaimed_before_eviction() {
        let wm = memory(2);
        wm.set("s1", "short", json!(1), Some(Duration::ZERO)).unwrap();
        wm.set("s1", "live", json!(2), None).unwrap();
        thread::sleep(Duration::from_millis(5));
        wm.set("s1", "new", json!(3), None).unwrap();
        assert_eq!(wm.get("s1", "live"), Some(json!(2)));
        assert_eq!(wm.get("s1", "new"), Some(json!(3)));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let wm = memory(10);
        wm.set("s1", "k", json!(1), None).unwrap();
        wm.set("s2", "k", json!(2), None).unwrap();
        assert_eq!(wm.get("s1", "k"), Some(json!(1)));
        assert_eq!(wm.get("s2", "k"), Some(json!(2)));
        assert_eq!(wm.session_ids(), vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn test_get_all_purges_expired() {
        let wm = memory(10);
        wm.set("s1", "gone", json!(0), Some(Duration::ZERO)).unwrap();
        wm.set("s1", "a", json!(1), None).unwrap();
        wm.set("s1", "b", json!(2), Some(Duration::from_secs(60))).unwrap();
        thread::sleep(Duration::from_millis(5));

        let all = wm.get_all("s1");
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"], json!(1));
        assert_eq!(wm.stats().slots, 2);
        assert!(wm.get_all("unknown").is_empty());
    }

    #[test]
    fn test_delete_and_clear() {
        let wm = memory(10);
        wm.set("s1", "a", json!(1), None).unwrap();
        wm.set("s1", "b", json!(2), None).unwrap();
        assert!(wm.delete("s1", "a"));
        assert!(!wm.delete("s1", "a"));
        assert_eq!(wm.clear_session("s1"), 1);
        assert_eq!(wm.clear_session("s1"), 0);
        assert!(wm.session_ids().is_empty());
    }

    #[test]
    fn test_purge_expired_across_sessions() {
        let wm = memory(10);
        wm.set("s1", "a", json!(1), Some(Duration::ZERO)).unwrap();
        wm.set("s2", "b", json!(2), Some(Duration::ZERO)).unwrap();
        wm.set("s2", "c", json!(3), None).unwrap();
        thread::sleep(Duration::from_millis(5));

        assert_eq!(wm.purge_expired(), 2);
        assert_eq!(wm.session_ids(), vec!["s2".to_string()]);
        assert_eq!(wm.purge_expired(), 0);
    }

    #[test]
    fn test_access_count_tracked() {
        let wm = memory(10);
        wm.set("s1", "k", json!(1), None).unwrap();
        wm.get("s1", "k");
        wm.get("s1", "k");
        assert_eq!(wm.peek_slot("s1", "k").unwrap().access_count, 2);
    }

    #[test]
    fn test_clones_share_state() {
        let wm = memory(10);
        let other = wm.clone();
        wm.set("s1", "k", json!(1), None).unwrap();
        assert_eq!(other.get("s1", "k"), Some(json!(1)));
    }
}
