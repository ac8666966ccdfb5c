//! Configuration for working memory.

use std::time::Duration;

/// Default maximum number of slots per session.
pub const DEFAULT_MAX_SLOTS: usize = 100;

/// Configuration for working memory.
#[derive(Debug, Clone)]
pub struct WorkingMemoryConfig {
    /// Maximum slots held per session before LRU eviction.
    pub max_slots: usize,

    /// TTL applied when `set` is called without one.
    /// `None` means such slots never expire.
    pub default_ttl: Option<Duration>,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self {
            max_slots: DEFAULT_MAX_SLOTS,
            default_ttl: None,
        }
    }
}

impl WorkingMemoryConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-session slot bound. Zero is treated as one.
    pub fn with_max_slots(mut self, max: usize) -> Self {
        self.max_slots = max.max(1);
        self
    }

    /// Set the TTL for slots written without an explicit one.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Slots written without an explicit TTL never expire.
    pub fn without_default_ttl(mut self) -> Self {
        self.default_ttl = None;
        self
    }
}
