//! Working memory: session-scoped, process-local key/value slots.
//!
//! This crate provides the short-lived layer of the memory store with:
//! - a bounded number of slots per session, evicting the least recently used
//! - optional per-slot TTL, checked lazily on read and swept by [`WorkingMemory::purge_expired`]
//! - scratchpad, current-task and tracked-entity helpers built on reserved keys
//!
//! Nothing here is persisted; a session's state is promoted to long-term
//! memory by consolidation in the orchestrator.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use concord_session::{WorkingMemory, WorkingMemoryConfig};
//! use serde_json::json;
//!
//! let memory = WorkingMemory::new(WorkingMemoryConfig::default().with_max_slots(50));
//! memory.set("session-1", "draft", json!("Dear Bob,"), Some(Duration::from_secs(600)))?;
//! assert_eq!(memory.get("session-1", "draft"), Some(json!("Dear Bob,")));
//! # Ok::<(), concord_session::Error>(())
//! ```

mod config;
mod error;
mod helpers;
mod slot;
mod working;

pub use config::{DEFAULT_MAX_SLOTS, WorkingMemoryConfig};
pub use error::{Error, Result};
pub use helpers::{
    COMPLETED_TASK_LIMIT, COMPLETED_TASKS_KEY, CONTEXT_KEY, CURRENT_TASK_KEY, CompletedTask,
    CurrentTask, ENTITIES_KEY, SCRATCHPAD_KEY, TrackedEntities,
};
pub use slot::Slot;
pub use working::{WorkingMemory, WorkingMemoryStats};
