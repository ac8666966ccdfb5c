//! Scratchpad, task and entity-tracking helpers.
//!
//! Everything here is layered on plain [`WorkingMemory::get`] and
//! [`WorkingMemory::set`] against reserved keys, so helper state evicts and
//! expires like any other slot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::working::WorkingMemory;

pub const SCRATCHPAD_KEY: &str = "_scratchpad";
pub const CURRENT_TASK_KEY: &str = "_current_task";
pub const COMPLETED_TASKS_KEY: &str = "_completed_tasks";
pub const ENTITIES_KEY: &str = "_entities";
pub const CONTEXT_KEY: &str = "_context";

/// Completed tasks kept per session; older ones fall off the front.
pub const COMPLETED_TASK_LIMIT: usize = 10;

/// `entity_type -> entity_id -> data`.
pub type TrackedEntities = BTreeMap<String, BTreeMap<String, Map<String, Value>>>;

/// The task a session is working on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentTask {
    pub task: Value,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTask {
    pub task: Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl WorkingMemory {
    // ─────────────────────────────────────────────────────────────────────────
    // Scratchpad
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a line to the session scratchpad.
    pub fn append_scratchpad(&self, session_id: &str, note: &str) -> Result<()> {
        let content = match self.scratchpad(session_id) {
            current if current.is_empty() => note.to_string(),
            current => format!("{current}\n{note}"),
        };
        self.set(session_id, SCRATCHPAD_KEY, Value::String(content), None)
    }

    /// Scratchpad text, empty when nothing was written.
    pub fn scratchpad(&self, session_id: &str) -> String {
        match self.get(session_id, SCRATCHPAD_KEY) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        }
    }

    pub fn clear_scratchpad(&self, session_id: &str) -> bool {
        self.delete(session_id, SCRATCHPAD_KEY)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tasks
    // ─────────────────────────────────────────────────────────────────────────

    /// Make `task` the active task, replacing any previous one.
    pub fn set_current_task(&self, session_id: &str, task: Value) -> Result<()> {
        let current = CurrentTask {
            task,
            started_at: Utc::now(),
        };
        self.set(session_id, CURRENT_TASK_KEY, serde_json::to_value(current)?, None)
    }

    pub fn current_task(&self, session_id: &str) -> Option<CurrentTask> {
        self.get(session_id, CURRENT_TASK_KEY)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Move the active task into the completed list and clear it.
    ///
    /// Returns the completed task, or `None` when no task was active.
    pub fn complete_current_task(
        &self,
        session_id: &str,
        result: Option<Value>,
    ) -> Result<Option<CompletedTask>> {
        let Some(current) = self.current_task(session_id) else {
            return Ok(None);
        };

        let completed = CompletedTask {
            task: current.task,
            started_at: current.started_at,
            completed_at: Utc::now(),
            result,
        };

        let mut history = self.completed_tasks(session_id);
        history.push(completed.clone());
        if history.len() > COMPLETED_TASK_LIMIT {
            let overflow = history.len() - COMPLETED_TASK_LIMIT;
            history.drain(..overflow);
        }

        self.set(session_id, COMPLETED_TASKS_KEY, serde_json::to_value(&history)?, None)?;
        self.delete(session_id, CURRENT_TASK_KEY);
        Ok(Some(completed))
    }

    /// Completed tasks, oldest first.
    pub fn completed_tasks(&self, session_id: &str) -> Vec<CompletedTask> {
        self.get(session_id, COMPLETED_TASKS_KEY)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entity tracking
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a mention of an entity, merging `data` into what is already
    /// tracked and stamping `last_mentioned`.
    pub fn track_entity(
        &self,
        session_id: &str,
        entity_type: &str,
        entity_id: &str,
        data: Map<String, Value>,
    ) -> Result<()> {
        let mut tracked = self.tracked_entities(session_id);
        let entry = tracked
            .entry(entity_type.to_string())
            .or_default()
            .entry(entity_id.to_string())
            .or_default();
        entry.extend(data);
        entry.insert(
            "last_mentioned".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        self.set(session_id, ENTITIES_KEY, serde_json::to_value(&tracked)?, None)
    }

    pub fn tracked_entities(&self, session_id: &str) -> TrackedEntities {
        self.get(session_id, ENTITIES_KEY)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Context
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the free-form session context.
    pub fn set_context(&self, session_id: &str, context: Value) -> Result<()> {
        self.set(session_id, CONTEXT_KEY, context, None)
    }

    pub fn context(&self, session_id: &str) -> Option<Value> {
        self.get(session_id, CONTEXT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkingMemoryConfig;
    use serde_json::json;

    fn memory() -> WorkingMemory {
        WorkingMemory::new(WorkingMemoryConfig::default())
    }

    #[test]
    fn test_scratchpad_appends_lines() {
        let wm = memory();
        assert_eq!(wm.scratchpad("s1"), "");
        wm.append_scratchpad("s1", "first").unwrap();
        wm.append_scratchpad("s1", "second").unwrap();
        assert_eq!(wm.scratchpad("s1"), "first\nsecond");
        assert!(wm.clear_scratchpad("s1"));
        assert_eq!(wm.scratchpad("s1"), "");
    }

    #[test]
    fn test_complete_moves_task_to_history() {
        let wm = memory();
        wm.set_current_task("s1", json!({"title": "reply to Bob"})).unwrap();
        assert_eq!(
            wm.current_task("s1").unwrap().task,
            json!({"title": "reply to Bob"})
        );

        let done = wm
            .complete_current_task("s1", Some(json!("sent")))
            .unwrap()
            .unwrap();
        assert_eq!(done.result, Some(json!("sent")));
        assert!(done.completed_at >= done.started_at);
        assert!(wm.current_task("s1").is_none());
        assert_eq!(wm.completed_tasks("s1").len(), 1);
    }

    #[test]
    fn test_complete_without_active_task() {
        let wm = memory();
        assert!(wm.complete_current_task("s1", None).unwrap().is_none());
        assert!(wm.completed_tasks("s1").is_empty());
    }

    #[test]
    fn test_completed_tasks_bounded() {
        let wm = memory();
        for i in 0..(COMPLETED_TASK_LIMIT + 3) {
            wm.set_current_task("s1", json!(i)).unwrap();
            wm.complete_current_task("s1", None).unwrap();
        }
        let history = wm.completed_tasks("s1");
        assert_eq!(history.len(), COMPLETED_TASK_LIMIT);
        assert_eq!(history[0].task, json!(3));
        assert_eq!(history.last().unwrap().task, json!(COMPLETED_TASK_LIMIT + 2));
    }

    #[test]
    fn test_track_entity_merges_and_stamps() {
        let wm = memory();
        let mut data = Map::new();
        data.insert("name".into(), json!("Bob"));
        wm.track_entity("s1", "person", "bob", data).unwrap();

        let mut more = Map::new();
        more.insert("role".into(), json!("manager"));
        wm.track_entity("s1", "person", "bob", more).unwrap();
        wm.track_entity("s1", "project", "apollo", Map::new()).unwrap();

        let tracked = wm.tracked_entities("s1");
        assert_eq!(tracked.len(), 2);
        let bob = &tracked["person"]["bob"];
        assert_eq!(bob["name"], json!("Bob"));
        assert_eq!(bob["role"], json!("manager"));
        assert!(bob.contains_key("last_mentioned"));
        assert!(tracked["project"]["apollo"].contains_key("last_mentioned"));
    }

    #[test]
    fn test_context_roundtrip() {
        let wm = memory();
        assert!(wm.context("s1").is_none());
        wm.set_context("s1", json!({"mailbox": "inbox"})).unwrap();
        assert_eq!(wm.context("s1"), Some(json!({"mailbox": "inbox"})));
    }

    #[test]
    fn test_helpers_visible_through_get_all() {
        let wm = memory();
        wm.append_scratchpad("s1", "note").unwrap();
        wm.set_context("s1", json!("ctx")).unwrap();
        let all = wm.get_all("s1");
        assert!(all.contains_key(SCRATCHPAD_KEY));
        assert!(all.contains_key(CONTEXT_KEY));
    }
}
