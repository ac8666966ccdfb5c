//! The memory record: atomic unit of episodic and semantic memory.

use chrono::serde::ts_milliseconds;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::access::Scoped;
use crate::tags::{MemoryDomain, MemoryScope, MemoryType};
use crate::{Id, Timestamp, new_id, now};

/// Importance assigned when the caller does not choose one.
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

/// A single remembered item.
///
/// Timestamps serialize as epoch milliseconds so index payload filters can
/// range over them numerically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Id,
    pub content: String,
    pub memory_type: MemoryType,
    pub scope: MemoryScope,
    pub domain: MemoryDomain,
    /// Owning agent.
    pub agent_id: String,
    #[serde(with = "ts_milliseconds")]
    pub created_at: Timestamp,
    #[serde(with = "ts_milliseconds")]
    pub accessed_at: Timestamp,
    #[serde(default)]
    pub access_count: u32,
    /// Retention weight in `[0, 1]`.
    pub importance: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Fact category; preferences use `preference_<category>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_sequence: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl MemoryRecord {
    /// Create a record with a fresh id, private scope and default importance.
    pub fn new(
        memory_type: MemoryType,
        content: impl Into<String>,
        agent_id: impl Into<String>,
        domain: MemoryDomain,
    ) -> Self {
        let ts = now();
        Self {
            id: new_id(),
            content: content.into(),
            memory_type,
            scope: MemoryScope::Private,
            domain,
            agent_id: agent_id.into(),
            created_at: ts,
            accessed_at: ts,
            access_count: 0,
            importance: DEFAULT_IMPORTANCE,
            entities: Vec::new(),
            session_id: None,
            category: None,
            trigger_pattern: None,
            action_sequence: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// Shorthand for an episodic record.
    pub fn episodic(
        content: impl Into<String>,
        agent_id: impl Into<String>,
        domain: MemoryDomain,
    ) -> Self {
        Self::new(MemoryType::Episodic, content, agent_id, domain)
    }

    /// Shorthand for a semantic record.
    pub fn semantic(
        content: impl Into<String>,
        agent_id: impl Into<String>,
        domain: MemoryDomain,
    ) -> Self {
        Self::new(MemoryType::Semantic, content, agent_id, domain)
    }

    pub fn with_scope(mut self, scope: MemoryScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set importance, clamped into `[0, 1]`.
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = clamp_unit(importance);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        let entity = entity.into();
        if !self.entities.contains(&entity) {
            self.entities.push(entity);
        }
        self
    }

    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for entity in entities {
            self = self.with_entity(entity);
        }
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a lightweight rule to the record.
    pub fn with_rule<I, S>(mut self, trigger: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger_pattern = Some(trigger.into());
        self.action_sequence = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Record a successful read.
    pub fn touch(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
        self.accessed_at = now();
    }

    /// Whether this is a preference fact.
    pub fn is_preference(&self) -> bool {
        self.category
            .as_deref()
            .is_some_and(|c| c.starts_with("preference_"))
    }
}

impl Scoped for MemoryRecord {
    fn owner(&self) -> &str {
        &self.agent_id
    }

    fn scope(&self) -> MemoryScope {
        self.scope
    }

    fn domain(&self) -> MemoryDomain {
        self.domain
    }
}

pub(crate) fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}
