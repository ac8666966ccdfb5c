//! Procedures: learned trigger→action patterns.

use std::fmt;

use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::access::Scoped;
use crate::id::{deterministic_id, procedure_key};
use crate::tags::{MemoryDomain, MemoryScope};
use crate::{Id, Timestamp, now};

/// Lowest confidence a procedure can fall to.
pub const CONFIDENCE_FLOOR: f32 = 0.1;

/// Highest confidence a procedure can reach.
pub const CONFIDENCE_CEILING: f32 = 1.0;

/// Confidence of a freshly learned procedure.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// How a procedure's action is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Ordered list of steps.
    Sequence,
    /// A response template with placeholders.
    Template,
    /// Multi-step workflow with structured steps.
    Workflow,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequence => "sequence",
            Self::Template => "template",
            Self::Workflow => "workflow",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Family a procedure belongs to; part of its deterministic key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureKind {
    EmailPattern,
    Workflow,
    Procedure,
}

impl ProcedureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailPattern => "email_pattern",
            Self::Workflow => "workflow",
            Self::Procedure => "procedure",
        }
    }
}

/// A learned pattern whose confidence adapts to outcome feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: Id,
    pub kind: ProcedureKind,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger_pattern: String,
    #[serde(default)]
    pub trigger_keywords: Vec<String>,
    #[serde(default)]
    pub trigger_conditions: Map<String, Value>,
    pub action_type: ActionType,
    #[serde(default)]
    pub action_steps: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_template: Option<String>,
    pub confidence: f32,
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default, with = "ts_milliseconds_option")]
    pub last_used: Option<Timestamp>,
    #[serde(with = "ts_milliseconds")]
    pub created_at: Timestamp,
    #[serde(with = "ts_milliseconds")]
    pub updated_at: Timestamp,
    pub agent_id: String,
    pub scope: MemoryScope,
    pub domain: MemoryDomain,
}

impl Procedure {
    /// Create a procedure keyed by `"<kind>_<name>"`.
    pub fn new(
        kind: ProcedureKind,
        name: impl Into<String>,
        trigger_pattern: impl Into<String>,
        action_type: ActionType,
        agent_id: impl Into<String>,
        domain: MemoryDomain,
    ) -> Self {
        let name = name.into();
        let ts = now();
        Self {
            id: deterministic_id(&procedure_key(kind.as_str(), &name)),
            kind,
            name,
            description: String::new(),
            trigger_pattern: trigger_pattern.into(),
            trigger_keywords: Vec::new(),
            trigger_conditions: Map::new(),
            action_type,
            action_steps: Vec::new(),
            action_template: None,
            confidence: DEFAULT_CONFIDENCE,
            success_count: 0,
            failure_count: 0,
            last_used: None,
            created_at: ts,
            updated_at: ts,
            agent_id: agent_id.into(),
            scope: MemoryScope::Domain,
            domain,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_conditions(mut self, conditions: Map<String, Value>) -> Self {
        self.trigger_conditions = conditions;
        self
    }

    pub fn with_steps(mut self, steps: Vec<Value>) -> Self {
        self.action_steps = steps;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.action_template = Some(template.into());
        self
    }

    pub fn with_scope(mut self, scope: MemoryScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set confidence, clamped into `[CONFIDENCE_FLOOR, CONFIDENCE_CEILING]`.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = clamp_confidence(confidence, CONFIDENCE_FLOOR);
        self
    }

    /// `success / (success + failure)`, or 0.5 with no evidence.
    pub fn success_rate(&self) -> f32 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            0.5
        } else {
            self.success_count as f32 / total as f32
        }
    }

    /// Reinforce after a successful use.
    pub fn record_success(&mut self, step: f32) {
        self.success_count = self.success_count.saturating_add(1);
        self.confidence = (self.confidence + step).min(CONFIDENCE_CEILING);
        self.mark_used();
    }

    /// Penalize after a failed use; never drops below `floor`.
    pub fn record_failure(&mut self, step: f32, floor: f32) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.confidence = (self.confidence - step).max(floor);
        self.mark_used();
    }

    fn mark_used(&mut self) {
        let ts = now();
        self.last_used = Some(ts);
        self.updated_at = ts;
    }

    /// Trigger keywords found in `context`, case-insensitively.
    pub fn matched_keywords(&self, context: &str) -> Vec<String> {
        let haystack = context.to_lowercase();
        self.trigger_keywords
            .iter()
            .filter(|kw| !kw.is_empty() && haystack.contains(&kw.to_lowercase()))
            .cloned()
            .collect()
    }

    /// Carry learned statistics over from an earlier registration of the
    /// same procedure, keeping this definition.
    pub fn inherit_history(&mut self, previous: &Procedure) {
        self.confidence = previous.confidence;
        self.success_count = previous.success_count;
        self.failure_count = previous.failure_count;
        self.last_used = previous.last_used;
        self.created_at = previous.created_at;
    }

    /// Text used to embed the procedure.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![self.name.replace('_', " "), self.trigger_pattern.clone()];
        if !self.description.is_empty() {
            parts.push(self.description.clone());
        }
        if !self.trigger_keywords.is_empty() {
            parts.push(self.trigger_keywords.join(" "));
        }
        parts.join(". ")
    }
}

impl Scoped for Procedure {
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

fn clamp_confidence(v: f32, floor: f32) -> f32 {
    if v.is_nan() {
        floor
    } else {
        v.clamp(floor, CONFIDENCE_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> Procedure {
        Procedure::new(
            ProcedureKind::EmailPattern,
            "out_of_office",
            "sender is away",
            ActionType::Template,
            "email_agent",
            MemoryDomain::Email,
        )
    }

    #[test]
    fn test_id_is_deterministic() {
        assert_eq!(pattern().id, pattern().id);
        let other = Procedure::new(
            ProcedureKind::Workflow,
            "out_of_office",
            "t",
            ActionType::Workflow,
            "a",
            MemoryDomain::General,
        );
        assert_ne!(pattern().id, other.id);
    }

    #[test]
    fn test_success_rate() {
        let mut p = pattern();
        assert_eq!(p.success_rate(), 0.5);
        p.record_success(0.05);
        p.record_success(0.05);
        p.record_failure(0.1, CONFIDENCE_FLOOR);
        assert!((p.success_rate() - 2.0 / 3.0).abs() < 1e-6);
        assert!(p.last_used.is_some());
    }

    #[test]
    fn test_confidence_bounds() {
        let mut p = pattern().with_confidence(0.98);
        p.record_success(0.05);
        assert_eq!(p.confidence, CONFIDENCE_CEILING);

        let mut p = pattern().with_confidence(0.15);
        p.record_failure(0.1, CONFIDENCE_FLOOR);
        assert_eq!(p.confidence, CONFIDENCE_FLOOR);

        assert_eq!(pattern().with_confidence(0.0).confidence, CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_matched_keywords_case_insensitive() {
        let p = pattern().with_keywords(["Vacation", "away", "ooo"]);
        let hits = p.matched_keywords("I am AWAY on vacation until Monday");
        assert_eq!(hits, vec!["Vacation".to_string(), "away".to_string()]);
    }

    #[test]
    fn test_inherit_history() {
        let mut old = pattern();
        old.record_success(0.05);
        let mut fresh = pattern().with_template("new body");
        fresh.inherit_history(&old);
        assert_eq!(fresh.success_count, 1);
        assert_eq!(fresh.confidence, old.confidence);
        assert_eq!(fresh.action_template.as_deref(), Some("new body"));
    }
}
