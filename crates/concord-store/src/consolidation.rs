//! Promotion of session state into long-term memory.
//!
//! Consolidation is best-effort. Every write is attempted; failures are
//! collected in the report and nothing already written is rolled back.
//! Working memory is left intact, so a failed run can be retried.

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use concord_memory::Interaction;
use concord_session::{CompletedTask, TrackedEntities};
use concord_types::{CONTACT_TYPE, EntityProfile, Id, MemoryDomain, MemoryScope};

use crate::error::Result;
use crate::store::SharedStore;

/// Importance of the session summary record.
pub const SUMMARY_IMPORTANCE: f32 = 0.6;
/// Importance of each completed-task record.
pub const TASK_IMPORTANCE: f32 = 0.5;

/// What a consolidation run wrote.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsolidationReport {
    pub session_id: String,
    pub summary_id: Option<Id>,
    pub task_ids: Vec<Id>,
    /// Existing entities whose mention count was bumped.
    pub entities_mentioned: usize,
    /// Tracked entities that had no profile yet.
    pub entities_created: usize,
    /// Working memory slots removed afterwards (`end_session` only).
    pub cleared_slots: usize,
    pub errors: Vec<String>,
}

impl ConsolidationReport {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            ..Self::default()
        }
    }

    /// Episodic records written.
    pub fn records_written(&self) -> usize {
        usize::from(self.summary_id.is_some()) + self.task_ids.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl SharedStore {
    /// Write a session's working state into episodic and semantic memory.
    ///
    /// Produces one summary record (when the session holds anything), one
    /// record per completed task, and bumps `mention_count` on every tracked
    /// entity, creating profiles that do not exist yet. Records are
    /// Domain-scoped in the agent's registered domain.
    ///
    /// Fails only when `agent_id` is unregistered, before anything is written.
    pub async fn consolidate_session(
        &self,
        session_id: &str,
        agent_id: &str,
    ) -> Result<ConsolidationReport> {
        self.registry.touch(agent_id);
        let domain = self.resolve_domain(agent_id, None)?;
        let mut report = ConsolidationReport::new(session_id);

        let context = self.working.context(session_id);
        let scratchpad = self.working.scratchpad(session_id);
        let tasks = self.working.completed_tasks(session_id);
        let entities = self.working.tracked_entities(session_id);

        if let Some(summary) = summarize(session_id, context.as_ref(), &scratchpad, &tasks, &entities)
        {
            let interaction = Interaction::new(summary, agent_id, domain)
                .with_scope(MemoryScope::Domain)
                .with_session(session_id)
                .with_importance(SUMMARY_IMPORTANCE)
                .with_entities(entity_refs(&entities))
                .with_metadata(kind("session_summary"));
            match self.episodic.add_interaction(interaction).await {
                Ok(id) => report.summary_id = Some(id),
                Err(e) => report.errors.push(format!("session summary: {e}")),
            }
        }

        for task in &tasks {
            match self.write_task(session_id, agent_id, domain, task).await {
                Ok(id) => report.task_ids.push(id),
                Err(e) => report.errors.push(format!("task record: {e}")),
            }
        }

        for (entity_type, by_id) in &entities {
            for (entity_id, data) in by_id {
                match self.mention_entity(entity_type, entity_id, data).await {
                    Ok(true) => report.entities_mentioned += 1,
                    Ok(false) => report.entities_created += 1,
                    Err(e) => report
                        .errors
                        .push(format!("entity {entity_type}/{entity_id}: {e}")),
                }
            }
        }

        if report.is_clean() {
            info!(
                session = session_id,
                agent = agent_id,
                records = report.records_written(),
                mentioned = report.entities_mentioned,
                created = report.entities_created,
                "Consolidated session"
            );
        } else {
            warn!(
                session = session_id,
                agent = agent_id,
                records = report.records_written(),
                errors = report.errors.len(),
                "Consolidated session with errors"
            );
        }
        Ok(report)
    }

    /// Consolidate, then drop the session's working memory.
    pub async fn end_session(&self, session_id: &str, agent_id: &str) -> Result<ConsolidationReport> {
        let mut report = self.consolidate_session(session_id, agent_id).await?;
        report.cleared_slots = self.working.clear_session(session_id);
        Ok(report)
    }

    async fn write_task(
        &self,
        session_id: &str,
        agent_id: &str,
        domain: MemoryDomain,
        task: &CompletedTask,
    ) -> concord_memory::Result<Id> {
        let mut content = format!("Completed task: {}", render(&task.task));
        if let Some(ref result) = task.result {
            content.push_str(&format!("\nResult: {}", render(result)));
        }
        let mut metadata = kind("task");
        metadata.insert("started_at".to_string(), json!(task.started_at.to_rfc3339()));
        metadata.insert(
            "completed_at".to_string(),
            json!(task.completed_at.to_rfc3339()),
        );

        let interaction = Interaction::new(content, agent_id, domain)
            .with_scope(MemoryScope::Domain)
            .with_session(session_id)
            .with_importance(TASK_IMPORTANCE)
            .with_metadata(metadata);
        self.episodic.add_interaction(interaction).await
    }

    /// Bump an entity's mention count. Returns `false` when the profile had
    /// to be created.
    async fn mention_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        data: &Map<String, Value>,
    ) -> concord_memory::Result<bool> {
        let mut profile = if entity_type == CONTACT_TYPE {
            EntityProfile::contact(entity_id, None)
        } else {
            EntityProfile::new(entity_type, entity_id)
        };
        if self.semantic.increment_mention(profile.id).await? {
            return Ok(true);
        }

        let mut attributes = data.clone();
        attributes.remove("last_mentioned");
        profile.merge_attributes(attributes);
        profile.mention();
        self.semantic.add_entity(profile).await?;
        Ok(false)
    }
}

fn kind(value: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("kind".to_string(), json!(value));
    metadata
}

/// Strings render bare; anything else as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn entity_refs(entities: &TrackedEntities) -> Vec<String> {
    entities
        .iter()
        .flat_map(|(entity_type, by_id)| by_id.keys().map(move |id| format!("{entity_type}:{id}")))
        .collect()
}

/// Summary text, or `None` when the session holds nothing worth keeping.
fn summarize(
    session_id: &str,
    context: Option<&Value>,
    scratchpad: &str,
    tasks: &[CompletedTask],
    entities: &TrackedEntities,
) -> Option<String> {
    let context = context.filter(|c| !c.is_null());
    if context.is_none() && scratchpad.is_empty() && tasks.is_empty() && entities.is_empty() {
        return None;
    }

    let mut lines = vec![format!("Session {session_id} summary")];
    if let Some(context) = context {
        lines.push(format!("Context: {}", render(context)));
    }
    if !scratchpad.is_empty() {
        lines.push(format!("Notes: {}", scratchpad.replace('\n', "; ")));
    }
    if !tasks.is_empty() {
        let names: Vec<String> = tasks.iter().map(|t| render(&t.task)).collect();
        lines.push(format!("Completed tasks ({}): {}", tasks.len(), names.join(", ")));
    }
    if !entities.is_empty() {
        lines.push(format!("Entities: {}", entity_refs(entities).join(", ")));
    }
    Some(lines.join("\n"))
}
