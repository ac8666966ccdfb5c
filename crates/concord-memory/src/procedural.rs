//! Procedural memory: learned trigger→action patterns.
//!
//! Procedures are keyed by `"<kind>_<name>"`, so registering the same name
//! twice updates one procedure. Confidence moves with outcome feedback:
//! successes nudge it up, failures pull it down harder.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use concord_embed::SharedEmbedder;
use concord_types::{
    ActionType, CONFIDENCE_FLOOR, Id, MemoryDomain, MemoryScope, Procedure, ProcedureKind, Viewer,
};

use crate::error::{MemoryError, Result};
use crate::filter::{Condition, Filter, Range};
use crate::index::{PROCEDURE_COLLECTION, Point, SharedIndex, from_payload, to_payload};
use crate::records::soft;
use crate::validation::validate_procedure;

/// Learning and matching tuning.
#[derive(Debug, Clone)]
pub struct ProceduralConfig {
    /// Confidence gained per success.
    pub success_step: f32,
    /// Confidence lost per failure.
    pub failure_step: f32,
    pub confidence_floor: f32,
    /// Minimum confidence for a procedure to be considered a match.
    pub match_floor: f32,
    /// Score added per trigger keyword found in the context.
    pub keyword_bonus: f32,
    /// Upper bound of the success-rate bonus.
    pub success_bonus_cap: f32,
}

impl Default for ProceduralConfig {
    fn default() -> Self {
        Self {
            success_step: 0.05,
            failure_step: 0.1,
            confidence_floor: CONFIDENCE_FLOOR,
            match_floor: 0.3,
            keyword_bonus: 0.1,
            success_bonus_cap: 0.2,
        }
    }
}

/// Narrowing for procedure lookups.
#[derive(Debug, Clone, Default)]
pub struct ProcedureQuery {
    /// Full visibility rule for a resolved agent.
    pub viewer: Option<Viewer>,
    /// Own procedures plus Global ones (and Domain ones of `domain`).
    pub agent_id: Option<String>,
    /// Exactly this owner.
    pub owner: Option<String>,
    pub domain: Option<MemoryDomain>,
    pub kind: Option<ProcedureKind>,
    pub min_confidence: Option<f32>,
}

impl ProcedureQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible_to(mut self, viewer: Viewer) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn for_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn owned_by(mut self, agent_id: impl Into<String>) -> Self {
        self.owner = Some(agent_id.into());
        self
    }

    pub fn in_domain(mut self, domain: MemoryDomain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn of_kind(mut self, kind: ProcedureKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn min_confidence(mut self, confidence: f32) -> Self {
        self.min_confidence = Some(confidence);
        self
    }

    /// The same query with access narrowing removed.
    pub fn without_access(&self) -> Self {
        Self {
            viewer: None,
            agent_id: None,
            ..self.clone()
        }
    }

    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(domain) = self.domain {
            filter = filter.must(Condition::eq("domain", domain.as_str()));
        }
        if let Some(kind) = self.kind {
            filter = filter.must(Condition::eq("kind", kind.as_str()));
        }
        if let Some(ref owner) = self.owner {
            filter = filter.must(Condition::eq("agent_id", owner.as_str()));
        }
        if let Some(min) = self.min_confidence {
            filter = filter.must(Condition::range("confidence", Range::at_least(f64::from(min))));
        }
        let access = match (&self.viewer, &self.agent_id) {
            (Some(viewer), _) => Filter::visible_to(viewer),
            (None, Some(agent_id)) => Filter::owned_or_shared(agent_id, self.domain),
            (None, None) => Filter::new(),
        };
        filter.and(access)
    }
}

/// A procedure ranked against a context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureMatch {
    pub procedure: Procedure,
    pub score: f32,
    pub matched_keywords: Vec<String>,
}

/// Fields to change on an existing procedure.
#[derive(Debug, Clone, Default)]
pub struct ProcedurePatch {
    pub description: Option<String>,
    pub trigger_pattern: Option<String>,
    pub trigger_keywords: Option<Vec<String>>,
    pub trigger_conditions: Option<Map<String, Value>>,
    pub action_steps: Option<Vec<Value>>,
    pub action_template: Option<String>,
    pub scope: Option<MemoryScope>,
    pub confidence: Option<f32>,
}

impl ProcedurePatch {
    fn apply(self, procedure: &mut Procedure) {
        if let Some(v) = self.description {
            procedure.description = v;
        }
        if let Some(v) = self.trigger_pattern {
            procedure.trigger_pattern = v;
        }
        if let Some(v) = self.trigger_keywords {
            procedure.trigger_keywords = v;
        }
        if let Some(v) = self.trigger_conditions {
            procedure.trigger_conditions = v;
        }
        if let Some(v) = self.action_steps {
            procedure.action_steps = v;
        }
        if let Some(v) = self.action_template {
            procedure.action_template = Some(v);
        }
        if let Some(v) = self.scope {
            procedure.scope = v;
        }
        if let Some(v) = self.confidence {
            procedure.confidence = v;
        }
        procedure.updated_at = concord_types::now();
    }
}

/// Store of procedures with outcome-driven confidence.
pub struct ProceduralMemory {
    index: SharedIndex,
    embedder: SharedEmbedder,
    config: ProceduralConfig,
}

impl ProceduralMemory {
    pub fn new(index: SharedIndex, embedder: SharedEmbedder) -> Result<Self> {
        index.ensure_collection(PROCEDURE_COLLECTION, embedder.dimensions())?;
        Ok(Self {
            index,
            embedder,
            config: ProceduralConfig::default(),
        })
    }

    pub fn with_config(mut self, config: ProceduralConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ProceduralConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a procedure. Re-registering an existing id keeps its learned
    /// statistics and replaces its definition.
    ///
    /// Only the owner may re-register: an id held by another agent fails
    /// with [`MemoryError::NotOwner`] and the stored procedure is untouched.
    pub async fn add_procedure(&self, mut procedure: Procedure) -> Result<Id> {
        validate_procedure(&procedure)?;
        if let Some((existing, _)) = self.load(procedure.id)? {
            if existing.agent_id != procedure.agent_id {
                warn!(
                    id = %procedure.id,
                    owner = %existing.agent_id,
                    caller = %procedure.agent_id,
                    "Refused to re-register another agent's procedure"
                );
                return Err(MemoryError::NotOwner {
                    id: existing.id,
                    owner: existing.agent_id,
                });
            }
            procedure.inherit_history(&existing);
            debug!(id = %procedure.id, name = %procedure.name, "Re-registering procedure");
        }
        self.store(&procedure, None).await?;
        info!(id = %procedure.id, kind = procedure.kind.as_str(), name = %procedure.name, "Stored procedure");
        Ok(procedure.id)
    }

    /// Register an email response pattern, shared within the Email domain.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_email_pattern(
        &self,
        name: &str,
        description: &str,
        trigger_pattern: &str,
        keywords: &[&str],
        response_template: &str,
        conditions: Option<Map<String, Value>>,
        agent_id: &str,
    ) -> Result<Id> {
        let procedure = Procedure::new(
            ProcedureKind::EmailPattern,
            name,
            trigger_pattern,
            ActionType::Template,
            agent_id,
            MemoryDomain::Email,
        )
        .with_description(description)
        .with_keywords(keywords.iter().copied())
        .with_template(response_template)
        .with_conditions(conditions.unwrap_or_default())
        .with_scope(MemoryScope::Domain);
        self.add_procedure(procedure).await
    }

    /// Register a multi-step workflow.
    pub async fn create_workflow(
        &self,
        name: &str,
        description: &str,
        trigger_pattern: &str,
        steps: Vec<Value>,
        domain: MemoryDomain,
        agent_id: &str,
    ) -> Result<Id> {
        let procedure = Procedure::new(
            ProcedureKind::Workflow,
            name,
            trigger_pattern,
            ActionType::Workflow,
            agent_id,
            domain,
        )
        .with_description(description)
        .with_steps(steps);
        self.add_procedure(procedure).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn search(&self, query: &str, limit: usize, params: &ProcedureQuery) -> Vec<Procedure> {
        soft(
            self.search_inner(query, limit, params).await,
            "Procedure search",
            Vec::new(),
        )
    }

    async fn search_inner(
        &self,
        query: &str,
        limit: usize,
        params: &ProcedureQuery,
    ) -> Result<Vec<Procedure>> {
        let vector = self.embedder.embed(query).await?;
        self.index
            .query(PROCEDURE_COLLECTION, &vector, &params.to_filter(), limit)?
            .into_iter()
            .map(|hit| from_payload(hit.payload))
            .collect()
    }

    /// Procedures applicable to `context`, best first.
    ///
    /// Candidates come from a similarity search limited to confidence at or
    /// above the match floor. Each is scored as
    /// `confidence + keyword_bonus * keyword_hits + min(cap, success_rate * cap)`,
    /// so an exact keyword hit can outrank a vaguer but more trusted pattern.
    pub async fn find_matching_procedures(
        &self,
        context: &str,
        params: &ProcedureQuery,
        limit: usize,
    ) -> Vec<ProcedureMatch> {
        let floor = params
            .min_confidence
            .map_or(self.config.match_floor, |m| m.max(self.config.match_floor));
        let params = params.clone().min_confidence(floor);

        let mut matches: Vec<ProcedureMatch> = self
            .search(context, limit, &params)
            .await
            .into_iter()
            .map(|procedure| self.score(procedure, context))
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches
    }

    fn score(&self, procedure: Procedure, context: &str) -> ProcedureMatch {
        let matched_keywords = procedure.matched_keywords(context);
        let cap = self.config.success_bonus_cap;
        let score = procedure.confidence
            + self.config.keyword_bonus * matched_keywords.len() as f32
            + (procedure.success_rate() * cap).min(cap);
        ProcedureMatch {
            procedure,
            score,
            matched_keywords,
        }
    }

    pub fn get(&self, id: Id) -> Option<Procedure> {
        soft(self.load(id), "Procedure get", None).map(|(p, _)| p)
    }

    /// Email patterns at or above `min_confidence`.
    pub fn get_email_patterns(&self, params: &ProcedureQuery, min_confidence: f32) -> Vec<Procedure> {
        let params = params
            .clone()
            .of_kind(ProcedureKind::EmailPattern)
            .min_confidence(min_confidence);
        self.scan(&params)
    }

    pub fn get_workflows(&self, params: &ProcedureQuery) -> Vec<Procedure> {
        self.scan(&params.clone().of_kind(ProcedureKind::Workflow))
    }

    pub fn count(&self, params: &ProcedureQuery) -> usize {
        soft(
            self.index.count(PROCEDURE_COLLECTION, &params.to_filter()),
            "Procedure count",
            0,
        )
    }

    fn scan(&self, params: &ProcedureQuery) -> Vec<Procedure> {
        soft(
            self.index
                .scroll(PROCEDURE_COLLECTION, &params.to_filter(), usize::MAX)
                .and_then(|points| {
                    points
                        .into_iter()
                        .map(|p| from_payload(p.payload))
                        .collect::<Result<Vec<Procedure>>>()
                }),
            "Procedure scan",
            Vec::new(),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns `false` when no procedure has this id.
    pub async fn update(&self, id: Id, patch: ProcedurePatch) -> Result<bool> {
        let Some((mut procedure, vector)) = self.load(id)? else {
            return Ok(false);
        };
        let before = procedure.embedding_text();
        patch.apply(&mut procedure);
        validate_procedure(&procedure)?;

        let keep = (procedure.embedding_text() == before).then_some(vector);
        self.store(&procedure, keep).await?;
        Ok(true)
    }

    /// Returns `false` when no procedure has this id.
    pub fn delete(&self, id: Id) -> Result<bool> {
        Ok(self.index.delete(PROCEDURE_COLLECTION, &[id])? > 0)
    }

    /// Reinforce after a successful use. `None` when the id is unknown.
    pub async fn record_success(&self, id: Id) -> Result<Option<Procedure>> {
        let step = self.config.success_step;
        self.record_outcome(id, |p| p.record_success(step)).await
    }

    /// Penalize after a failed use. `None` when the id is unknown.
    pub async fn record_failure(&self, id: Id) -> Result<Option<Procedure>> {
        let (step, floor) = (self.config.failure_step, self.config.confidence_floor);
        self.record_outcome(id, |p| p.record_failure(step, floor))
            .await
    }

    async fn record_outcome(
        &self,
        id: Id,
        apply: impl FnOnce(&mut Procedure),
    ) -> Result<Option<Procedure>> {
        let Some((mut procedure, vector)) = self.load(id)? else {
            return Ok(None);
        };
        apply(&mut procedure);
        self.store(&procedure, Some(vector)).await?;
        debug!(
            id = %id,
            confidence = procedure.confidence,
            successes = procedure.success_count,
            failures = procedure.failure_count,
            "Recorded procedure outcome"
        );
        Ok(Some(procedure))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn load(&self, id: Id) -> Result<Option<(Procedure, Vec<f32>)>> {
        match self.index.retrieve(PROCEDURE_COLLECTION, &[id])?.pop() {
            Some(point) => Ok(Some((from_payload(point.payload)?, point.vector))),
            None => Ok(None),
        }
    }

    async fn store(&self, procedure: &Procedure, vector: Option<Vec<f32>>) -> Result<()> {
        let vector = match vector {
            Some(v) => v,
            None => self.embedder.embed(&procedure.embedding_text()).await?,
        };
        self.index.upsert(
            PROCEDURE_COLLECTION,
            Point::new(procedure.id, vector, to_payload(procedure)?),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use concord_embed::HashEmbedder;
    use serde_json::json;

    use crate::index::InMemoryIndex;

    fn store() -> ProceduralMemory {
        ProceduralMemory::new(Arc::new(InMemoryIndex::new()), Arc::new(HashEmbedder::new(64))).unwrap()
    }

    async fn out_of_office(memory: &ProceduralMemory) -> Id {
        memory
            .create_email_pattern(
                "out_of_office",
                "Auto reply while away",
                "sender asks for a reply while I am on vacation",
                &["vacation", "away"],
                "I'm out of the office until {return_date}.",
                None,
                "email_agent",
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_email_pattern_is_idempotent() {
        let memory = store();
        let first = out_of_office(&memory).await;
        let second = out_of_office(&memory).await;
        assert_eq!(first, second);

        let patterns = memory.get_email_patterns(&ProcedureQuery::new().owned_by("email_agent"), 0.0);
        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.action_type, ActionType::Template);
        assert_eq!(p.scope, MemoryScope::Domain);
        assert_eq!(p.domain, MemoryDomain::Email);
        assert!(memory.get_email_patterns(&ProcedureQuery::new(), 0.9).is_empty());
    }

    #[tokio::test]
    async fn test_confidence_learning() {
        let memory = store();
        let id = out_of_office(&memory).await;

        for _ in 0..3 {
            memory.record_success(id).await.unwrap();
        }
        let p = memory.get(id).unwrap();
        assert!((p.confidence - 0.65).abs() < 1e-5);
        assert_eq!(p.success_count, 3);
        assert!(p.last_used.is_some());

        let p = memory.record_failure(id).await.unwrap().unwrap();
        assert!((p.confidence - 0.55).abs() < 1e-5);
        assert_eq!(p.failure_count, 1);

        for _ in 0..20 {
            memory.record_success(id).await.unwrap();
        }
        assert_eq!(memory.get(id).unwrap().confidence, 1.0);
        for _ in 0..20 {
            memory.record_failure(id).await.unwrap();
        }
        assert!((memory.get(id).unwrap().confidence - 0.1).abs() < 1e-6);

        assert!(memory.record_success(concord_types::new_id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reregistration_keeps_history() {
        let memory = store();
        let id = out_of_office(&memory).await;
        memory.record_success(id).await.unwrap();

        memory
            .create_email_pattern(
                "out_of_office",
                "Updated wording",
                "vacation auto reply",
                &["vacation"],
                "Back on {return_date}.",
                None,
                "email_agent",
            )
            .await
            .unwrap();
        let p = memory.get(id).unwrap();
        assert_eq!(p.description, "Updated wording");
        assert_eq!(p.success_count, 1);
        assert!((p.confidence - 0.55).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_reregistration_by_other_agent_is_refused() {
        let memory = store();
        let id = memory
            .create_workflow(
                "pay_bills",
                "Monthly bills",
                "first of the month",
                vec![json!("pay rent")],
                MemoryDomain::Finance,
                "finance_agent",
            )
            .await
            .unwrap();
        memory.record_success(id).await.unwrap();

        let taken = memory
            .create_workflow(
                "pay_bills",
                "Monthly bills",
                "first of the month",
                vec![json!("wire everything elsewhere")],
                MemoryDomain::Email,
                "email_agent",
            )
            .await;
        assert!(matches!(
            taken,
            Err(MemoryError::NotOwner { id: clash, ref owner }) if clash == id && owner == "finance_agent"
        ));

        let p = memory.get(id).unwrap();
        assert_eq!(p.agent_id, "finance_agent");
        assert_eq!(p.domain, MemoryDomain::Finance);
        assert_eq!(p.action_steps, vec![json!("pay rent")]);
        assert_eq!(p.success_count, 1);
    }

    #[tokio::test]
    async fn test_keyword_hits_outrank_confidence() {
        let memory = store();
        let trusted = Procedure::new(
            ProcedureKind::Procedure,
            "invoice_followup",
            "follow up on unpaid invoice",
            ActionType::Sequence,
            "finance_agent",
            MemoryDomain::Finance,
        )
        .with_confidence(0.7)
        .with_scope(MemoryScope::Global);
        let exact = Procedure::new(
            ProcedureKind::Procedure,
            "invoice_reminder",
            "remind client about invoice",
            ActionType::Sequence,
            "finance_agent",
            MemoryDomain::Finance,
        )
        .with_keywords(["invoice", "overdue", "reminder"])
        .with_confidence(0.5)
        .with_scope(MemoryScope::Global);
        memory.add_procedure(trusted).await.unwrap();
        let exact_id = memory.add_procedure(exact).await.unwrap();

        let matches = memory
            .find_matching_procedures(
                "send an overdue invoice reminder",
                &ProcedureQuery::new().in_domain(MemoryDomain::Finance),
                5,
            )
            .await;
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].procedure.id, exact_id);
        assert_eq!(matches[0].matched_keywords.len(), 3);
        // 0.5 + 3 * 0.1 + 0.5 * 0.2
        assert!((matches[0].score - 0.9).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_match_floor_excludes_weak_procedures() {
        let memory = store();
        let weak = Procedure::new(
            ProcedureKind::Procedure,
            "feed_pet",
            "feed the dog",
            ActionType::Sequence,
            "pet_agent",
            MemoryDomain::Pet,
        )
        .with_confidence(0.2);
        memory.add_procedure(weak).await.unwrap();
        assert!(memory
            .find_matching_procedures("feed the dog", &ProcedureQuery::new(), 5)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_workflows_update_delete() {
        let memory = store();
        let id = memory
            .create_workflow(
                "weekly_report",
                "Compile the weekly sales report",
                "every friday afternoon",
                vec![json!({"step": "query sales"}), json!({"step": "email summary"})],
                MemoryDomain::General,
                "bi_agent",
            )
            .await
            .unwrap();

        let workflows = memory.get_workflows(&ProcedureQuery::new().in_domain(MemoryDomain::General));
        assert_eq!(workflows.len(), 1);
        assert_eq!(workflows[0].action_steps.len(), 2);

        let patch = ProcedurePatch {
            scope: Some(MemoryScope::Global),
            ..ProcedurePatch::default()
        };
        assert!(memory.update(id, patch).await.unwrap());
        assert_eq!(memory.get(id).unwrap().scope, MemoryScope::Global);
        assert!(!memory.update(concord_types::new_id(), ProcedurePatch::default()).await.unwrap());

        assert!(memory.delete(id).unwrap());
        assert!(memory.get(id).is_none());
    }

    #[tokio::test]
    async fn test_visibility_filter() {
        let memory = store();
        out_of_office(&memory).await;
        let email_peer = ProcedureQuery::new().visible_to(Viewer::new("email_agent_2", Some(MemoryDomain::Email)));
        let pet = ProcedureQuery::new().visible_to(Viewer::new("pet_agent", Some(MemoryDomain::Pet)));
        assert_eq!(memory.count(&email_peer), 1);
        assert_eq!(memory.count(&pet), 0);
    }
}
