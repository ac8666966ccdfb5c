//! The shared store: one handle over every memory component.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use concord_config::ConcordConfig;
use concord_embed::{EmbedderSpec, SharedEmbedder, build_embedder};
use concord_memory::{
    DecayConfig, DecayReport, EpisodicMemory, InMemoryIndex, Interaction, ProceduralConfig,
    ProceduralMemory, ProcedureQuery, RecordQuery, SemanticMemory, SharedIndex, SqliteIndex,
};
use concord_session::{WorkingMemory, WorkingMemoryConfig, WorkingMemoryStats};
use concord_types::{
    AgentRegistration, EntityProfile, Id, MemoryDomain, MemoryRecord, MemoryScope, Procedure,
};

use crate::error::{Result, StoreError};
use crate::policy::AccessPolicy;
use crate::registry::AgentRegistry;

/// Construction options for [`SharedStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub working: WorkingMemoryConfig,
    pub decay: DecayConfig,
    pub procedural: ProceduralConfig,
    /// Report withheld matches on recall.
    pub count_hidden: bool,
    /// Per-type recall limit when the caller gives none.
    pub default_limit: usize,
    /// Registry seed. Empty means the built-in agents.
    pub agents: Vec<AgentRegistration>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            working: WorkingMemoryConfig::default(),
            decay: DecayConfig::default(),
            procedural: ProceduralConfig::default(),
            count_hidden: true,
            default_limit: 5,
            agents: Vec::new(),
        }
    }
}

impl StoreOptions {
    /// Options described by a loaded configuration.
    pub fn from_config(config: &ConcordConfig) -> Self {
        let working = config.working();
        let mut working_config = WorkingMemoryConfig::new().with_max_slots(working.max_slots);
        if let Some(ttl) = working.default_ttl() {
            working_config = working_config.with_default_ttl(ttl);
        }

        let decay = config.decay();
        let procedural = config.procedural();
        Self {
            working: working_config,
            decay: DecayConfig {
                decay_rate: decay.decay_rate,
                min_importance: decay.min_importance,
                window_days: decay.window_days,
                batch_size: decay.batch_size,
            },
            procedural: ProceduralConfig {
                success_step: procedural.success_step,
                failure_step: procedural.failure_step,
                confidence_floor: procedural.confidence_floor,
                match_floor: procedural.match_floor,
                keyword_bonus: procedural.keyword_bonus,
                success_bonus_cap: procedural.success_bonus_cap,
            },
            count_hidden: config.store().count_hidden,
            default_limit: config.recall().default_limit,
            agents: config.agents.iter().map(|a| a.to_registration()).collect(),
        }
    }
}

/// Embedder description for a loaded configuration.
pub fn embedder_spec(config: &ConcordConfig) -> EmbedderSpec {
    let embedding = config.embedding();
    EmbedderSpec {
        provider: embedding.provider.clone(),
        dimensions: embedding.dimensions,
        openai_api_key: embedding.resolve_api_key(),
        openai_model: embedding.model.clone(),
        openai_base_url: embedding.base_url.clone(),
    }
}

/// Optional fields for [`SharedStore::remember_interaction`].
#[derive(Debug, Clone)]
pub struct RememberOptions {
    /// Defaults to the agent's registered domain.
    pub domain: Option<MemoryDomain>,
    pub scope: MemoryScope,
    pub session_id: Option<String>,
    pub importance: Option<f32>,
    pub entities: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl Default for RememberOptions {
    fn default() -> Self {
        Self {
            domain: None,
            scope: MemoryScope::Private,
            session_id: None,
            importance: None,
            entities: Vec::new(),
            metadata: Map::new(),
        }
    }
}

impl RememberOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_domain(mut self, domain: MemoryDomain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_scope(mut self, scope: MemoryScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outcome of a maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Working memory slots purged after expiry.
    pub expired_slots: usize,
    pub decay: DecayReport,
}

/// Point-in-time counts across the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub agents: usize,
    pub working: WorkingMemoryStats,
    pub episodic: usize,
    pub semantic: usize,
    pub entities: usize,
    pub procedures: usize,
    pub index: String,
    pub embedder: String,
}

/// Single entry point to working, episodic, semantic and procedural memory.
///
/// Construct one per process and pass it by reference (or inside an `Arc`)
/// to every consumer. Every operation taking an `agent_id` stamps that
/// agent's `last_active`, resolves its domain through the registry and
/// returns only what the agent may see.
pub struct SharedStore {
    pub(crate) working: WorkingMemory,
    pub(crate) episodic: EpisodicMemory,
    pub(crate) semantic: SemanticMemory,
    pub(crate) procedural: ProceduralMemory,
    pub(crate) registry: AgentRegistry,
    pub(crate) policy: AccessPolicy,
    pub(crate) options: StoreOptions,
    index: SharedIndex,
    embedder: SharedEmbedder,
}

impl SharedStore {
    /// Build a store over an index and embedder.
    pub fn new(index: SharedIndex, embedder: SharedEmbedder, options: StoreOptions) -> Result<Self> {
        let registry = if options.agents.is_empty() {
            AgentRegistry::with_defaults()
        } else {
            AgentRegistry::from_registrations(options.agents.clone())
        };

        let store = Self {
            working: WorkingMemory::new(options.working.clone()),
            episodic: EpisodicMemory::new(index.clone(), embedder.clone())?
                .with_decay(options.decay.clone()),
            semantic: SemanticMemory::new(index.clone(), embedder.clone())?,
            procedural: ProceduralMemory::new(index.clone(), embedder.clone())?
                .with_config(options.procedural.clone()),
            registry,
            policy: AccessPolicy,
            options,
            index,
            embedder,
        };
        info!(
            index = store.index.name(),
            embedder = store.embedder.name(),
            agents = store.registry.len(),
            "Shared store ready"
        );
        Ok(store)
    }

    /// Build a store from configuration: SQLite when a database path is
    /// configured, an in-process index otherwise.
    pub fn from_config(config: &ConcordConfig) -> Result<Self> {
        let embedder = build_embedder(&embedder_spec(config))?;
        let index: SharedIndex = match config.store().database_path() {
            Some(path) => {
                debug!(path = %path.display(), "Opening SQLite index");
                Arc::new(SqliteIndex::open(&path)?)
            }
            None => Arc::new(InMemoryIndex::new()),
        };
        Self::new(index, embedder, StoreOptions::from_config(config))
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Agent registry
    // ─────────────────────────────────────────────────────────────────────────

    pub fn register_agent(&self, registration: AgentRegistration) {
        self.registry.register(registration);
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<AgentRegistration> {
        self.registry.get(agent_id)
    }

    pub fn list_agents(&self, domain: Option<MemoryDomain>) -> Vec<AgentRegistration> {
        self.registry.list(domain)
    }

    /// Stamp `last_active`. Returns `false` for unregistered ids.
    pub fn update_agent_activity(&self, agent_id: &str) -> bool {
        self.registry.touch(agent_id)
    }

    /// The domain a write is tagged with: the explicit one, else the
    /// agent's registered domain.
    pub(crate) fn resolve_domain(
        &self,
        agent_id: &str,
        explicit: Option<MemoryDomain>,
    ) -> Result<MemoryDomain> {
        explicit
            .or_else(|| self.registry.domain_of(agent_id))
            .ok_or_else(|| StoreError::UnknownAgent(agent_id.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Record an interaction in episodic memory.
    pub async fn remember_interaction(
        &self,
        agent_id: &str,
        content: &str,
        options: RememberOptions,
    ) -> Result<Id> {
        self.registry.touch(agent_id);
        let domain = self.resolve_domain(agent_id, options.domain)?;

        let mut interaction = Interaction::new(content, agent_id, domain)
            .with_scope(options.scope)
            .with_entities(options.entities)
            .with_metadata(options.metadata);
        if let Some(session_id) = options.session_id {
            interaction = interaction.with_session(session_id);
        }
        if let Some(importance) = options.importance {
            interaction = interaction.with_importance(importance);
        }
        Ok(self.episodic.add_interaction(interaction).await?)
    }

    /// Record a fact in semantic memory.
    pub async fn learn_fact(
        &self,
        agent_id: &str,
        content: &str,
        scope: MemoryScope,
        category: Option<&str>,
        domain: Option<MemoryDomain>,
    ) -> Result<Id> {
        self.registry.touch(agent_id);
        let domain = self.resolve_domain(agent_id, domain)?;
        Ok(self
            .semantic
            .add_fact(content, agent_id, domain, scope, category)
            .await?)
    }

    /// Record a preference, visible to every agent.
    pub async fn learn_preference(
        &self,
        agent_id: &str,
        content: &str,
        category: &str,
        domain: Option<MemoryDomain>,
    ) -> Result<Id> {
        self.registry.touch(agent_id);
        let domain = self.resolve_domain(agent_id, domain)?;
        Ok(self
            .semantic
            .add_preference(content, category, agent_id, domain)
            .await?)
    }

    /// Preferences visible to `agent_id`, optionally of one category.
    pub fn get_preferences(
        &self,
        agent_id: &str,
        category: Option<&str>,
        domain: Option<MemoryDomain>,
    ) -> Vec<MemoryRecord> {
        self.registry.touch(agent_id);
        let viewer = self.registry.viewer(agent_id);
        let mut params = RecordQuery::new().visible_to(viewer.clone());
        params.domain = domain;
        let found = self
            .semantic
            .get_preferences(category, &params, usize::MAX);
        self.policy.retain_visible(&viewer, found).0
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Record lookup
    // ─────────────────────────────────────────────────────────────────────────

    /// An episodic or semantic record, if `agent_id` may see it.
    pub fn get_memory(&self, agent_id: &str, id: Id) -> Option<MemoryRecord> {
        self.registry.touch(agent_id);
        let (mut record, episodic) = self.peek_memory(id)?;
        let viewer = self.registry.viewer(agent_id);
        if !self.policy.can_access(&viewer, &record) {
            debug!(agent = agent_id, id = %id, "Withheld record from caller");
            return None;
        }
        if episodic {
            self.episodic.touch(&mut record);
        } else {
            self.semantic.touch(&mut record);
        }
        Some(record)
    }

    /// An episodic or semantic record, untouched, and whether it is episodic.
    fn peek_memory(&self, id: Id) -> Option<(MemoryRecord, bool)> {
        match self.episodic.peek(id) {
            Some(record) => Some((record, true)),
            None => self.semantic.peek(id).map(|record| (record, false)),
        }
    }

    /// Delete an episodic or semantic record owned by `agent_id`.
    ///
    /// Returns `Ok(false)` when no record has this id.
    pub fn delete_memory(&self, agent_id: &str, id: Id) -> Result<bool> {
        self.registry.touch(agent_id);
        let Some((record, episodic)) = self.peek_memory(id) else {
            return Ok(false);
        };
        if record.agent_id != agent_id {
            return Err(StoreError::AccessDenied {
                agent_id: agent_id.to_string(),
                id,
            });
        }
        let deleted = if episodic {
            self.episodic.delete(id)?
        } else {
            self.semantic.delete(id)?
        };
        if deleted {
            info!(agent = agent_id, id = %id, "Deleted memory");
        }
        Ok(deleted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Procedures
    // ─────────────────────────────────────────────────────────────────────────

    /// Register an email response pattern for `agent_id`.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_email_pattern(
        &self,
        agent_id: &str,
        name: &str,
        description: &str,
        trigger_pattern: &str,
        keywords: &[&str],
        response_template: &str,
        conditions: Option<Map<String, Value>>,
    ) -> Result<Id> {
        self.registry.touch(agent_id);
        self.procedural
            .create_email_pattern(
                name,
                description,
                trigger_pattern,
                keywords,
                response_template,
                conditions,
                agent_id,
            )
            .await
            .map_err(|e| StoreError::for_caller(agent_id, e))
    }

    /// Register a workflow in `domain`, or the agent's own domain.
    pub async fn add_workflow(
        &self,
        agent_id: &str,
        name: &str,
        description: &str,
        trigger_pattern: &str,
        steps: Vec<Value>,
        domain: Option<MemoryDomain>,
    ) -> Result<Id> {
        self.registry.touch(agent_id);
        let domain = self.resolve_domain(agent_id, domain)?;
        self.procedural
            .create_workflow(name, description, trigger_pattern, steps, domain, agent_id)
            .await
            .map_err(|e| StoreError::for_caller(agent_id, e))
    }

    /// Store a fully specified procedure. The caller must own it.
    pub async fn add_procedure(&self, agent_id: &str, procedure: Procedure) -> Result<Id> {
        self.registry.touch(agent_id);
        if procedure.agent_id != agent_id {
            return Err(StoreError::AccessDenied {
                agent_id: agent_id.to_string(),
                id: procedure.id,
            });
        }
        self.procedural
            .add_procedure(procedure)
            .await
            .map_err(|e| StoreError::for_caller(agent_id, e))
    }

    /// Email patterns visible to `agent_id` at or above `min_confidence`.
    pub fn get_email_patterns(&self, agent_id: &str, min_confidence: f32) -> Vec<Procedure> {
        self.registry.touch(agent_id);
        let viewer = self.registry.viewer(agent_id);
        let found = self.procedural.get_email_patterns(
            &ProcedureQuery::new().visible_to(viewer.clone()),
            min_confidence,
        );
        self.policy.retain_visible(&viewer, found).0
    }

    /// Workflows visible to `agent_id`, optionally in one domain.
    pub fn get_workflows(&self, agent_id: &str, domain: Option<MemoryDomain>) -> Vec<Procedure> {
        self.registry.touch(agent_id);
        let viewer = self.registry.viewer(agent_id);
        let mut params = ProcedureQuery::new().visible_to(viewer.clone());
        params.domain = domain;
        let found = self.procedural.get_workflows(&params);
        self.policy.retain_visible(&viewer, found).0
    }

    /// Apply outcome feedback to a procedure `agent_id` can see.
    pub async fn record_procedure_outcome(
        &self,
        agent_id: &str,
        procedure_id: Id,
        success: bool,
    ) -> Result<Procedure> {
        self.registry.touch(agent_id);
        let procedure = self
            .procedural
            .get(procedure_id)
            .ok_or_else(|| StoreError::NotFound(format!("procedure {procedure_id}")))?;
        let viewer = self.registry.viewer(agent_id);
        if !self.policy.can_access(&viewer, &procedure) {
            return Err(StoreError::AccessDenied {
                agent_id: agent_id.to_string(),
                id: procedure_id,
            });
        }

        let updated = if success {
            self.procedural.record_success(procedure_id).await?
        } else {
            self.procedural.record_failure(procedure_id).await?
        };
        let updated =
            updated.ok_or_else(|| StoreError::NotFound(format!("procedure {procedure_id}")))?;
        info!(
            agent = agent_id,
            procedure = %updated.name,
            success,
            confidence = updated.confidence,
            "Recorded procedure outcome"
        );
        Ok(updated)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entities and contacts
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn add_entity(&self, agent_id: &str, entity: EntityProfile) -> Result<Id> {
        self.registry.touch(agent_id);
        Ok(self.semantic.add_entity(entity).await?)
    }

    pub fn get_entity(&self, agent_id: &str, id: Id) -> Option<EntityProfile> {
        self.registry.touch(agent_id);
        self.semantic.get_entity(id)
    }

    pub async fn search_entities(
        &self,
        agent_id: &str,
        query: &str,
        entity_type: Option<&str>,
        limit: usize,
    ) -> Vec<EntityProfile> {
        self.registry.touch(agent_id);
        self.semantic.search_entities(query, entity_type, limit).await
    }

    pub async fn add_relationship(
        &self,
        agent_id: &str,
        from: Id,
        relation: &str,
        to: Id,
    ) -> Result<bool> {
        self.registry.touch(agent_id);
        Ok(self.semantic.add_relationship(from, relation, to).await?)
    }

    pub fn get_related_entities(
        &self,
        agent_id: &str,
        id: Id,
        relation: Option<&str>,
    ) -> Vec<EntityProfile> {
        self.registry.touch(agent_id);
        self.semantic.get_related_entities(id, relation)
    }

    pub async fn add_contact(
        &self,
        agent_id: &str,
        email: &str,
        name: Option<&str>,
        attributes: Map<String, Value>,
    ) -> Result<Id> {
        self.registry.touch(agent_id);
        Ok(self.semantic.add_contact(email, name, attributes).await?)
    }

    pub fn get_contact(&self, agent_id: &str, email: &str) -> Option<EntityProfile> {
        self.registry.touch(agent_id);
        self.semantic.get_contact(email)
    }

    pub async fn update_contact(
        &self,
        agent_id: &str,
        email: &str,
        patch: Map<String, Value>,
    ) -> Result<bool> {
        self.registry.touch(agent_id);
        Ok(self.semantic.update_contact(email, patch).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Working memory
    // ─────────────────────────────────────────────────────────────────────────

    /// Set a session slot. `ttl_minutes` of zero expires at the next read.
    pub fn session_set(
        &self,
        session_id: &str,
        key: &str,
        value: Value,
        ttl_minutes: Option<u64>,
    ) -> Result<()> {
        let ttl = ttl_minutes.map(|m| Duration::from_secs(m.saturating_mul(60)));
        Ok(self.working.set(session_id, key, value, ttl)?)
    }

    pub fn session_get(&self, session_id: &str, key: &str, default: Value) -> Value {
        self.working.get_or(session_id, key, default)
    }

    pub fn session_delete(&self, session_id: &str, key: &str) -> bool {
        self.working.delete(session_id, key)
    }

    pub fn session_get_all(&self, session_id: &str) -> std::collections::BTreeMap<String, Value> {
        self.working.get_all(session_id)
    }

    pub fn session_clear(&self, session_id: &str) -> usize {
        self.working.clear_session(session_id)
    }

    pub fn session_append_scratchpad(&self, session_id: &str, note: &str) -> Result<()> {
        Ok(self.working.append_scratchpad(session_id, note)?)
    }

    pub fn session_set_task(&self, session_id: &str, task: Value) -> Result<()> {
        Ok(self.working.set_current_task(session_id, task)?)
    }

    /// Complete the active task. Returns `false` when none was active.
    pub fn session_complete_task(&self, session_id: &str, result: Option<Value>) -> Result<bool> {
        Ok(self
            .working
            .complete_current_task(session_id, result)?
            .is_some())
    }

    pub fn session_track_entity(
        &self,
        session_id: &str,
        entity_type: &str,
        entity_id: &str,
        data: Map<String, Value>,
    ) -> Result<()> {
        Ok(self
            .working
            .track_entity(session_id, entity_type, entity_id, data)?)
    }

    pub fn session_set_context(&self, session_id: &str, context: Value) -> Result<()> {
        Ok(self.working.set_context(session_id, context)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance and stats
    // ─────────────────────────────────────────────────────────────────────────

    /// Purge expired working memory and run episodic decay. Never fails.
    pub fn maintenance(&self) -> MaintenanceReport {
        let expired_slots = self.working.purge_expired();
        let decay = self.episodic.apply_decay(self.options.decay.window_days);
        let report = MaintenanceReport {
            expired_slots,
            decay,
        };
        if report.expired_slots > 0 || report.decay.affected() > 0 {
            info!(
                expired_slots = report.expired_slots,
                decayed = report.decay.updated,
                deleted = report.decay.deleted,
                "Maintenance complete"
            );
        } else {
            debug!("Maintenance found nothing to do");
        }
        report
    }

    pub fn stats(&self) -> StoreStats {
        let all = RecordQuery::new();
        StoreStats {
            agents: self.registry.len(),
            working: self.working.stats(),
            episodic: self.episodic.count(&all),
            semantic: self.semantic.count(&all),
            entities: self.semantic.count_entities(None),
            procedures: self.procedural.count(&ProcedureQuery::new()),
            index: self.index.name().to_string(),
            embedder: self.embedder.name().to_string(),
        }
    }
}
