//! Unified recall across the long-term memory types.

use serde::Serialize;
use tracing::debug;

use concord_memory::{ProcedureMatch, ProcedureQuery, RecordQuery};
use concord_types::{MemoryDomain, MemoryRecord, MemoryType, Viewer};

use crate::store::SharedStore;

/// Narrowing for [`SharedStore::recall`].
#[derive(Debug, Clone, Default)]
pub struct RecallOptions {
    /// Types to search. `None` searches episodic, semantic and procedural.
    pub memory_types: Option<Vec<MemoryType>>,
    /// Results per type. The store default when `None`.
    pub limit: Option<usize>,
    /// Restrict results to records of this domain. Access is still decided
    /// by the caller's registered domain.
    pub domain: Option<MemoryDomain>,
}

impl RecallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(mut self, types: impl IntoIterator<Item = MemoryType>) -> Self {
        self.memory_types = Some(types.into_iter().collect());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn in_domain(mut self, domain: MemoryDomain) -> Self {
        self.domain = Some(domain);
        self
    }

    fn wants(&self, memory_type: MemoryType) -> bool {
        self.memory_types
            .as_ref()
            .is_none_or(|types| types.contains(&memory_type))
    }
}

/// Per-type ranked results. No cross-type re-ranking is applied.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Recall {
    pub episodic: Vec<MemoryRecord>,
    pub semantic: Vec<MemoryRecord>,
    pub procedural: Vec<ProcedureMatch>,
    /// Returned by a component but dropped by the access check.
    pub denied: usize,
    /// Records matching the non-access narrowing that the caller cannot see.
    /// `None` when hidden counting is disabled.
    pub hidden: Option<usize>,
}

impl Recall {
    pub fn total(&self) -> usize {
        self.episodic.len() + self.semantic.len() + self.procedural.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// True when nothing came back but something exists out of sight.
    pub fn only_hidden(&self) -> bool {
        self.is_empty() && self.hidden.is_some_and(|h| h > 0)
    }
}

impl SharedStore {
    /// Fan `query` out to the requested memory types on behalf of `agent_id`.
    ///
    /// Each type applies its own ranking and filtering; results are then
    /// checked against the access policy.
    pub async fn recall(&self, query: &str, agent_id: &str, options: &RecallOptions) -> Recall {
        self.registry.touch(agent_id);
        let viewer = self.registry.viewer(agent_id);
        let limit = options.limit.unwrap_or(self.options.default_limit);

        let mut base = RecordQuery::new();
        base.domain = options.domain;
        let visible = base.clone().visible_to(viewer.clone());

        let mut proc_base = ProcedureQuery::new();
        proc_base.domain = options.domain;
        let proc_visible = proc_base.clone().visible_to(viewer.clone());

        let mut recall = Recall::default();

        if options.wants(MemoryType::Episodic) {
            let found = self.episodic.search(query, limit, &visible).await;
            let (kept, denied) = self.policy.retain_visible(&viewer, found);
            recall.episodic = kept;
            recall.denied += denied;
        }
        if options.wants(MemoryType::Semantic) {
            let found = self.semantic.search(query, limit, &visible).await;
            let (kept, denied) = self.policy.retain_visible(&viewer, found);
            recall.semantic = kept;
            recall.denied += denied;
        }
        if options.wants(MemoryType::Procedural) {
            let found = self
                .procedural
                .find_matching_procedures(query, &proc_visible, limit)
                .await;
            let (kept, denied) = self
                .policy
                .retain_visible_by(&viewer, found, |m| &m.procedure);
            recall.procedural = kept;
            recall.denied += denied;
        }

        if self.options.count_hidden {
            recall.hidden = Some(self.count_hidden(options, &viewer, &base, &proc_base));
        }

        debug!(
            agent = agent_id,
            episodic = recall.episodic.len(),
            semantic = recall.semantic.len(),
            procedural = recall.procedural.len(),
            denied = recall.denied,
            hidden = ?recall.hidden,
            "Recall complete"
        );
        recall
    }

    fn count_hidden(
        &self,
        options: &RecallOptions,
        viewer: &Viewer,
        base: &RecordQuery,
        proc_base: &ProcedureQuery,
    ) -> usize {
        let visible = base.clone().visible_to(viewer.clone());
        let mut hidden = 0;
        if options.wants(MemoryType::Episodic) {
            hidden += self
                .episodic
                .count(base)
                .saturating_sub(self.episodic.count(&visible));
        }
        if options.wants(MemoryType::Semantic) {
            hidden += self
                .semantic
                .count(base)
                .saturating_sub(self.semantic.count(&visible));
        }
        if options.wants(MemoryType::Procedural) {
            let proc_visible = proc_base.clone().visible_to(viewer.clone());
            hidden += self
                .procedural
                .count(proc_base)
                .saturating_sub(self.procedural.count(&proc_visible));
        }
        hidden
    }
}
