//! Episodic memory: time-stamped experiences with importance decay.

use chrono::TimeDelta;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use concord_embed::SharedEmbedder;
use concord_types::{
    DEFAULT_IMPORTANCE, Id, MemoryDomain, MemoryRecord, MemoryScope, MemoryType, Timestamp, now,
};

use crate::error::Result;
use crate::filter::{Condition, Filter, Range};
use crate::index::{EPISODIC_COLLECTION, SharedIndex};
use crate::query::RecordQuery;
use crate::records::{RecordCollection, RecordPatch, soft};

/// Decay tuning.
#[derive(Debug, Clone)]
pub struct DecayConfig {
    /// Fraction of importance lost per decay pass.
    pub decay_rate: f32,
    /// Records decaying below this are deleted.
    pub min_importance: f32,
    /// Records not accessed for this many days decay.
    pub window_days: u32,
    /// Candidates examined per pass.
    pub batch_size: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.1,
            min_importance: 0.1,
            window_days: 30,
            batch_size: 1000,
        }
    }
}

/// Outcome of a decay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecayReport {
    pub updated: usize,
    pub deleted: usize,
}

impl DecayReport {
    /// Records affected in total.
    pub fn affected(&self) -> usize {
        self.updated + self.deleted
    }
}

/// An interaction to remember, the convenience form of an episodic record.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub content: String,
    pub agent_id: String,
    pub domain: MemoryDomain,
    pub scope: MemoryScope,
    pub session_id: Option<String>,
    pub importance: f32,
    pub entities: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl Interaction {
    /// A private interaction with default importance.
    pub fn new(
        content: impl Into<String>,
        agent_id: impl Into<String>,
        domain: MemoryDomain,
    ) -> Self {
        Self {
            content: content.into(),
            agent_id: agent_id.into(),
            domain,
            scope: MemoryScope::Private,
            session_id: None,
            importance: DEFAULT_IMPORTANCE,
            entities: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_scope(mut self, scope: MemoryScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance;
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

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    fn into_record(self) -> MemoryRecord {
        let mut record = MemoryRecord::episodic(self.content, self.agent_id, self.domain)
            .with_scope(self.scope)
            .with_importance(self.importance)
            .with_entities(self.entities);
        record.session_id = self.session_id;
        record.metadata = self.metadata;
        record
    }
}

/// Append-only store of experiences.
///
/// Writes return errors; reads log and return empty results when the index
/// or embedder is unavailable.
pub struct EpisodicMemory {
    records: RecordCollection,
    decay: DecayConfig,
}

impl EpisodicMemory {
    pub fn new(index: SharedIndex, embedder: SharedEmbedder) -> Result<Self> {
        Ok(Self {
            records: RecordCollection::new(
                index,
                embedder,
                EPISODIC_COLLECTION,
                MemoryType::Episodic,
            )?,
            decay: DecayConfig::default(),
        })
    }

    pub fn with_decay(mut self, decay: DecayConfig) -> Self {
        self.decay = decay;
        self
    }

    pub fn decay_config(&self) -> &DecayConfig {
        &self.decay
    }

    pub async fn add(&self, record: MemoryRecord) -> Result<Id> {
        self.records.insert(record).await
    }

    pub async fn add_interaction(&self, interaction: Interaction) -> Result<Id> {
        self.records.insert(interaction.into_record()).await
    }

    /// Ranked search; every returned record is touched.
    pub async fn search(&self, query: &str, limit: usize, params: &RecordQuery) -> Vec<MemoryRecord> {
        soft(
            self.records.search(query, limit, params).await,
            "Episodic search",
            Vec::new(),
        )
    }

    /// Records created in `[since, until)`, oldest first.
    pub fn search_by_time(
        &self,
        since: Timestamp,
        until: Option<Timestamp>,
        params: &RecordQuery,
        limit: usize,
    ) -> Vec<MemoryRecord> {
        let mut params = params.clone().since(since);
        params.until = until.or(params.until);
        let mut records = soft(
            self.records.scan(&params, usize::MAX),
            "Episodic time search",
            Vec::new(),
        );
        records.sort_by_key(|r| r.created_at);
        records.truncate(limit);
        records
    }

    pub fn get(&self, id: Id) -> Option<MemoryRecord> {
        soft(self.records.get(id), "Episodic get", None)
    }

    /// Look up a record without recording an access.
    pub fn peek(&self, id: Id) -> Option<MemoryRecord> {
        soft(self.records.peek(id), "Episodic peek", None)
    }

    /// Record an access to a record obtained through [`Self::peek`].
    pub fn touch(&self, record: &mut MemoryRecord) {
        self.records.touch_one(record);
    }

    /// Returns `false` when no record has this id.
    pub async fn update(&self, id: Id, patch: RecordPatch) -> Result<bool> {
        self.records.update(id, patch).await
    }

    /// Returns `false` when no record has this id.
    pub fn delete(&self, id: Id) -> Result<bool> {
        self.records.delete(id)
    }

    pub fn count(&self, params: &RecordQuery) -> usize {
        soft(self.records.count(params), "Episodic count", 0)
    }

    /// Decay records not accessed within `window_days`.
    ///
    /// Importance is multiplied by `1 - decay_rate`; records that fall below
    /// `min_importance` are deleted instead. Never fails: problems are
    /// logged and the pass reports what it managed.
    pub fn apply_decay(&self, window_days: u32) -> DecayReport {
        let cutoff = now() - TimeDelta::days(i64::from(window_days));
        let filter_params = RecordQuery::new().matching(Filter::new().must(Condition::range(
            "accessed_at",
            Range::below(cutoff.timestamp_millis() as f64),
        )));

        let candidates = soft(
            self.records.scan(&filter_params, self.decay.batch_size),
            "Decay scan",
            Vec::new(),
        );

        let factor = 1.0 - self.decay.decay_rate;
        let mut report = DecayReport::default();
        let mut doomed = Vec::new();
        for record in candidates {
            let decayed = record.importance * factor;
            if decayed < self.decay.min_importance {
                doomed.push(record.id);
                continue;
            }
            match self.records.set_importance(record.id, decayed) {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                Err(e) => warn!(id = %record.id, error = %e, "Failed to decay record"),
            }
        }

        if !doomed.is_empty() {
            match self.records.delete_many(&doomed) {
                Ok(n) => report.deleted = n,
                Err(e) => warn!(count = doomed.len(), error = %e, "Failed to delete decayed records"),
            }
        }

        if report.affected() > 0 {
            info!(
                updated = report.updated,
                deleted = report.deleted,
                window_days,
                "Applied episodic decay"
            );
        }
        report
    }

    /// Recent records visible to `agent_id`, newest first.
    pub fn get_recent(
        &self,
        agent_id: &str,
        domain: Option<MemoryDomain>,
        hours: u32,
        limit: usize,
    ) -> Vec<MemoryRecord> {
        let mut params = RecordQuery::new()
            .for_agent(agent_id)
            .since(now() - TimeDelta::hours(i64::from(hours)));
        params.domain = domain;
        self.recent_matching(&params, limit)
    }

    /// Newest-first scan under arbitrary narrowing.
    pub fn recent_matching(&self, params: &RecordQuery, limit: usize) -> Vec<MemoryRecord> {
        let mut records = soft(
            self.records.scan(params, usize::MAX),
            "Recent episodic scan",
            Vec::new(),
        );
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        records
    }

    /// All of a session's records, oldest first, one per line.
    pub fn summarize_session(&self, session_id: &str) -> String {
        let mut records = soft(
            self.records
                .scan(&RecordQuery::new().in_session(session_id), usize::MAX),
            "Session summary scan",
            Vec::new(),
        );
        records.sort_by_key(|r| r.created_at);
        records
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
