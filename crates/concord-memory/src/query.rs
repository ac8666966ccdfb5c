//! Search parameters shared by the record stores.

use concord_types::{MemoryDomain, MemoryScope, MemoryType, Timestamp, Viewer};

use crate::filter::{Condition, Filter, Range};

/// Optional narrowing applied to record searches and scans.
///
/// Access is expressed one of two ways:
/// - `viewer`: the full visibility rule for a resolved agent
/// - `agent_id`: the agent's own records plus Global ones, and Domain-scoped
///   records of `domain` when a domain is also given
///
/// `viewer` wins when both are set. With neither, no access narrowing applies.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub viewer: Option<Viewer>,
    pub agent_id: Option<String>,
    pub domain: Option<MemoryDomain>,
    pub scope: Option<MemoryScope>,
    pub session_id: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub since: Option<Timestamp>,
    /// Exclusive upper bound on `created_at`.
    pub until: Option<Timestamp>,
    pub min_importance: Option<f32>,
    pub category: Option<String>,
    /// Records whose `entities` contain this reference.
    pub entity: Option<String>,
    /// Any further predicate.
    pub extra: Option<Filter>,
}

impl RecordQuery {
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

    pub fn in_domain(mut self, domain: MemoryDomain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_scope(mut self, scope: MemoryScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn since(mut self, at: Timestamp) -> Self {
        self.since = Some(at);
        self
    }

    pub fn until(mut self, at: Timestamp) -> Self {
        self.until = Some(at);
        self
    }

    pub fn min_importance(mut self, importance: f32) -> Self {
        self.min_importance = Some(importance);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn mentioning(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn matching(mut self, filter: Filter) -> Self {
        self.extra = Some(filter);
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

    /// Whether any access narrowing applies.
    pub fn has_access_filter(&self) -> bool {
        self.viewer.is_some() || self.agent_id.is_some()
    }

    /// Index predicate for records of `memory_type` matching this query.
    pub fn to_filter(&self, memory_type: MemoryType) -> Filter {
        let mut filter = Filter::new().must(Condition::eq("memory_type", memory_type.as_str()));

        if let Some(domain) = self.domain {
            filter = filter.must(Condition::eq("domain", domain.as_str()));
        }
        if let Some(scope) = self.scope {
            filter = filter.must(Condition::eq("scope", scope.as_str()));
        }
        if let Some(ref session_id) = self.session_id {
            filter = filter.must(Condition::eq("session_id", session_id.as_str()));
        }
        if self.since.is_some() || self.until.is_some() {
            let range = Range {
                gte: self.since.map(|t| t.timestamp_millis() as f64),
                lt: self.until.map(|t| t.timestamp_millis() as f64),
                ..Range::default()
            };
            filter = filter.must(Condition::range("created_at", range));
        }
        if let Some(min) = self.min_importance {
            filter = filter.must(Condition::range("importance", Range::at_least(f64::from(min))));
        }
        if let Some(ref category) = self.category {
            filter = filter.must(Condition::eq("category", category.as_str()));
        }
        if let Some(ref entity) = self.entity {
            filter = filter.must(Condition::contains("entities", entity.as_str()));
        }

        let access = match (&self.viewer, &self.agent_id) {
            (Some(viewer), _) => Filter::visible_to(viewer),
            (None, Some(agent_id)) => Filter::owned_or_shared(agent_id, self.domain),
            (None, None) => Filter::new(),
        };
        filter = filter.and(access);

        match self.extra {
            Some(ref extra) => filter.and(extra.clone()),
            None => filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::MemoryRecord;
    use crate::index::to_payload;

    fn rec(owner: &str, scope: MemoryScope, domain: MemoryDomain) -> MemoryRecord {
        MemoryRecord::episodic("x", owner, domain).with_scope(scope)
    }

    fn hit(query: &RecordQuery, record: &MemoryRecord) -> bool {
        query
            .to_filter(MemoryType::Episodic)
            .matches(&to_payload(record).unwrap())
    }

    #[test]
    fn test_agent_filter_owned_or_global() {
        let q = RecordQuery::new().for_agent("a");
        assert!(hit(&q, &rec("a", MemoryScope::Private, MemoryDomain::Email)));
        assert!(hit(&q, &rec("b", MemoryScope::Global, MemoryDomain::Pet)));
        assert!(!hit(&q, &rec("b", MemoryScope::Domain, MemoryDomain::Email)));
    }

    #[test]
    fn test_agent_filter_with_domain_exposes_domain_scope() {
        let q = RecordQuery::new().for_agent("a").in_domain(MemoryDomain::Email);
        assert!(hit(&q, &rec("b", MemoryScope::Domain, MemoryDomain::Email)));
        assert!(!hit(&q, &rec("b", MemoryScope::Domain, MemoryDomain::Pet)));
        assert!(!hit(&q, &rec("b", MemoryScope::Private, MemoryDomain::Email)));
    }

    #[test]
    fn test_memory_type_always_applies() {
        let q = RecordQuery::new();
        let semantic = MemoryRecord::semantic("x", "a", MemoryDomain::Email);
        assert!(!hit(&q, &semantic));
    }

    #[test]
    fn test_time_and_importance_bounds() {
        let record = rec("a", MemoryScope::Global, MemoryDomain::Email).with_importance(0.4);
        let created = record.created_at;
        let later = created + chrono::TimeDelta::seconds(1);

        assert!(hit(&RecordQuery::new().since(created), &record));
        assert!(!hit(&RecordQuery::new().since(later), &record));
        assert!(hit(&RecordQuery::new().until(later), &record));
        assert!(!hit(&RecordQuery::new().until(created), &record));
        assert!(hit(&RecordQuery::new().min_importance(0.4), &record));
        assert!(!hit(&RecordQuery::new().min_importance(0.5), &record));
    }

    #[test]
    fn test_without_access_drops_narrowing() {
        let q = RecordQuery::new()
            .visible_to(Viewer::new("a", Some(MemoryDomain::Email)))
            .in_domain(MemoryDomain::Pet);
        let open = q.without_access();
        assert!(!open.has_access_filter());
        assert_eq!(open.domain, Some(MemoryDomain::Pet));
        let private = rec("b", MemoryScope::Private, MemoryDomain::Pet);
        assert!(!hit(&q, &private));
        assert!(hit(&open, &private));
    }
}
