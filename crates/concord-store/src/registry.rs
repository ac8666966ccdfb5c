//! In-memory agent registry.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info};

use concord_types::{AgentRegistration, MemoryDomain, Viewer, now};

/// The built-in agents every store starts with unless configured otherwise.
pub fn default_agents() -> Vec<AgentRegistration> {
    [
        ("email_agent", "Email Agent", MemoryDomain::Email),
        ("social_agent", "Social Agent", MemoryDomain::Social),
        ("finance_agent", "Finance Agent", MemoryDomain::Finance),
        ("home_agent", "Home Agent", MemoryDomain::Home),
        ("pet_agent", "Pet Agent", MemoryDomain::Pet),
        ("bi_agent", "Business Intelligence Agent", MemoryDomain::General),
        ("orchestrator", "Orchestrator", MemoryDomain::General),
    ]
    .into_iter()
    .map(|(id, name, domain)| AgentRegistration::new(id, name, domain))
    .collect()
}

/// Known agents and their domains.
///
/// The registry decides which domain a caller reads with; an unregistered id
/// reads with no domain and sees only Global records and its own.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentRegistration>>,
}

impl AgentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with [`default_agents`].
    pub fn with_defaults() -> Self {
        Self::from_registrations(default_agents())
    }

    pub fn from_registrations(agents: impl IntoIterator<Item = AgentRegistration>) -> Self {
        let agents = agents
            .into_iter()
            .map(|a| (a.agent_id.clone(), a))
            .collect();
        Self {
            agents: RwLock::new(agents),
        }
    }

    /// Add or replace a registration.
    pub fn register(&self, registration: AgentRegistration) {
        info!(
            agent = %registration.agent_id,
            domain = %registration.domain,
            "Registered agent"
        );
        self.agents
            .write()
            .insert(registration.agent_id.clone(), registration);
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentRegistration> {
        self.agents.read().get(agent_id).cloned()
    }

    /// Registrations sorted by id, optionally limited to one domain.
    pub fn list(&self, domain: Option<MemoryDomain>) -> Vec<AgentRegistration> {
        let mut agents: Vec<_> = self
            .agents
            .read()
            .values()
            .filter(|a| domain.is_none_or(|d| a.domain == d))
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        agents
    }

    /// Stamp `last_active`. Returns `false` for unregistered ids.
    pub fn touch(&self, agent_id: &str) -> bool {
        match self.agents.write().get_mut(agent_id) {
            Some(agent) => {
                agent.last_active = now();
                true
            }
            None => {
                debug!(agent = agent_id, "Activity from unregistered agent");
                false
            }
        }
    }

    pub fn domain_of(&self, agent_id: &str) -> Option<MemoryDomain> {
        self.agents.read().get(agent_id).map(|a| a.domain)
    }

    /// The identity `agent_id` reads with.
    pub fn viewer(&self, agent_id: &str) -> Viewer {
        Viewer::new(agent_id, self.domain_of(agent_id))
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_seed() {
        let registry = AgentRegistry::with_defaults();
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.domain_of("pet_agent"), Some(MemoryDomain::Pet));
        assert_eq!(registry.domain_of("orchestrator"), Some(MemoryDomain::General));
        assert_eq!(registry.list(Some(MemoryDomain::General)).len(), 2);
    }

    #[test]
    fn test_unregistered_viewer_has_no_domain() {
        let registry = AgentRegistry::with_defaults();
        let viewer = registry.viewer("stranger");
        assert_eq!(viewer.agent_id, "stranger");
        assert!(viewer.domain.is_none());
        assert!(!registry.touch("stranger"));
    }

    #[test]
    fn test_register_and_touch() {
        let registry = AgentRegistry::new();
        assert!(registry.is_empty());
        let reg = AgentRegistration::new("travel_agent", "Travel", MemoryDomain::Home)
            .with_capabilities(["booking"]);
        let before = reg.last_active;
        registry.register(reg);

        assert!(registry.touch("travel_agent"));
        let stored = registry.get("travel_agent").unwrap();
        assert!(stored.last_active >= before);
        assert_eq!(stored.capabilities, vec!["booking"]);
    }

    #[test]
    fn test_list_sorted() {
        let registry = AgentRegistry::with_defaults();
        let ids: Vec<_> = registry.list(None).into_iter().map(|a| a.agent_id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
