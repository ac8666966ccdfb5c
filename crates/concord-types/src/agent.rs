//! Agent identity.

use serde::{Deserialize, Serialize};

use crate::tags::MemoryDomain;
use crate::{Timestamp, now};

/// A known agent and the domain it works in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub agent_id: String,
    pub name: String,
    pub domain: MemoryDomain,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub registered_at: Timestamp,
    pub last_active: Timestamp,
}

impl AgentRegistration {
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        domain: MemoryDomain,
    ) -> Self {
        let ts = now();
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            domain,
            capabilities: Vec::new(),
            registered_at: ts,
            last_active: ts,
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// The viewer identity this agent reads with.
    pub fn viewer(&self) -> Viewer {
        Viewer::new(self.agent_id.clone(), Some(self.domain))
    }
}

/// The caller on whose behalf a read is made.
///
/// `domain` is `None` for agents that are not registered: they see only
/// Global records and records they own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub agent_id: String,
    pub domain: Option<MemoryDomain>,
}

impl Viewer {
    pub fn new(agent_id: impl Into<String>, domain: Option<MemoryDomain>) -> Self {
        Self {
            agent_id: agent_id.into(),
            domain,
        }
    }
}
