//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [store]          # persistence
//! [embedding]      # embedding provider
//! [working]        # working memory bounds
//! [decay]          # episodic decay
//! [procedural]     # procedure learning and matching
//! [recall]         # recall defaults
//! [[agents]]       # agent registry seed
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use concord_types::{AgentRegistration, MemoryDomain};

use crate::error::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged. Use the accessor methods to read a
/// section with defaults filled in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcordConfig {
    pub store: Option<StoreConfig>,
    pub embedding: Option<EmbeddingConfig>,
    pub working: Option<WorkingConfig>,
    pub decay: Option<DecaySection>,
    pub procedural: Option<ProceduralSection>,
    pub recall: Option<RecallConfig>,
    /// Agent registry seed. Empty means the built-in seed.
    pub agents: Vec<AgentEntry>,
}

impl ConcordConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections replace whole; a non-empty `[[agents]]` list replaces the
    /// previous list.
    pub fn merge(&mut self, other: ConcordConfig) {
        if other.store.is_some() {
            self.store = other.store;
        }
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
        if other.working.is_some() {
            self.working = other.working;
        }
        if other.decay.is_some() {
            self.decay = other.decay;
        }
        if other.procedural.is_some() {
            self.procedural = other.procedural;
        }
        if other.recall.is_some() {
            self.recall = other.recall;
        }
        if !other.agents.is_empty() {
            self.agents = other.agents;
        }
    }

    pub fn store(&self) -> StoreConfig {
        self.store.clone().unwrap_or_default()
    }

    pub fn embedding(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    pub fn working(&self) -> WorkingConfig {
        self.working.clone().unwrap_or_default()
    }

    pub fn decay(&self) -> DecaySection {
        self.decay.clone().unwrap_or_default()
    }

    pub fn procedural(&self) -> ProceduralSection {
        self.procedural.clone().unwrap_or_default()
    }

    pub fn recall(&self) -> RecallConfig {
        self.recall.clone().unwrap_or_default()
    }

    /// Check ranges and uniqueness. Called by the loaders.
    pub fn validate(&self) -> Result<()> {
        let embedding = self.embedding();
        if embedding.dimensions == Some(0) {
            return Err(ConfigError::invalid("embedding.dimensions", "must be positive"));
        }

        if self.working().max_slots == 0 {
            return Err(ConfigError::invalid("working.max_slots", "must be positive"));
        }

        let decay = self.decay();
        if !(0.0..1.0).contains(&decay.decay_rate) {
            return Err(ConfigError::invalid("decay.decay_rate", "must be in [0, 1)"));
        }
        if !(0.0..=1.0).contains(&decay.min_importance) {
            return Err(ConfigError::invalid("decay.min_importance", "must be in [0, 1]"));
        }
        if decay.batch_size == 0 {
            return Err(ConfigError::invalid("decay.batch_size", "must be positive"));
        }

        let procedural = self.procedural();
        if procedural.success_step < 0.0 || procedural.failure_step < 0.0 {
            return Err(ConfigError::invalid(
                "procedural.success_step",
                "learning steps must not be negative",
            ));
        }
        for (field, value) in [
            ("procedural.confidence_floor", procedural.confidence_floor),
            ("procedural.match_floor", procedural.match_floor),
            ("procedural.keyword_bonus", procedural.keyword_bonus),
            ("procedural.success_bonus_cap", procedural.success_bonus_cap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, "must be in [0, 1]"));
            }
        }

        if self.recall().default_limit == 0 {
            return Err(ConfigError::invalid("recall.default_limit", "must be positive"));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(ConfigError::invalid("agents.id", "must not be empty"));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(ConfigError::DuplicateAgent(agent.id.clone()));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file. Absent means an in-process index.
    pub database: Option<PathBuf>,
    /// Report how many matches were withheld from a recall.
    pub count_hidden: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: None,
            count_hidden: true,
        }
    }
}

impl StoreConfig {
    /// The database path with a leading `~` expanded.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.as_ref().map(|p| expand_home(p))
    }
}

fn expand_home(path: &std::path::Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding
// ─────────────────────────────────────────────────────────────────────────────

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "hash" or "openai".
    pub provider: String,
    /// Output dimensions. Provider default when absent.
    pub dimensions: Option<usize>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Plaintext API key (will warn if present).
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            dimensions: None,
            model: None,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
        }
    }
}

impl EmbeddingConfig {
    /// API key from the configured environment variable, falling back to the
    /// plaintext value.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Working memory
// ─────────────────────────────────────────────────────────────────────────────

/// `[working]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingConfig {
    pub max_slots: usize,
    pub default_ttl_minutes: Option<u64>,
}

impl Default for WorkingConfig {
    fn default() -> Self {
        Self {
            max_slots: 100,
            default_ttl_minutes: None,
        }
    }
}

impl WorkingConfig {
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_minutes
            .map(|m| Duration::from_secs(m.saturating_mul(60)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decay / Procedural / Recall
// ─────────────────────────────────────────────────────────────────────────────

/// `[decay]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecaySection {
    pub decay_rate: f32,
    pub min_importance: f32,
    pub window_days: u32,
    pub batch_size: usize,
}

impl Default for DecaySection {
    fn default() -> Self {
        Self {
            decay_rate: 0.1,
            min_importance: 0.1,
            window_days: 30,
            batch_size: 1000,
        }
    }
}

/// `[procedural]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProceduralSection {
    pub success_step: f32,
    pub failure_step: f32,
    pub confidence_floor: f32,
    pub match_floor: f32,
    pub keyword_bonus: f32,
    pub success_bonus_cap: f32,
}

impl Default for ProceduralSection {
    fn default() -> Self {
        Self {
            success_step: 0.05,
            failure_step: 0.1,
            confidence_floor: 0.1,
            match_floor: 0.3,
            keyword_bonus: 0.1,
            success_bonus_cap: 0.2,
        }
    }
}

/// `[recall]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Results per memory type when the caller gives no limit.
    pub default_limit: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self { default_limit: 5 }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agents
// ─────────────────────────────────────────────────────────────────────────────

/// One `[[agents]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    /// Display name; the id when absent.
    #[serde(default)]
    pub name: Option<String>,
    pub domain: MemoryDomain,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl AgentEntry {
    pub fn to_registration(&self) -> AgentRegistration {
        AgentRegistration::new(
            self.id.clone(),
            self.name.clone().unwrap_or_else(|| self.id.clone()),
            self.domain,
        )
        .with_capabilities(self.capabilities.iter().cloned())
    }
}
