//! Shared memory store for Concord.
//!
//! This crate is the single entry point agents use to reach memory. It owns
//! the four memory components and the agent registry, and funnels every read
//! through one access policy:
//!
//! - **Recall**: fan a query out to episodic, semantic and procedural memory
//! - **Sessions**: working memory passthroughs, consolidation into episodic
//!   memory, and session teardown
//! - **Maintenance**: purge expired working memory and decay old episodes
//! - **Registry**: which agents exist and which domain each reads with
//!
//! # Example
//!
//! ```no_run
//! use concord_config::ConcordConfig;
//! use concord_store::{RecallOptions, RememberOptions, SharedStore};
//!
//! # async fn demo() -> concord_store::Result<()> {
//! let store = SharedStore::from_config(&ConcordConfig::new())?;
//! store
//!     .remember_interaction("email_agent", "Bob asked to move the meeting", RememberOptions::new())
//!     .await?;
//! let recall = store.recall("meeting", "email_agent", &RecallOptions::new()).await;
//! println!("{} results, {:?} hidden", recall.total(), recall.hidden);
//! # Ok(())
//! # }
//! ```

mod consolidation;
mod error;
mod policy;
mod recall;
mod registry;
mod store;

pub use consolidation::{ConsolidationReport, SUMMARY_IMPORTANCE, TASK_IMPORTANCE};
pub use error::{Result, StoreError};
pub use policy::AccessPolicy;
pub use recall::{Recall, RecallOptions};
pub use registry::{AgentRegistry, default_agents};
pub use store::{
    MaintenanceReport, RememberOptions, SharedStore, StoreOptions, StoreStats, embedder_spec,
};

// Re-export key types from the component crates for convenience
pub use concord_memory::{DecayReport, ProcedureMatch};
pub use concord_types::{
    AgentRegistration, EntityProfile, Id, MemoryDomain, MemoryRecord, MemoryScope, MemoryType,
    Procedure, Viewer,
};
