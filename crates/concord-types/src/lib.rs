//! Shared types for the Concord memory store.
//!
//! Every memory component and the orchestrator speak in these types:
//! - [`MemoryRecord`]: the unit of episodic and semantic memory
//! - [`EntityProfile`]: a contact, topic or account with attributes and relationships
//! - [`Procedure`]: a learned trigger→action pattern with adaptive confidence
//! - [`AgentRegistration`] / [`Viewer`]: who is asking, and what they may see
//!
//! Identity for entities and procedures is content-addressed through
//! [`deterministic_id`], so writing the same logical thing twice lands on the
//! same record.

pub mod access;
pub mod agent;
pub mod entity;
pub mod error;
pub mod id;
pub mod procedure;
pub mod record;
pub mod tags;

use chrono::{DateTime, Utc};

pub use access::{Scoped, can_access};
pub use agent::{AgentRegistration, Viewer};
pub use entity::{CONTACT_TYPE, EntityProfile};
pub use error::ParseTagError;
pub use id::{
    NAMESPACE_CONCORD, contact_key, deterministic_id, entity_key, procedure_key,
};
pub use procedure::{
    ActionType, CONFIDENCE_CEILING, CONFIDENCE_FLOOR, DEFAULT_CONFIDENCE, Procedure,
    ProcedureKind,
};
pub use record::{DEFAULT_IMPORTANCE, MemoryRecord};
pub use tags::{MemoryDomain, MemoryScope, MemoryType};

/// Record identifier.
pub type Id = uuid::Uuid;

/// UTC timestamp used on every record.
pub type Timestamp = DateTime<Utc>;

/// Generate a fresh random identifier.
pub fn new_id() -> Id {
    uuid::Uuid::new_v4()
}

/// Current UTC time.
pub fn now() -> Timestamp {
    Utc::now()
}
