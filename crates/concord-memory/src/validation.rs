//! Validation for data entering the index.
//!
//! Checks run before anything is embedded or written, so a rejected record
//! never costs an embedding call.

use concord_types::{EntityProfile, MemoryRecord, Procedure};

use crate::error::{MemoryError, Result};

/// Specific validation failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("memory content is empty")]
    EmptyContent,

    #[error("agent id is empty")]
    EmptyAgentId,

    #[error("name is empty")]
    EmptyName,

    /// Importance outside `[0, 1]` or not a number.
    #[error("importance {0} is out of range [0.0, 1.0]")]
    InvalidImportance(f32),

    #[error("confidence {0} is out of range [0.1, 1.0]")]
    InvalidConfidence(f32),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding contains NaN or infinite values.
    #[error("embedding contains {count} invalid values (NaN or Inf)")]
    InvalidEmbeddingValues { count: usize },
}

impl From<ValidationError> for MemoryError {
    fn from(err: ValidationError) -> Self {
        MemoryError::InvalidData(err.to_string())
    }
}

pub fn validate_record(record: &MemoryRecord) -> Result<()> {
    if record.content.trim().is_empty() {
        return Err(ValidationError::EmptyContent.into());
    }
    if record.agent_id.trim().is_empty() {
        return Err(ValidationError::EmptyAgentId.into());
    }
    if !(0.0..=1.0).contains(&record.importance) {
        return Err(ValidationError::InvalidImportance(record.importance).into());
    }
    Ok(())
}

pub fn validate_entity(entity: &EntityProfile) -> Result<()> {
    if entity.name.trim().is_empty() || entity.entity_type.trim().is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    Ok(())
}

pub fn validate_procedure(procedure: &Procedure) -> Result<()> {
    if procedure.name.trim().is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    if procedure.agent_id.trim().is_empty() {
        return Err(ValidationError::EmptyAgentId.into());
    }
    if !(concord_types::CONFIDENCE_FLOOR..=concord_types::CONFIDENCE_CEILING)
        .contains(&procedure.confidence)
    {
        return Err(ValidationError::InvalidConfidence(procedure.confidence).into());
    }
    Ok(())
}

/// Check an embedding's width and values.
pub fn validate_embedding(embedding: &[f32], expected: usize) -> Result<()> {
    if embedding.len() != expected {
        return Err(ValidationError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        }
        .into());
    }
    let count = embedding.iter().filter(|v| !v.is_finite()).count();
    if count > 0 {
        return Err(ValidationError::InvalidEmbeddingValues { count }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::{ActionType, MemoryDomain, ProcedureKind};

    #[test]
    fn test_record_validation() {
        let ok = MemoryRecord::episodic("hello", "email_agent", MemoryDomain::Email);
        assert!(validate_record(&ok).is_ok());

        let empty = MemoryRecord::episodic("   ", "email_agent", MemoryDomain::Email);
        assert!(matches!(
            validate_record(&empty),
            Err(MemoryError::InvalidData(_))
        ));

        let mut bad = ok.clone();
        bad.importance = 1.5;
        assert!(validate_record(&bad).is_err());

        let mut nan = ok.clone();
        nan.importance = f32::NAN;
        assert!(validate_record(&nan).is_err());

        let anonymous = MemoryRecord::episodic("x", "", MemoryDomain::Email);
        assert!(validate_record(&anonymous).is_err());
    }

    #[test]
    fn test_procedure_validation() {
        let p = Procedure::new(
            ProcedureKind::Workflow,
            "weekly_report",
            "every friday",
            ActionType::Workflow,
            "bi_agent",
            MemoryDomain::General,
        );
        assert!(validate_procedure(&p).is_ok());

        let mut low = p.clone();
        low.confidence = 0.05;
        assert!(validate_procedure(&low).is_err());
    }

    #[test]
    fn test_entity_validation() {
        assert!(validate_entity(&EntityProfile::new("topic", "budget")).is_ok());
        assert!(validate_entity(&EntityProfile::new("topic", " ")).is_err());
    }

    #[test]
    fn test_embedding_validation() {
        assert!(validate_embedding(&[0.1, 0.2], 2).is_ok());
        assert!(validate_embedding(&[0.1], 2).is_err());
        assert!(validate_embedding(&[0.1, f32::INFINITY], 2).is_err());
    }
}
