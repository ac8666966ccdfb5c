//! Deterministic, content-addressed identifiers.
//!
//! Entities and procedures are keyed by a canonical string such as
//! `"contact_ada@example.com"` or `"email_pattern_out_of_office"`. The key is
//! hashed with UUID version 5 (SHA-1 over [`NAMESPACE_CONCORD`] followed by
//! the UTF-8 bytes of the key), so the same key always yields the same id
//! across processes and implementations.

use uuid::Uuid;

use crate::Id;

/// Namespace for every deterministic id issued by Concord.
///
/// Changing this constant re-keys every stored entity and procedure.
pub const NAMESPACE_CONCORD: Uuid = Uuid::from_u128(0x6c1f_4a2e_9b3d_5e70_8a41_c2d9_0f3b_7e15);

/// Hash a canonical key into a stable identifier.
pub fn deterministic_id(key: &str) -> Id {
    Uuid::new_v5(&NAMESPACE_CONCORD, key.as_bytes())
}

/// Canonical key for a contact. Email addresses compare case-insensitively.
pub fn contact_key(email: &str) -> String {
    format!("contact_{}", email.trim().to_lowercase())
}

/// Canonical key for a generic entity of the given type.
pub fn entity_key(entity_type: &str, name: &str) -> String {
    format!(
        "{}_{}",
        entity_type.trim().to_lowercase(),
        name.trim().to_lowercase()
    )
}

/// Canonical key for a procedure: `"<kind>_<name>"`.
pub fn procedure_key(kind: &str, name: &str) -> String {
    format!("{}_{}", kind, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_id() {
        assert_eq!(
            deterministic_id("contact_a@x.com"),
            deterministic_id("contact_a@x.com")
        );
        assert_ne!(
            deterministic_id("contact_a@x.com"),
            deterministic_id("contact_b@x.com")
        );
    }

    #[test]
    fn test_id_is_stable_v5() {
        let id = deterministic_id("workflow_weekly_report");
        assert_eq!(id.get_version_num(), 5);
        // Recomputing from the namespace by hand gives the same value.
        assert_eq!(
            id,
            Uuid::new_v5(&NAMESPACE_CONCORD, b"workflow_weekly_report")
        );
    }

    #[test]
    fn test_contact_key_normalizes_email() {
        assert_eq!(contact_key("  Ada@Example.COM "), "contact_ada@example.com");
        assert_eq!(
            deterministic_id(&contact_key("ADA@example.com")),
            deterministic_id(&contact_key("ada@example.com"))
        );
    }

    #[test]
    fn test_entity_and_procedure_keys() {
        assert_eq!(entity_key("Topic", " Rust "), "topic_rust");
        assert_eq!(
            procedure_key("email_pattern", "out_of_office"),
            "email_pattern_out_of_office"
        );
    }
}
