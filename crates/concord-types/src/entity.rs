//! Entity profiles: contacts, topics, accounts.

use std::collections::BTreeMap;

use chrono::serde::ts_milliseconds;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::{contact_key, deterministic_id, entity_key};
use crate::{Id, Timestamp, now};

/// Entity type used by the contact helpers.
pub const CONTACT_TYPE: &str = "contact";

/// A named thing with free-form attributes and typed relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub id: Id,
    pub entity_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Relationship name → related entity ids, in insertion order.
    #[serde(default)]
    pub relationships: BTreeMap<String, Vec<Id>>,
    #[serde(default)]
    pub mention_count: u32,
    #[serde(with = "ts_milliseconds")]
    pub created_at: Timestamp,
    #[serde(with = "ts_milliseconds")]
    pub updated_at: Timestamp,
}

impl EntityProfile {
    /// Create a profile keyed by `"<type>_<name>"`.
    pub fn new(entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let name = name.into();
        let id = deterministic_id(&entity_key(&entity_type, &name));
        Self::with_id(id, entity_type, name)
    }

    /// Create a contact profile keyed by its email address.
    pub fn contact(email: &str, name: Option<&str>) -> Self {
        let email = email.trim().to_lowercase();
        let id = deterministic_id(&contact_key(&email));
        let mut profile = Self::with_id(id, CONTACT_TYPE, name.unwrap_or(&email));
        profile
            .attributes
            .insert("email".to_string(), Value::String(email));
        profile
    }

    fn with_id(id: Id, entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id,
            entity_type: entity_type.into(),
            name: name.into(),
            attributes: Map::new(),
            relationships: BTreeMap::new(),
            mention_count: 0,
            created_at: ts,
            updated_at: ts,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Merge attributes; incoming keys overwrite existing ones.
    pub fn merge_attributes(&mut self, patch: Map<String, Value>) {
        for (k, v) in patch {
            self.attributes.insert(k, v);
        }
        self.updated_at = now();
    }

    /// Append `to` under `relation`. Returns `false` if it was already there.
    pub fn add_relationship(&mut self, relation: &str, to: Id) -> bool {
        let targets = self.relationships.entry(relation.to_string()).or_default();
        if targets.contains(&to) {
            return false;
        }
        targets.push(to);
        self.updated_at = now();
        true
    }

    /// Ids related through `relation`, or through any relation when `None`.
    pub fn related_ids(&self, relation: Option<&str>) -> Vec<Id> {
        match relation {
            Some(rel) => self.relationships.get(rel).cloned().unwrap_or_default(),
            None => {
                let mut ids: Vec<Id> = Vec::new();
                for targets in self.relationships.values() {
                    for id in targets {
                        if !ids.contains(id) {
                            ids.push(*id);
                        }
                    }
                }
                ids
            }
        }
    }

    pub fn mention(&mut self) {
        self.mention_count = self.mention_count.saturating_add(1);
        self.updated_at = now();
    }

    /// Text used to embed the profile: type, name, then attributes.
    pub fn embedding_text(&self) -> String {
        let mut text = format!("{}: {}", self.entity_type, self.name);
        if !self.attributes.is_empty() {
            let attrs: Vec<String> = self
                .attributes
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{k}: {s}"),
                    other => format!("{k}: {other}"),
                })
                .collect();
            text.push_str(". ");
            text.push_str(&attrs.join(", "));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_identity_is_stable() {
        let a = EntityProfile::contact("A@x.com", Some("A"));
        let b = EntityProfile::contact("a@x.com ", None);
        assert_eq!(a.id, b.id);
        assert_eq!(b.name, "a@x.com");
        assert_eq!(a.attributes["email"], "a@x.com");
    }

    #[test]
    fn test_relationships_are_idempotent() {
        let mut alice = EntityProfile::new("person", "Alice");
        let bob = EntityProfile::new("person", "Bob");
        assert!(alice.add_relationship("knows", bob.id));
        assert!(!alice.add_relationship("knows", bob.id));
        assert_eq!(alice.related_ids(Some("knows")), vec![bob.id]);
        assert!(alice.related_ids(Some("manages")).is_empty());
    }

    #[test]
    fn test_related_ids_across_relations_dedups() {
        let mut alice = EntityProfile::new("person", "Alice");
        let bob = EntityProfile::new("person", "Bob");
        alice.add_relationship("knows", bob.id);
        alice.add_relationship("works_with", bob.id);
        assert_eq!(alice.related_ids(None), vec![bob.id]);
    }

    #[test]
    fn test_embedding_text() {
        let p = EntityProfile::new("topic", "Budget").with_attribute("owner", "finance");
        assert_eq!(p.embedding_text(), "topic: Budget. owner: finance");
    }

    #[test]
    fn test_merge_overwrites() {
        let mut p = EntityProfile::contact("a@x.com", None).with_attribute("tier", "gold");
        let mut patch = Map::new();
        patch.insert("tier".into(), Value::from("silver"));
        patch.insert("phone".into(), Value::from("555"));
        p.merge_attributes(patch);
        assert_eq!(p.attributes["tier"], "silver");
        assert_eq!(p.attributes["phone"], "555");
        assert_eq!(p.attributes["email"], "a@x.com");
    }
}
