//! Semantic memory: facts, preferences and the entity graph.
//!
//! Facts live in one collection as [`MemoryRecord`]s. Entities live in a
//! second collection as [`EntityProfile`]s whose ids are deterministic, so
//! repeated sightings of the same contact or topic land on one profile.
//! Relationships are stored on the source profile as
//! `relation -> [target ids]`.
//!
//! Profile rewrites are serialized per id through striped locks. A lock is
//! only held for the synchronous reload and write; embedding happens
//! outside it, and a rewrite whose embedded text went stale is redone.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use concord_embed::SharedEmbedder;
use concord_types::{
    CONTACT_TYPE, EntityProfile, Id, MemoryDomain, MemoryRecord, MemoryScope, MemoryType,
    contact_key, deterministic_id,
};

use crate::error::Result;
use crate::filter::{Condition, Filter};
use crate::index::{
    ENTITY_COLLECTION, Point, SEMANTIC_COLLECTION, SharedIndex, from_payload, to_payload,
};
use crate::query::RecordQuery;
use crate::records::{RecordCollection, RecordPatch, soft};
use crate::validation::validate_entity;

/// Category prefix marking a fact as a preference.
pub const PREFERENCE_PREFIX: &str = "preference_";

const ENTITY_LOCK_STRIPES: usize = 64;

/// Embedding passes a contended rewrite gets before it writes anyway.
const ENTITY_EMBED_ATTEMPTS: usize = 3;

/// Fact, preference and entity store.
pub struct SemanticMemory {
    facts: RecordCollection,
    index: SharedIndex,
    embedder: SharedEmbedder,
    entity_locks: Vec<Mutex<()>>,
}

/// Outcome of one locked attempt at rewriting a profile.
enum Commit {
    Written(EntityProfile),
    Missing,
    Stale,
}

impl SemanticMemory {
    pub fn new(index: SharedIndex, embedder: SharedEmbedder) -> Result<Self> {
        index.ensure_collection(ENTITY_COLLECTION, embedder.dimensions())?;
        Ok(Self {
            facts: RecordCollection::new(
                index.clone(),
                embedder.clone(),
                SEMANTIC_COLLECTION,
                MemoryType::Semantic,
            )?,
            index,
            embedder,
            entity_locks: (0..ENTITY_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Facts
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn add(&self, record: MemoryRecord) -> Result<Id> {
        self.facts.insert(record).await
    }

    pub async fn add_fact(
        &self,
        content: &str,
        agent_id: &str,
        domain: MemoryDomain,
        scope: MemoryScope,
        category: Option<&str>,
    ) -> Result<Id> {
        let mut record = MemoryRecord::semantic(content, agent_id, domain).with_scope(scope);
        record.category = category.map(str::to_string);
        self.facts.insert(record).await
    }

    /// Store a preference under `preference_<category>`, visible to all agents.
    pub async fn add_preference(
        &self,
        content: &str,
        category: &str,
        agent_id: &str,
        domain: MemoryDomain,
    ) -> Result<Id> {
        self.add_preference_scoped(content, category, agent_id, domain, MemoryScope::Global)
            .await
    }

    pub async fn add_preference_scoped(
        &self,
        content: &str,
        category: &str,
        agent_id: &str,
        domain: MemoryDomain,
        scope: MemoryScope,
    ) -> Result<Id> {
        let record = MemoryRecord::semantic(content, agent_id, domain)
            .with_scope(scope)
            .with_category(format!("{PREFERENCE_PREFIX}{category}"));
        self.facts.insert(record).await
    }

    /// Ranked search over facts; every returned record is touched.
    pub async fn search(&self, query: &str, limit: usize, params: &RecordQuery) -> Vec<MemoryRecord> {
        soft(
            self.facts.search(query, limit, params).await,
            "Semantic search",
            Vec::new(),
        )
    }

    pub fn get(&self, id: Id) -> Option<MemoryRecord> {
        soft(self.facts.get(id), "Semantic get", None)
    }

    /// Look up a record without recording an access.
    pub fn peek(&self, id: Id) -> Option<MemoryRecord> {
        soft(self.facts.peek(id), "Semantic peek", None)
    }

    /// Record an access to a record obtained through [`Self::peek`].
    pub fn touch(&self, record: &mut MemoryRecord) {
        self.facts.touch_one(record);
    }

    pub async fn update(&self, id: Id, patch: RecordPatch) -> Result<bool> {
        self.facts.update(id, patch).await
    }

    pub fn delete(&self, id: Id) -> Result<bool> {
        self.facts.delete(id)
    }

    pub fn count(&self, params: &RecordQuery) -> usize {
        soft(self.facts.count(params), "Semantic count", 0)
    }

    /// Preferences by category prefix, unranked.
    ///
    /// `category` of `None` returns every preference.
    pub fn get_preferences(
        &self,
        category: Option<&str>,
        params: &RecordQuery,
        limit: usize,
    ) -> Vec<MemoryRecord> {
        let prefix = format!("{PREFERENCE_PREFIX}{}", category.unwrap_or(""));
        let params = params
            .clone()
            .matching(Filter::new().must(Condition::prefix("category", prefix)));
        soft(self.facts.scan(&params, limit), "Preference scan", Vec::new())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entities
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert an entity, or fold it into the existing profile with the same id.
    ///
    /// Folding keeps the stored creation time, mention count and
    /// relationships, takes the incoming name and merges attributes with
    /// incoming keys winning.
    pub async fn add_entity(&self, entity: EntityProfile) -> Result<Id> {
        validate_entity(&entity)?;
        let id = entity.id;
        self.rewrite_entity(id, |existing| {
            Some(match existing {
                Some(mut existing) => {
                    absorb(&mut existing, entity.clone());
                    existing
                }
                None => entity.clone(),
            })
        })
        .await?;
        debug!(id = %id, entity_type = %entity.entity_type, "Stored entity");
        Ok(id)
    }

    pub fn get_entity(&self, id: Id) -> Option<EntityProfile> {
        soft(self.load_entity(id), "Entity get", None).map(|(e, _)| e)
    }

    /// Ranked entity search over type, name and attributes.
    pub async fn search_entities(
        &self,
        query: &str,
        entity_type: Option<&str>,
        limit: usize,
    ) -> Vec<EntityProfile> {
        soft(
            self.search_entities_inner(query, entity_type, limit).await,
            "Entity search",
            Vec::new(),
        )
    }

    async fn search_entities_inner(
        &self,
        query: &str,
        entity_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EntityProfile>> {
        let vector = self.embedder.embed(query).await?;
        self.index
            .query(ENTITY_COLLECTION, &vector, &type_filter(entity_type), limit)?
            .into_iter()
            .map(|hit| from_payload(hit.payload))
            .collect()
    }

    /// Merge attributes into an entity. Returns `false` if it does not exist.
    pub async fn update_entity(&self, id: Id, attributes: Map<String, Value>) -> Result<bool> {
        let updated = self
            .rewrite_entity(id, |existing| {
                existing.map(|mut entity| {
                    entity.merge_attributes(attributes.clone());
                    entity
                })
            })
            .await?;
        Ok(updated.is_some())
    }

    /// Link `from` to `to` under `relation`. Idempotent.
    ///
    /// Returns `false` if `from` does not exist.
    pub async fn add_relationship(&self, from: Id, relation: &str, to: Id) -> Result<bool> {
        let mut added = false;
        let found = self.fold_entity(from, |entity| {
            added = entity.add_relationship(relation, to);
            added
        })?;
        if added {
            debug!(from = %from, relation, to = %to, "Added relationship");
        }
        Ok(found)
    }

    /// Entities `id` points at, through `relation` or any relation.
    pub fn get_related_entities(&self, id: Id, relation: Option<&str>) -> Vec<EntityProfile> {
        let Some(entity) = self.get_entity(id) else {
            return Vec::new();
        };
        let targets = entity.related_ids(relation);
        if targets.is_empty() {
            return Vec::new();
        }
        soft(
            self.index
                .retrieve(ENTITY_COLLECTION, &targets)
                .and_then(|points| {
                    points
                        .into_iter()
                        .map(|p| from_payload(p.payload))
                        .collect::<Result<Vec<EntityProfile>>>()
                }),
            "Related entity lookup",
            Vec::new(),
        )
    }

    /// Bump an entity's salience. Returns `false` if it does not exist.
    pub async fn increment_mention(&self, id: Id) -> Result<bool> {
        self.fold_entity(id, |entity| {
            entity.mention();
            true
        })
    }

    /// Entities in insertion order, optionally of one type.
    pub fn list_entities(&self, entity_type: Option<&str>, limit: usize) -> Vec<EntityProfile> {
        soft(
            self.index
                .scroll(ENTITY_COLLECTION, &type_filter(entity_type), limit)
                .and_then(|points| {
                    points
                        .into_iter()
                        .map(|p| from_payload(p.payload))
                        .collect::<Result<Vec<EntityProfile>>>()
                }),
            "Entity listing",
            Vec::new(),
        )
    }

    pub fn count_entities(&self, entity_type: Option<&str>) -> usize {
        soft(
            self.index.count(ENTITY_COLLECTION, &type_filter(entity_type)),
            "Entity count",
            0,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Contacts
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a contact sighting, keyed by email address.
    pub async fn add_contact(
        &self,
        email: &str,
        name: Option<&str>,
        attributes: Map<String, Value>,
    ) -> Result<Id> {
        let mut contact = EntityProfile::contact(email, name);
        contact.merge_attributes(attributes);
        validate_entity(&contact)?;
        let id = contact.id;
        self.rewrite_entity(id, |existing| {
            Some(match existing {
                Some(mut existing) => {
                    let mut sighting = contact.clone();
                    if name.is_none() {
                        // A nameless sighting keeps the name learned earlier.
                        sighting.name = existing.name.clone();
                    }
                    absorb(&mut existing, sighting);
                    existing
                }
                None => contact.clone(),
            })
        })
        .await?;
        info!(id = %id, "Recorded contact");
        Ok(id)
    }

    pub fn get_contact(&self, email: &str) -> Option<EntityProfile> {
        self.get_entity(contact_id(email))
    }

    pub async fn update_contact(&self, email: &str, patch: Map<String, Value>) -> Result<bool> {
        self.update_entity(contact_id(email), patch).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn load_entity(&self, id: Id) -> Result<Option<(EntityProfile, Vec<f32>)>> {
        match self.index.retrieve(ENTITY_COLLECTION, &[id])?.pop() {
            Some(point) => Ok(Some((from_payload(point.payload)?, point.vector))),
            None => Ok(None),
        }
    }

    fn write_entity(&self, entity: &EntityProfile, vector: Vec<f32>) -> Result<()> {
        self.index.upsert(
            ENTITY_COLLECTION,
            Point::new(entity.id, vector, to_payload(entity)?),
        )
    }

    fn entity_lock(&self, id: Id) -> &Mutex<()> {
        let stripe = id.as_u128() % self.entity_locks.len() as u128;
        &self.entity_locks[stripe as usize]
    }

    /// Change a stored profile in place, keeping its vector.
    ///
    /// `change` returns whether it altered the profile. Returns `false` if
    /// the profile does not exist.
    fn fold_entity(&self, id: Id, change: impl FnOnce(&mut EntityProfile) -> bool) -> Result<bool> {
        let _guard = self.entity_lock(id).lock();
        let Some((mut entity, vector)) = self.load_entity(id)? else {
            return Ok(false);
        };
        if change(&mut entity) {
            self.write_entity(&entity, vector)?;
        }
        Ok(true)
    }

    /// Rewrite a profile whose embedded text may change.
    ///
    /// `apply` maps the stored profile, if any, to the one to write; `None`
    /// writes nothing. It may run several times.
    async fn rewrite_entity<F>(&self, id: Id, apply: F) -> Result<Option<EntityProfile>>
    where
        F: Fn(Option<EntityProfile>) -> Option<EntityProfile>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let stored = self.load_entity(id)?.map(|(entity, _)| entity);
            let Some(draft) = apply(stored) else {
                return Ok(None);
            };
            let text = draft.embedding_text();
            let vector = self.embedder.embed(&text).await?;

            let force = attempt >= ENTITY_EMBED_ATTEMPTS;
            match self.commit_entity(id, &apply, &text, vector, force)? {
                Commit::Written(entity) => return Ok(Some(entity)),
                Commit::Missing => return Ok(None),
                Commit::Stale => {
                    debug!(id = %id, attempt, "Entity changed while embedding, retrying");
                }
            }
        }
    }

    /// Redo `apply` against the stored profile under its lock and write it
    /// if its text is still `text`, or regardless when `force` is set.
    fn commit_entity<F>(
        &self,
        id: Id,
        apply: &F,
        text: &str,
        vector: Vec<f32>,
        force: bool,
    ) -> Result<Commit>
    where
        F: Fn(Option<EntityProfile>) -> Option<EntityProfile>,
    {
        let _guard = self.entity_lock(id).lock();
        let stored = self.load_entity(id)?.map(|(entity, _)| entity);
        let Some(entity) = apply(stored) else {
            return Ok(Commit::Missing);
        };
        if entity.embedding_text() != text {
            if !force {
                return Ok(Commit::Stale);
            }
            warn!(id = %id, "Writing entity with an embedding of an older revision");
        }
        self.write_entity(&entity, vector)?;
        Ok(Commit::Written(entity))
    }
}

/// Fold a new sighting of a profile into the stored one. Creation time,
/// mention count and existing links survive.
fn absorb(existing: &mut EntityProfile, incoming: EntityProfile) {
    existing.name = incoming.name;
    existing.entity_type = incoming.entity_type;
    existing.merge_attributes(incoming.attributes);
    for (relation, targets) in incoming.relationships {
        for to in targets {
            existing.add_relationship(&relation, to);
        }
    }
}

fn contact_id(email: &str) -> Id {
    deterministic_id(&contact_key(email))
}

fn type_filter(entity_type: Option<&str>) -> Filter {
    match entity_type {
        Some(t) => Filter::new().must(Condition::eq("entity_type", t)),
        None => Filter::new(),
    }
}

/// Whether `profile` is a contact.
pub fn is_contact(profile: &EntityProfile) -> bool {
    profile.entity_type == CONTACT_TYPE
}
