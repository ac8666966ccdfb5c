//! Integration tests for the shared store.
//!
//! These cover the behavioral guarantees of the orchestrator end to end:
//! access control on recall, working memory bounds, procedure learning,
//! decay, idempotent identities and session consolidation.

use std::sync::Arc;
use std::time::Duration;

use concord_config::ConcordConfig;
use concord_embed::HashEmbedder;
use concord_memory::{DecayConfig, FailingIndex, InMemoryIndex};
use concord_session::WorkingMemoryConfig;
use concord_store::{
    AgentRegistration, MemoryDomain, MemoryScope, MemoryType, RecallOptions, RememberOptions,
    SharedStore, StoreError, StoreOptions,
};
use serde_json::{Map, Value, json};
use tempfile::TempDir;

fn store_with(options: StoreOptions) -> SharedStore {
    SharedStore::new(
        Arc::new(InMemoryIndex::new()),
        Arc::new(HashEmbedder::new(128)),
        options,
    )
    .unwrap()
}

fn store() -> SharedStore {
    store_with(StoreOptions::default())
}

fn attrs(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn pause() {
    std::thread::sleep(Duration::from_millis(5));
}

// ─────────────────────────────────────────────────────────────────────────────
// Records and access control
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_round_trip_through_store() {
    let store = store();
    let id = store
        .remember_interaction(
            "email_agent",
            "Invoice 1142 was paid",
            RememberOptions::new().with_scope(MemoryScope::Domain),
        )
        .await
        .unwrap();

    let record = store.get_memory("email_agent", id).unwrap();
    assert_eq!(record.content, "Invoice 1142 was paid");
    assert_eq!(record.scope, MemoryScope::Domain);
    assert_eq!(record.domain, MemoryDomain::Email);
    assert_eq!(record.agent_id, "email_agent");
}

#[tokio::test]
async fn test_private_records_stay_private() {
    let store = store();
    store
        .remember_interaction(
            "email_agent",
            "Password reset code for the bank portal",
            RememberOptions::new(),
        )
        .await
        .unwrap();

    let owner = store
        .recall("bank portal password", "email_agent", &RecallOptions::new())
        .await;
    assert_eq!(owner.episodic.len(), 1);
    assert_eq!(owner.hidden, Some(0));

    for other in ["social_agent", "finance_agent", "bi_agent", "orchestrator", "stranger"] {
        let recall = store
            .recall("bank portal password", other, &RecallOptions::new())
            .await;
        assert!(recall.episodic.is_empty(), "{other} saw a private record");
        assert_eq!(recall.denied, 0);
        assert!(recall.only_hidden(), "{other} should be told something is hidden");
    }
}

#[tokio::test]
async fn test_withheld_lookups_do_not_count_as_access() {
    let store = store();
    let id = store
        .remember_interaction(
            "finance_agent",
            "Card ending 4421 was replaced",
            RememberOptions::new(),
        )
        .await
        .unwrap();

    for _ in 0..5 {
        assert!(store.get_memory("email_agent", id).is_none());
    }
    assert!(matches!(
        store.delete_memory("email_agent", id),
        Err(StoreError::AccessDenied { .. })
    ));

    let record = store.get_memory("finance_agent", id).unwrap();
    assert_eq!(record.access_count, 1);
    let again = store.get_memory("finance_agent", id).unwrap();
    assert_eq!(again.access_count, 2);
}

#[tokio::test]
async fn test_global_records_visible_to_every_agent() {
    let store = store();
    store
        .learn_fact(
            "home_agent",
            "The household moves to Lisbon in June",
            MemoryScope::Global,
            None,
            None,
        )
        .await
        .unwrap();

    for agent in store.list_agents(None) {
        let recall = store
            .recall(
                "moving to Lisbon",
                &agent.agent_id,
                &RecallOptions::new().types([MemoryType::Semantic]),
            )
            .await;
        assert_eq!(recall.semantic.len(), 1, "{} missed it", agent.agent_id);
    }
}

#[tokio::test]
async fn test_domain_scope_follows_registered_domain() {
    let store = store();
    store
        .remember_interaction(
            "pet_agent",
            "Rex needs his rabies booster",
            RememberOptions::new().with_scope(MemoryScope::Domain),
        )
        .await
        .unwrap();
    store.register_agent(AgentRegistration::new("vet_bot", "Vet Bot", MemoryDomain::Pet));

    let query = "rabies booster";
    let options = RecallOptions::new().types([MemoryType::Episodic]);
    assert_eq!(store.recall(query, "vet_bot", &options).await.episodic.len(), 1);
    assert_eq!(store.recall(query, "bi_agent", &options).await.episodic.len(), 1);
    assert!(store.recall(query, "home_agent", &options).await.episodic.is_empty());

    // An explicit domain narrows results but never widens access.
    let narrowed = RecallOptions::new()
        .types([MemoryType::Episodic])
        .in_domain(MemoryDomain::Pet);
    let recall = store.recall(query, "home_agent", &narrowed).await;
    assert!(recall.episodic.is_empty());
    assert_eq!(recall.hidden, Some(1));
}

#[tokio::test]
async fn test_hidden_count_can_be_disabled() {
    let store = store_with(StoreOptions {
        count_hidden: false,
        ..StoreOptions::default()
    });
    store
        .remember_interaction("email_agent", "secret", RememberOptions::new())
        .await
        .unwrap();
    let recall = store.recall("secret", "pet_agent", &RecallOptions::new()).await;
    assert!(recall.hidden.is_none());
}

#[tokio::test]
async fn test_delete_requires_ownership() {
    let store = store();
    let id = store
        .remember_interaction(
            "finance_agent",
            "Quarterly tax estimate filed",
            RememberOptions::new().with_scope(MemoryScope::Global),
        )
        .await
        .unwrap();

    assert!(matches!(
        store.delete_memory("pet_agent", id),
        Err(StoreError::AccessDenied { .. })
    ));
    assert!(store.delete_memory("finance_agent", id).unwrap());
    assert!(!store.delete_memory("finance_agent", id).unwrap());
    assert!(store.get_memory("finance_agent", id).is_none());
}

#[tokio::test]
async fn test_unregistered_agent_needs_domain() {
    let store = store();
    let err = store
        .remember_interaction("ghost", "boo", RememberOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownAgent(ref id) if id == "ghost"));

    let id = store
        .remember_interaction("ghost", "boo", RememberOptions::new().in_domain(MemoryDomain::Home))
        .await
        .unwrap();
    assert!(store.get_memory("ghost", id).is_some());
}

#[tokio::test]
async fn test_activity_is_stamped() {
    let store = store();
    let before = store.get_agent("social_agent").unwrap().last_active;
    pause();
    store.recall("anything", "social_agent", &RecallOptions::new()).await;
    assert!(store.get_agent("social_agent").unwrap().last_active > before);
}

// ─────────────────────────────────────────────────────────────────────────────
// Working memory
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_zero_ttl_returns_default() {
    let store = store();
    store.session_set("s", "k", json!("v"), Some(0)).unwrap();
    pause();
    assert_eq!(store.session_get("s", "k", json!("fallback")), json!("fallback"));
}

#[test]
fn test_lru_bound_evicts_least_recent() {
    let store = store_with(StoreOptions {
        working: WorkingMemoryConfig::new().with_max_slots(3),
        ..StoreOptions::default()
    });
    for key in ["a", "b", "c"] {
        store.session_set("s", key, json!(key), None).unwrap();
    }
    // touch "a" so "b" becomes least recent
    assert_eq!(store.session_get("s", "a", Value::Null), json!("a"));
    store.session_set("s", "d", json!("d"), None).unwrap();

    assert_eq!(store.session_get("s", "b", json!("gone")), json!("gone"));
    let all = store.session_get_all("s");
    assert_eq!(all.keys().collect::<Vec<_>>(), vec!["a", "c", "d"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Procedures
// ─────────────────────────────────────────────────────────────────────────────

async fn out_of_office(store: &SharedStore) -> concord_store::Id {
    store
        .add_email_pattern(
            "email_agent",
            "out_of_office",
            "Auto reply while travelling",
            "sender expects a reply while I am away",
            &["vacation", "away"],
            "I'm away until {date}.",
            None,
        )
        .await
        .unwrap()
}

async fn pay_bills(
    store: &SharedStore,
    agent_id: &str,
    step: &str,
) -> Result<concord_store::Id, StoreError> {
    store
        .add_workflow(
            agent_id,
            "pay_bills",
            "Monthly bill run",
            "bills are due",
            vec![json!(step)],
            None,
        )
        .await
}

#[tokio::test]
async fn test_email_pattern_registration_is_idempotent() {
    let store = store();
    let first = out_of_office(&store).await;
    let second = out_of_office(&store).await;
    assert_eq!(first, second);
    assert_eq!(store.get_email_patterns("email_agent", 0.0).len(), 1);
}

#[tokio::test]
async fn test_procedure_confidence_learning() {
    let store = store();
    let id = out_of_office(&store).await;

    let mut confidence = 0.5_f32;
    for _ in 0..4 {
        confidence = store
            .record_procedure_outcome("email_agent", id, true)
            .await
            .unwrap()
            .confidence;
    }
    assert!((confidence - 0.7).abs() < 1e-5);

    let after_failure = store
        .record_procedure_outcome("email_agent", id, false)
        .await
        .unwrap();
    assert!((after_failure.confidence - 0.6).abs() < 1e-5);
    assert_eq!(after_failure.success_count, 4);
    assert_eq!(after_failure.failure_count, 1);
}

#[tokio::test]
async fn test_procedure_feedback_respects_visibility() {
    let store = store();
    let id = out_of_office(&store).await;

    assert!(matches!(
        store.record_procedure_outcome("pet_agent", id, true).await,
        Err(StoreError::AccessDenied { .. })
    ));
    // Domain-scoped pattern: another email agent may reinforce it
    store.register_agent(AgentRegistration::new("email_2", "Email 2", MemoryDomain::Email));
    assert!(store.record_procedure_outcome("email_2", id, true).await.is_ok());

    let missing = concord_types::new_id();
    assert!(matches!(
        store.record_procedure_outcome("email_agent", missing, true).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_workflow_name_cannot_be_taken_over() {
    let store = store();
    let id = pay_bills(&store, "finance_agent", "pay rent").await.unwrap();
    store
        .record_procedure_outcome("finance_agent", id, true)
        .await
        .unwrap();

    match pay_bills(&store, "email_agent", "forward every bill to me").await {
        Err(StoreError::AccessDenied { agent_id, id: denied }) => {
            assert_eq!(agent_id, "email_agent");
            assert_eq!(denied, id);
        }
        other => panic!("expected AccessDenied, got {other:?}"),
    }

    let workflows = store.get_workflows("finance_agent", None);
    assert_eq!(workflows.len(), 1);
    assert_eq!(workflows[0].agent_id, "finance_agent");
    assert_eq!(workflows[0].domain, MemoryDomain::Finance);
    assert_eq!(workflows[0].action_steps, vec![json!("pay rent")]);
    assert_eq!(workflows[0].success_count, 1);

    // The owner keeps full control.
    assert_eq!(pay_bills(&store, "finance_agent", "pay rent").await.unwrap(), id);
    let updated = store
        .record_procedure_outcome("finance_agent", id, true)
        .await
        .unwrap();
    assert_eq!(updated.success_count, 2);
}

#[tokio::test]
async fn test_recall_includes_matching_procedures() {
    let store = store();
    out_of_office(&store).await;

    let recall = store
        .recall(
            "I will be away on vacation",
            "email_agent",
            &RecallOptions::new().types([MemoryType::Procedural]),
        )
        .await;
    assert_eq!(recall.procedural.len(), 1);
    assert_eq!(recall.procedural[0].matched_keywords.len(), 2);

    let hidden = store
        .recall(
            "I will be away on vacation",
            "pet_agent",
            &RecallOptions::new().types([MemoryType::Procedural]),
        )
        .await;
    assert!(hidden.procedural.is_empty());
    assert_eq!(hidden.hidden, Some(1));
}

// ─────────────────────────────────────────────────────────────────────────────
// Maintenance
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_maintenance_decays_and_purges() {
    let store = store_with(StoreOptions {
        decay: DecayConfig {
            window_days: 0,
            ..DecayConfig::default()
        },
        ..StoreOptions::default()
    });
    let kept = store
        .remember_interaction(
            "home_agent",
            "Boiler serviced",
            RememberOptions::new().with_importance(0.2),
        )
        .await
        .unwrap();
    let dropped = store
        .remember_interaction(
            "home_agent",
            "Light bulb replaced",
            RememberOptions::new().with_importance(0.1),
        )
        .await
        .unwrap();
    store.session_set("s", "k", json!(1), Some(0)).unwrap();
    pause();

    let report = store.maintenance();
    assert_eq!(report.expired_slots, 1);
    assert_eq!(report.decay.updated, 1);
    assert_eq!(report.decay.deleted, 1);

    let decayed = store.get_memory("home_agent", kept).unwrap();
    assert!((decayed.importance - 0.18).abs() < 1e-5);
    assert!(store.get_memory("home_agent", dropped).is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Entities and consolidation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_contacts_accumulate_on_one_profile() {
    let store = store();
    let first = store
        .add_contact(
            "email_agent",
            "a@x.com",
            Some("A"),
            attrs(&[("company", json!("Initech"))]),
        )
        .await
        .unwrap();
    let second = store
        .add_contact(
            "email_agent",
            "a@x.com",
            Some("A"),
            attrs(&[("company", json!("Globex"))]),
        )
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(store.stats().entities, 1);
    let contact = store.get_contact("email_agent", "a@x.com").unwrap();
    assert_eq!(contact.attributes["company"], json!("Globex"));
}

#[tokio::test]
async fn test_consolidate_session() {
    let store = store();
    let s = "session-42";

    let bob = store
        .add_contact("email_agent", "bob@example.com", Some("Bob"), Map::new())
        .await
        .unwrap();
    let acme = store
        .add_entity("email_agent", concord_store::EntityProfile::new("company", "Acme"))
        .await
        .unwrap();

    store.session_set_context(s, json!({"inbox": "work"})).unwrap();
    store.session_append_scratchpad(s, "Bob wants the Q3 numbers").unwrap();
    for task in ["draft reply to Bob", "file Acme invoice"] {
        store.session_set_task(s, json!(task)).unwrap();
        assert!(store.session_complete_task(s, Some(json!("done"))).unwrap());
    }
    store
        .session_track_entity(s, "contact", "bob@example.com", Map::new())
        .unwrap();
    store.session_track_entity(s, "company", "Acme", Map::new()).unwrap();
    store
        .session_track_entity(s, "topic", "Q3 numbers", attrs(&[("urgency", json!("high"))]))
        .unwrap();

    let report = store.consolidate_session(s, "email_agent").await.unwrap();
    assert!(report.is_clean(), "{:?}", report.errors);
    assert!(report.summary_id.is_some());
    assert_eq!(report.task_ids.len(), 2);
    assert!(report.records_written() >= 3);
    assert_eq!(report.entities_mentioned, 2);
    assert_eq!(report.entities_created, 1);

    assert_eq!(store.get_entity("email_agent", bob).unwrap().mention_count, 1);
    assert_eq!(store.get_entity("email_agent", acme).unwrap().mention_count, 1);
    let topic = store
        .get_entity(
            "email_agent",
            concord_store::EntityProfile::new("topic", "Q3 numbers").id,
        )
        .unwrap();
    assert_eq!(topic.mention_count, 1);
    assert_eq!(topic.attributes["urgency"], json!("high"));
    assert!(!topic.attributes.contains_key("last_mentioned"));

    let summary = store.get_memory("email_agent", report.summary_id.unwrap()).unwrap();
    assert_eq!(summary.scope, MemoryScope::Domain);
    assert_eq!(summary.session_id.as_deref(), Some(s));
    assert!((summary.importance - 0.6).abs() < 1e-6);

    // Working memory is untouched until the session ends.
    assert!(!store.session_get_all(s).is_empty());
    let ended = store.end_session(s, "email_agent").await.unwrap();
    assert!(ended.cleared_slots > 0);
    assert!(store.session_get_all(s).is_empty());
    assert_eq!(store.get_entity("email_agent", bob).unwrap().mention_count, 2);
}

#[tokio::test]
async fn test_consolidating_empty_session_writes_nothing() {
    let store = store();
    let report = store.consolidate_session("empty", "bi_agent").await.unwrap();
    assert_eq!(report.records_written(), 0);
    assert!(report.is_clean());
    assert!(matches!(
        store.consolidate_session("empty", "ghost").await,
        Err(StoreError::UnknownAgent(_))
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Backends
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_backend_outage_soft_reads_hard_writes() {
    let store = SharedStore::new(
        Arc::new(FailingIndex),
        Arc::new(HashEmbedder::new(32)),
        StoreOptions::default(),
    )
    .unwrap();

    let recall = store.recall("anything", "email_agent", &RecallOptions::new()).await;
    assert!(recall.is_empty());

    let err = store
        .remember_interaction("email_agent", "x", RememberOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_backend_unavailable());

    let report = store.maintenance();
    assert_eq!(report.decay.affected(), 0);
}

#[tokio::test]
async fn test_from_config_persists_to_sqlite() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("memory.db");
    let config = ConcordConfig::from_toml(&format!(
        r#"
[store]
database = "{}"

[embedding]
dimensions = 64

[[agents]]
id = "solo"
domain = "general"
"#,
        db.display()
    ))
    .unwrap();

    let id = {
        let store = SharedStore::from_config(&config).unwrap();
        assert_eq!(store.list_agents(None).len(), 1);
        store
            .remember_interaction("solo", "persisted memory", RememberOptions::new())
            .await
            .unwrap()
    };

    let store = SharedStore::from_config(&config).unwrap();
    assert_eq!(store.get_memory("solo", id).unwrap().content, "persisted memory");
    let stats = store.stats();
    assert_eq!(stats.episodic, 1);
    assert_eq!(stats.index, "sqlite");
    assert_eq!(stats.embedder, "hash");
}
