//! GHAP lifecycle through the tool surface: start, conflict, update,
//! resolve, search.

use engram_e2e_tests::harness::TestHarness;
use serde_json::json;

fn start_args() -> serde_json::Value {
    json!({
        "goal": "Fix null in parse",
        "hypothesis": "tokenizer drops the final token",
        "action": "log the token stream for truncated input",
        "prediction": "final token missing from the log",
        "domain": "debugging",
        "strategy": "root-cause-analysis",
    })
}

#[tokio::test]
async fn second_start_conflicts_with_live_id() {
    let harness = TestHarness::new();

    let first = harness.call_ok("start_ghap", start_args()).await;
    let first_id = first["id"].as_str().unwrap().to_string();

    let err = harness.call_err("start_ghap", start_args()).await;
    assert_eq!(err.kind, "active_ghap_exists");
    let envelope = err.to_json();
    assert_eq!(envelope["error"]["id"], json!(first_id));
}

#[tokio::test]
async fn falsified_resolve_without_fields_names_both() {
    let harness = TestHarness::new();
    harness.call_ok("start_ghap", start_args()).await;

    let err = harness
        .call_err("resolve_ghap", json!({ "outcome": "falsified" }))
        .await;
    assert_eq!(err.kind, "validation_error");
    assert!(err.message.contains("surprise"));
    assert!(err.message.contains("root_cause"));

    // Still active after the rejected resolve
    let active = harness.call_ok("get_active_ghap", json!({})).await;
    assert_eq!(active["active"], json!(true));
}

#[tokio::test]
async fn mutation_responses_stay_under_the_byte_cap() {
    let harness = TestHarness::new();

    let started = harness.call_ok("start_ghap", start_args()).await;
    assert!(started.to_string().len() <= 500);

    let resolved = harness
        .call_ok(
            "resolve_ghap",
            json!({ "outcome": "confirmed", "lesson": "log before guessing" }),
        )
        .await;
    assert!(resolved.to_string().len() <= 500);
    assert_eq!(resolved["ok"], json!(true));
}

#[tokio::test]
async fn full_lifecycle_lands_in_experience_search() {
    let harness = TestHarness::new();

    harness.call_ok("start_ghap", start_args()).await;
    let updated = harness
        .call_ok(
            "update_ghap",
            json!({ "action": "bisect the failing input instead" }),
        )
        .await;
    assert_eq!(updated["iteration_count"], json!(2));

    let resolved = harness
        .call_ok(
            "resolve_ghap",
            json!({
                "outcome": "falsified",
                "surprise": "the tokenizer was fine all along",
                "root_cause": "the parser reads one past the final token",
                "lesson": "check consumer before producer",
            }),
        )
        .await;
    let id = resolved["id"].as_str().unwrap().to_string();

    // Round trip: the resolved entry is findable by its goal wording
    let found = harness
        .call_ok(
            "search_experiences",
            json!({ "query": "fix null parse", "axis": "full", "limit": 5 }),
        )
        .await;
    assert!(found["count"].as_u64().unwrap() >= 1);
    assert_eq!(found["results"][0]["ghap_id"], json!(id));
    assert_eq!(found["results"][0]["confidence_tier"], json!("silver"));

    // Falsified axes exist too
    let surprises = harness
        .call_ok(
            "search_experiences",
            json!({ "query": "tokenizer fine", "axis": "surprise", "limit": 5 }),
        )
        .await;
    assert!(surprises["count"].as_u64().unwrap() >= 1);

    // And the row is listable with filters
    let listed = harness
        .call_ok(
            "list_ghap_entries",
            json!({ "outcome": "falsified", "limit": 10 }),
        )
        .await;
    assert_eq!(listed["count"], json!(1));
    assert_eq!(listed["results"][0]["iteration_count"], json!(2));

    // Resolved means no longer active; a second resolve has nothing to act on
    let err = harness
        .call_err("resolve_ghap", json!({ "outcome": "confirmed" }))
        .await;
    assert_eq!(err.kind, "no_active_ghap");
}

#[tokio::test]
async fn update_without_active_entry_is_a_conflict() {
    let harness = TestHarness::new();
    let err = harness
        .call_err("update_ghap", json!({ "action": "anything" }))
        .await;
    assert_eq!(err.kind, "no_active_ghap");
}

#[tokio::test]
async fn resolved_entries_are_immutable_in_the_store() {
    let harness = TestHarness::new();
    harness.call_ok("start_ghap", start_args()).await;
    let resolved = harness
        .call_ok("resolve_ghap", json!({ "outcome": "confirmed" }))
        .await;
    let id = resolved["id"].as_str().unwrap();

    let before = harness.engine.metadata.get_ghap(id).unwrap().unwrap();

    // A new episode in the same session must not disturb the resolved row
    harness.call_ok("start_ghap", start_args()).await;
    harness
        .call_ok("resolve_ghap", json!({ "outcome": "abandoned" }))
        .await;

    let after = harness.engine.metadata.get_ghap(id).unwrap().unwrap();
    assert_eq!(before.outcome, after.outcome);
    assert_eq!(before.iteration_count, after.iteration_count);
    assert_eq!(before.created_at, after.created_at);
}
