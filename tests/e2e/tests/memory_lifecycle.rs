//! Cold-start memory lifecycle: store, retrieve, list, delete.

use engram_e2e_tests::harness::TestHarness;
use serde_json::json;

#[tokio::test]
async fn store_then_retrieve_returns_the_memory_as_top_hit() {
    let harness = TestHarness::new();

    let stored = harness
        .call_ok(
            "store_memory",
            json!({
                "content": "Prefer rebase over merge",
                "category": "preference",
                "importance": 0.8,
            }),
        )
        .await;
    assert_eq!(stored["ok"], json!(true));
    let id = stored["id"].as_str().expect("id missing").to_string();

    // A distractor so ranking matters
    harness
        .call_ok(
            "store_memory",
            json!({
                "content": "Stand-up happens at ten",
                "category": "fact",
                "importance": 0.3,
            }),
        )
        .await;

    let retrieved = harness
        .call_ok(
            "retrieve_memories",
            json!({ "query": "merge strategy rebase", "limit": 3 }),
        )
        .await;
    assert!(retrieved["count"].as_u64().unwrap() >= 1);
    assert_eq!(retrieved["results"][0]["id"], json!(id));
    assert_eq!(
        retrieved["results"][0]["content"],
        json!("Prefer rebase over merge")
    );
}

#[tokio::test]
async fn list_filters_by_category_and_tags() {
    let harness = TestHarness::new();
    harness
        .call_ok(
            "store_memory",
            json!({
                "content": "Use conventional commits",
                "category": "workflow",
                "tags": ["git", "style"],
            }),
        )
        .await;
    harness
        .call_ok(
            "store_memory",
            json!({
                "content": "CI is flaky on fridays",
                "category": "fact",
                "tags": ["ci"],
            }),
        )
        .await;

    let workflows = harness
        .call_ok("list_memories", json!({ "category": "workflow" }))
        .await;
    assert_eq!(workflows["count"], json!(1));

    let tagged = harness
        .call_ok("list_memories", json!({ "tags": ["git", "style"] }))
        .await;
    assert_eq!(tagged["count"], json!(1));
    assert_eq!(
        tagged["results"][0]["content"],
        json!("Use conventional commits")
    );
}

#[tokio::test]
async fn delete_removes_the_memory_everywhere() {
    let harness = TestHarness::new();
    let stored = harness
        .call_ok(
            "store_memory",
            json!({ "content": "ephemeral note about caching", "category": "context" }),
        )
        .await;
    let id = stored["id"].as_str().unwrap().to_string();

    harness.call_ok("delete_memory", json!({ "id": id })).await;

    let listed = harness.call_ok("list_memories", json!({})).await;
    assert_eq!(listed["count"], json!(0));

    let err = harness.call_err("delete_memory", json!({ "id": id })).await;
    assert_eq!(err.kind, "not_found");
}

#[tokio::test]
async fn importance_is_rejected_out_of_range() {
    let harness = TestHarness::new();
    let err = harness
        .call_err(
            "store_memory",
            json!({ "content": "x", "category": "fact", "importance": 2.0 }),
        )
        .await;
    assert_eq!(err.kind, "validation_error");
    assert!(err.message.contains("[0, 1]"));
}

#[tokio::test]
async fn unknown_category_error_enumerates_options() {
    let harness = TestHarness::new();
    let err = harness
        .call_err(
            "store_memory",
            json!({ "content": "x", "category": "opinion" }),
        )
        .await;
    assert_eq!(err.kind, "validation_error");
    assert!(err.message.contains("preference"));
    assert!(err.message.contains("context"));
}
