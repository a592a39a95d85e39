//! Token-budgeted context assembly across sources.

use engram_e2e_tests::harness::TestHarness;
use serde_json::json;

async fn populate(harness: &TestHarness) {
    for i in 0..10 {
        harness
            .call_ok(
                "store_memory",
                json!({
                    "content": format!("cache invalidation lesson number {} with details", i),
                    "category": "fact",
                    "importance": 0.6,
                }),
            )
            .await;
    }
    for i in 0..4 {
        harness
            .call_ok(
                "start_ghap",
                json!({
                    "goal": format!("tame cache invalidation bug {}", i),
                    "hypothesis": "stale keys survive the flush",
                    "action": "trace the flush path",
                    "prediction": "keys remain after flush",
                    "domain": "debugging",
                    "strategy": "instrument-and-observe",
                }),
            )
            .await;
        harness
            .call_ok("resolve_ghap", json!({ "outcome": "confirmed" }))
            .await;
    }
}

#[tokio::test]
async fn assembled_context_respects_the_budget() {
    let harness = TestHarness::new();
    populate(&harness).await;

    let block = harness
        .call_ok(
            "assemble_context",
            json!({
                "query": "cache invalidation",
                "sources": ["memories", "experiences"],
                "max_tokens": 1500,
            }),
        )
        .await;

    assert!(block["tokens_used"].as_u64().unwrap() <= 1500);
    assert!(block["items_included"].as_u64().unwrap() >= 1);
    let markdown = block["markdown"].as_str().unwrap();
    assert!(markdown.contains("cache invalidation"));
    assert!(markdown.contains("[memories]") || markdown.contains("[experiences]"));
}

#[tokio::test]
async fn tight_budget_includes_fewer_items() {
    let harness = TestHarness::new();
    populate(&harness).await;

    let generous = harness
        .call_ok(
            "assemble_context",
            json!({
                "query": "cache invalidation",
                "sources": ["memories"],
                "max_tokens": 5000,
            }),
        )
        .await;
    let tight = harness
        .call_ok(
            "assemble_context",
            json!({
                "query": "cache invalidation",
                "sources": ["memories"],
                "max_tokens": 80,
            }),
        )
        .await;

    assert!(
        tight["items_included"].as_u64().unwrap()
            < generous["items_included"].as_u64().unwrap()
    );
    assert!(tight["tokens_used"].as_u64().unwrap() <= 80);
}

#[tokio::test]
async fn unknown_source_is_rejected_with_the_valid_set() {
    let harness = TestHarness::new();
    let err = harness
        .call_err(
            "assemble_context",
            json!({ "query": "anything", "sources": ["memoirs"] }),
        )
        .await;
    assert_eq!(err.kind, "validation_error");
    assert!(err.message.contains("memories"));
    assert!(err.message.contains("values"));
}

#[tokio::test]
async fn default_sources_cover_everything() {
    let harness = TestHarness::new();
    populate(&harness).await;

    let block = harness
        .call_ok(
            "assemble_context",
            json!({ "query": "cache invalidation", "max_tokens": 2000 }),
        )
        .await;
    assert!(block["items_included"].as_u64().unwrap() >= 1);
}
