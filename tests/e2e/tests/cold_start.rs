//! Cold start: against an empty state root, every read-only tool returns
//! empty results instead of erroring.

use engram_e2e_tests::harness::TestHarness;
use serde_json::json;

#[tokio::test]
async fn read_only_tools_survive_an_empty_state_root() {
    let harness = TestHarness::new();

    let retrieved = harness
        .call_ok("retrieve_memories", json!({ "query": "anything" }))
        .await;
    assert_eq!(retrieved["count"], json!(0));
    assert_eq!(retrieved["results"], json!([]));

    let listed = harness.call_ok("list_memories", json!({})).await;
    assert_eq!(listed["count"], json!(0));

    let code = harness
        .call_ok("search_code", json!({ "query": "anything" }))
        .await;
    assert_eq!(code["count"], json!(0));

    let experiences = harness
        .call_ok("search_experiences", json!({ "query": "anything" }))
        .await;
    assert_eq!(experiences["count"], json!(0));

    let commits = harness
        .call_ok("search_commits", json!({ "query": "anything" }))
        .await;
    assert_eq!(commits["count"], json!(0));

    let values = harness.call_ok("list_values", json!({})).await;
    assert_eq!(values["count"], json!(0));

    let entries = harness.call_ok("list_ghap_entries", json!({})).await;
    assert_eq!(entries["count"], json!(0));

    let active = harness.call_ok("get_active_ghap", json!({})).await;
    assert_eq!(active["active"], json!(false));

    let everything = harness
        .call_ok("search_all", json!({ "query": "anything" }))
        .await;
    for key in ["memories", "code", "experiences", "values", "commits"] {
        assert_eq!(everything[key], json!([]), "non-empty {}", key);
    }

    let context = harness
        .call_ok("assemble_context", json!({ "query": "anything" }))
        .await;
    assert_eq!(context["items_included"], json!(0));
}
