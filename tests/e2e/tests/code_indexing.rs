//! Code re-index idempotence and search through the tool surface.

use engram_e2e_tests::harness::TestHarness;
use serde_json::json;

#[tokio::test]
async fn reindex_is_idempotent_until_content_changes() {
    let harness = TestHarness::new();
    let src = harness.scratch_dir("project");
    std::fs::write(
        src.join("math.rs"),
        "pub fn triangulate(points: &[f32]) -> f32 {\n    points.iter().sum()\n}\n",
    )
    .unwrap();
    std::fs::write(
        src.join("io.py"),
        "def load_fixture(path):\n    return open(path).read()\n",
    )
    .unwrap();

    let args = json!({
        "directory": src.display().to_string(),
        "project": "demo",
        "recursive": true,
    });

    let first = harness.call_ok("index_codebase", args.clone()).await;
    let units = first["units_indexed"].as_u64().unwrap();
    assert!(units >= 2);

    // Unchanged re-run: no vector writes
    let second = harness.call_ok("index_codebase", args.clone()).await;
    assert_eq!(second["units_indexed"], json!(0));
    assert_eq!(second["files_skipped"], json!(2));

    // Touch without content change: still skipped
    let body = std::fs::read(src.join("math.rs")).unwrap();
    std::fs::write(src.join("math.rs"), body).unwrap();
    let third = harness.call_ok("index_codebase", args.clone()).await;
    assert_eq!(third["units_indexed"], json!(0));

    // Modify a function body: re-indexed, and the old unit id is gone
    let before = harness
        .call_ok("search_code", json!({ "query": "triangulate points" }))
        .await;
    let old_id = before["results"][0]["id"].as_str().unwrap().to_string();

    std::fs::write(
        src.join("math.rs"),
        "pub fn triangulate(points: &[f32]) -> f32 {\n    points.iter().product()\n}\n",
    )
    .unwrap();
    let fourth = harness.call_ok("index_codebase", args).await;
    assert!(fourth["units_indexed"].as_u64().unwrap() >= 1);

    let after = harness
        .call_ok("search_code", json!({ "query": "triangulate points" }))
        .await;
    let ids: Vec<&str> = after["results"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["id"].as_str())
        .collect();
    assert!(!ids.contains(&old_id.as_str()));
}

#[tokio::test]
async fn indexed_function_is_findable_by_name() {
    let harness = TestHarness::new();
    let src = harness.scratch_dir("project");
    std::fs::write(
        src.join("cache.rs"),
        "pub fn invalidate_cache_entry(key: &str) {\n    drop(key);\n}\n\npub fn warm_cache() {}\n",
    )
    .unwrap();

    harness
        .call_ok(
            "index_codebase",
            json!({
                "directory": src.display().to_string(),
                "project": "demo",
            }),
        )
        .await;

    let found = harness
        .call_ok(
            "search_code",
            json!({ "query": "invalidate_cache_entry", "limit": 5 }),
        )
        .await;
    assert!(found["count"].as_u64().unwrap() >= 1);
    assert_eq!(
        found["results"][0]["qualified_name"],
        json!("invalidate_cache_entry")
    );
    assert_eq!(found["results"][0]["language"], json!("rust"));
    assert_eq!(found["results"][0]["unit_type"], json!("function"));
}

#[tokio::test]
async fn language_filter_restricts_results() {
    let harness = TestHarness::new();
    let src = harness.scratch_dir("project");
    std::fs::write(src.join("a.rs"), "pub fn shared_name() {}\n").unwrap();
    std::fs::write(src.join("b.py"), "def shared_name():\n    pass\n").unwrap();

    harness
        .call_ok(
            "index_codebase",
            json!({ "directory": src.display().to_string(), "project": "demo" }),
        )
        .await;

    let python_only = harness
        .call_ok(
            "search_code",
            json!({ "query": "shared_name", "language": "python" }),
        )
        .await;
    assert_eq!(python_only["count"], json!(1));
    assert_eq!(python_only["results"][0]["language"], json!("python"));
}

#[tokio::test]
async fn find_similar_code_uses_the_snippet() {
    let harness = TestHarness::new();
    let src = harness.scratch_dir("project");
    std::fs::write(
        src.join("retry.rs"),
        "pub fn retry_with_backoff(attempts: u32) -> bool {\n    attempts < 3\n}\n",
    )
    .unwrap();

    harness
        .call_ok(
            "index_codebase",
            json!({ "directory": src.display().to_string(), "project": "demo" }),
        )
        .await;

    let similar = harness
        .call_ok(
            "find_similar_code",
            json!({ "snippet": "fn retry_with_backoff(attempts: u32)" }),
        )
        .await;
    assert!(similar["count"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn relative_directory_is_rejected() {
    let harness = TestHarness::new();
    let err = harness
        .call_err(
            "index_codebase",
            json!({ "directory": "relative/path", "project": "demo" }),
        )
        .await;
    assert_eq!(err.kind, "validation_error");
}
