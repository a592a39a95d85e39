//! Git indexing and analysis through the tool surface.

use engram_e2e_tests::harness::{seed_repo, TestHarness};
use serde_json::json;
use tempfile::TempDir;

fn repo_with_history() -> TempDir {
    let dir = TempDir::new().unwrap();
    seed_repo(
        dir.path(),
        &[
            ("parser.rs", "fn parse() {}\n", "add the parser skeleton"),
            (
                "parser.rs",
                "fn parse() { todo!() }\n",
                "fix parser crash on empty input",
            ),
            ("readme.md", "docs\n", "write the readme"),
        ],
    );
    dir
}

#[tokio::test]
async fn index_then_search_commits() {
    let repo = repo_with_history();
    let harness = TestHarness::with_repo(repo.path().to_path_buf());

    let indexed = harness.call_ok("index_commits", json!({})).await;
    assert_eq!(indexed["commits_indexed"], json!(3));

    // Incremental second run
    let again = harness.call_ok("index_commits", json!({})).await;
    assert_eq!(again["commits_indexed"], json!(0));

    let found = harness
        .call_ok(
            "search_commits",
            json!({ "query": "parser crash empty input", "limit": 3 }),
        )
        .await;
    assert!(found["count"].as_u64().unwrap() >= 1);
    assert_eq!(
        found["results"][0]["message"],
        json!("fix parser crash on empty input")
    );

    let by_author = harness
        .call_ok(
            "search_commits",
            json!({ "query": "parser", "author": "Somebody Else" }),
        )
        .await;
    assert_eq!(by_author["count"], json!(0));
}

#[tokio::test]
async fn file_history_and_authors() {
    let repo = repo_with_history();
    let harness = TestHarness::with_repo(repo.path().to_path_buf());

    let history = harness
        .call_ok("get_file_history", json!({ "path": "parser.rs" }))
        .await;
    assert_eq!(history["count"], json!(2));

    let authors = harness
        .call_ok("get_code_authors", json!({ "path": "parser.rs" }))
        .await;
    assert_eq!(authors["results"][0]["author"], json!("E2E Author"));
    assert_eq!(authors["results"][0]["commit_count"], json!(2));
}

#[tokio::test]
async fn churn_hotspots_have_contract_field_names() {
    let repo = repo_with_history();
    let harness = TestHarness::with_repo(repo.path().to_path_buf());

    let churn = harness
        .call_ok("get_churn_hotspots", json!({ "days": 30, "limit": 5 }))
        .await;
    let top = &churn["results"][0];
    assert_eq!(top["file_path"], json!("parser.rs"));
    assert_eq!(top["change_count"], json!(2));
    for field in [
        "file_path",
        "change_count",
        "total_insertions",
        "total_deletions",
        "authors",
        "last_changed",
    ] {
        assert!(top.get(field).is_some(), "missing contract field {}", field);
    }
}

#[tokio::test]
async fn missing_repo_is_a_reasoned_empty_result() {
    let harness = TestHarness::new();

    let indexed = harness.call_ok("index_commits", json!({})).await;
    assert_eq!(indexed["reason"], json!("git_not_configured"));

    let history = harness
        .call_ok("get_file_history", json!({ "path": "anything.rs" }))
        .await;
    assert_eq!(history["count"], json!(0));
    assert_eq!(history["reason"], json!("git_not_configured"));

    let churn = harness.call_ok("get_churn_hotspots", json!({})).await;
    assert_eq!(churn["reason"], json!("git_not_configured"));
}
