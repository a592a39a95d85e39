//! Git Tools
//!
//! `index_commits`, `search_commits`, `get_file_history`,
//! `get_churn_hotspots`, `get_code_authors`. A missing repository is a
//! non-error: tools return empty results with `reason:
//! "git_not_configured"`.

use serde::Deserialize;
use serde_json::{json, Value};

use engram_core::{CommitInfo, SearchOps};

use super::{check_range_u, int_prop, parse_args, parse_rfc3339, string_prop, ToolResult};
use crate::engine::Engine;

pub fn index_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "since": string_prop("Only index commits at or after this RFC-3339 timestamp"),
        },
        "required": []
    })
}

pub fn search_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": string_prop("Semantic search over commit messages"),
            "author": string_prop("Restrict to one author name"),
            "since": string_prop("Only commits at or after this RFC-3339 timestamp"),
            "limit": int_prop("Maximum results", 1, 50, 10),
        },
        "required": ["query"]
    })
}

pub fn history_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": string_prop("File path relative to the repository root"),
            "limit": int_prop("Maximum commits", 1, 100, 20),
        },
        "required": ["path"]
    })
}

pub fn churn_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "days": int_prop("Window size in days", 1, 365, 30),
            "limit": int_prop("Maximum files", 1, 50, 10),
        },
        "required": []
    })
}

pub fn authors_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": string_prop("File path relative to the repository root"),
        },
        "required": ["path"]
    })
}

#[derive(Debug, Deserialize)]
struct IndexArgs {
    since: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    author: Option<String>,
    since: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct HistoryArgs {
    path: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ChurnArgs {
    days: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct AuthorsArgs {
    path: String,
}

fn not_configured() -> Value {
    json!({ "results": [], "count": 0, "reason": "git_not_configured" })
}

pub fn execute_index(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: IndexArgs = parse_args(args)?;
    let since = args
        .since
        .as_deref()
        .map(|s| parse_rfc3339("since", s))
        .transpose()?;

    match engine.git.index_commits(since)? {
        Some(report) => Ok(json!({
            "ok": true,
            "commits_indexed": report.commits_indexed,
            "last_commit_sha": report.last_commit_sha,
        })),
        None => Ok(not_configured()),
    }
}

pub fn execute_search(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: SearchArgs = parse_args(args)?;
    let limit = check_range_u("limit", args.limit.unwrap_or(10), 1, 50)?;
    let since = args
        .since
        .as_deref()
        .map(|s| parse_rfc3339("since", s))
        .transpose()?;

    let hits = engine
        .searcher
        .search_commits(&args.query, limit, args.author.as_deref(), since)?;

    let results: Vec<Value> = hits
        .iter()
        .map(|hit| {
            let mut commit = render_commit(&hit.commit);
            if let Some(object) = commit.as_object_mut() {
                object.insert("score".to_string(), json!(hit.score));
            }
            commit
        })
        .collect();

    Ok(json!({ "count": results.len(), "results": results }))
}

pub fn execute_history(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: HistoryArgs = parse_args(args)?;
    let limit = check_range_u("limit", args.limit.unwrap_or(20), 1, 100)?;

    if !engine.git.repo_available() {
        return Ok(not_configured());
    }
    let commits = engine.git.file_history(&args.path, limit)?;
    let results: Vec<Value> = commits.iter().map(render_commit).collect();
    Ok(json!({ "count": results.len(), "results": results }))
}

pub fn execute_churn(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: ChurnArgs = parse_args(args)?;
    let days = check_range_u("days", args.days.unwrap_or(30), 1, 365)?;
    let limit = check_range_u("limit", args.limit.unwrap_or(10), 1, 50)?;

    if !engine.git.repo_available() {
        return Ok(not_configured());
    }
    let hotspots = engine.git.churn_hotspots(days as u32, limit)?;

    // Attribute names are part of the contract
    let results: Vec<Value> = hotspots
        .iter()
        .map(|hotspot| {
            json!({
                "file_path": hotspot.file_path,
                "change_count": hotspot.change_count,
                "total_insertions": hotspot.total_insertions,
                "total_deletions": hotspot.total_deletions,
                "authors": hotspot.authors,
                "last_changed": hotspot.last_changed.to_rfc3339(),
            })
        })
        .collect();

    Ok(json!({ "count": results.len(), "results": results }))
}

pub fn execute_authors(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: AuthorsArgs = parse_args(args)?;

    if !engine.git.repo_available() {
        return Ok(not_configured());
    }
    let authors = engine.git.code_authors(&args.path)?;

    let results: Vec<Value> = authors
        .iter()
        .map(|stats| {
            json!({
                "author": stats.author,
                "author_email": stats.author_email,
                "commit_count": stats.commit_count,
                "insertions": stats.insertions,
                "deletions": stats.deletions,
            })
        })
        .collect();

    Ok(json!({ "count": results.len(), "results": results }))
}

fn render_commit(commit: &CommitInfo) -> Value {
    json!({
        "sha": commit.sha,
        "message": commit.message,
        "author": commit.author,
        "author_email": commit.author_email,
        "timestamp": commit.timestamp.to_rfc3339(),
        "files_changed": commit.files_changed,
        "insertions": commit.insertions,
        "deletions": commit.deletions,
    })
}
