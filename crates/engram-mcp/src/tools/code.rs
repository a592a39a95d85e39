//! Code Tools
//!
//! `index_codebase`, `search_code`, `find_similar_code`.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{json, Value};

use engram_core::{CodeHit, Language, SearchOps};

use super::{
    bool_prop, check_range_u, enum_prop, int_prop, parse_args, parse_closed, string_prop,
    ToolError, ToolResult,
};
use crate::engine::Engine;

pub fn index_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "directory": string_prop("Absolute directory to index"),
            "project": string_prop("Project identifier the units belong to"),
            "recursive": bool_prop("Descend into subdirectories", true),
        },
        "required": ["directory", "project"]
    })
}

pub fn search_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": string_prop("Semantic search query"),
            "project": string_prop("Restrict to one project"),
            "language": enum_prop("Restrict to one language", Language::names()),
            "limit": int_prop("Maximum results", 1, 50, 10),
        },
        "required": ["query"]
    })
}

pub fn similar_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "snippet": string_prop("Code snippet to find similar units for"),
            "project": string_prop("Restrict to one project"),
            "limit": int_prop("Maximum results", 1, 50, 10),
        },
        "required": ["snippet"]
    })
}

#[derive(Debug, Deserialize)]
struct IndexArgs {
    directory: String,
    project: String,
    recursive: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    project: Option<String>,
    language: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SimilarArgs {
    snippet: String,
    project: Option<String>,
    limit: Option<usize>,
}

pub fn execute_index(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: IndexArgs = parse_args(args)?;
    let directory = PathBuf::from(&args.directory);
    if !directory.is_absolute() {
        return Err(ToolError::validation(format!(
            "directory '{}' must be absolute",
            args.directory
        )));
    }

    let report = engine.indexer.index_directory(
        &directory,
        &args.project,
        args.recursive.unwrap_or(true),
    )?;

    Ok(json!({
        "files_scanned": report.files_scanned,
        "files_indexed": report.files_indexed,
        "files_skipped": report.files_skipped,
        "files_removed": report.files_removed,
        "units_indexed": report.units_indexed,
        "units_deleted": report.units_deleted,
        "by_language": report.by_language,
        "errors": report.errors,
    }))
}

pub fn execute_search(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: SearchArgs = parse_args(args)?;
    let limit = check_range_u("limit", args.limit.unwrap_or(10), 1, 50)?;
    let language = args
        .language
        .as_deref()
        .map(parse_closed::<Language>)
        .transpose()?;

    let hits = engine
        .searcher
        .search_code(&args.query, limit, args.project.as_deref(), language)?;
    Ok(render_hits(&hits))
}

pub fn execute_similar(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: SimilarArgs = parse_args(args)?;
    let limit = check_range_u("limit", args.limit.unwrap_or(10), 1, 50)?;

    let hits = engine
        .searcher
        .search_code(&args.snippet, limit, args.project.as_deref(), None)?;
    Ok(render_hits(&hits))
}

fn render_hits(hits: &[CodeHit]) -> Value {
    let results: Vec<Value> = hits
        .iter()
        .map(|hit| {
            json!({
                "id": hit.unit.id,
                "project": hit.unit.project,
                "file_path": hit.unit.file_path,
                "language": hit.unit.language.as_str(),
                "unit_type": hit.unit.unit_type.as_str(),
                "name": hit.unit.name,
                "qualified_name": hit.unit.qualified_name,
                "signature": hit.unit.signature,
                "start_line": hit.unit.start_line,
                "end_line": hit.unit.end_line,
                "has_docstring": hit.unit.has_docstring,
                "score": hit.score,
            })
        })
        .collect();
    json!({ "count": results.len(), "results": results })
}
