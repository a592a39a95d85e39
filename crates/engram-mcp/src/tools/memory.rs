//! Memory Tools
//!
//! `store_memory`, `retrieve_memories`, `list_memories`, `delete_memory`.

use serde::Deserialize;
use serde_json::{json, Value};

use engram_core::{MemoryCategory, SearchOps};

use super::{
    check_range_f, check_range_u, enum_prop, int_prop, number_prop, parse_args, parse_closed,
    string_array_prop, string_prop, ToolResult,
};
use crate::engine::Engine;

pub fn store_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "content": string_prop("The text to remember (max 10000 characters)"),
            "category": enum_prop("Memory category", MemoryCategory::names()),
            "importance": number_prop("Importance weight", 0.0, 1.0, 0.5),
            "tags": string_array_prop("Free-form tags"),
        },
        "required": ["content", "category"]
    })
}

pub fn retrieve_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": string_prop("Semantic search query"),
            "limit": int_prop("Maximum results", 1, 50, 10),
            "category": enum_prop("Restrict to one category", MemoryCategory::names()),
            "min_importance": number_prop("Minimum importance", 0.0, 1.0, 0.0),
        },
        "required": ["query"]
    })
}

pub fn list_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "category": enum_prop("Restrict to one category", MemoryCategory::names()),
            "tags": string_array_prop("Require all of these tags"),
            "limit": int_prop("Page size", 1, 100, 20),
            "offset": int_prop("Page offset", 0, 100_000, 0),
        },
        "required": []
    })
}

pub fn delete_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": string_prop("Memory id to delete"),
        },
        "required": ["id"]
    })
}

#[derive(Debug, Deserialize)]
struct StoreArgs {
    content: String,
    category: String,
    importance: Option<f64>,
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RetrieveArgs {
    query: String,
    limit: Option<usize>,
    category: Option<String>,
    min_importance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    category: Option<String>,
    tags: Option<Vec<String>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    id: String,
}

pub fn execute_store(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: StoreArgs = parse_args(args)?;
    let category: MemoryCategory = parse_closed(&args.category)?;
    let importance = check_range_f("importance", args.importance.unwrap_or(0.5), 0.0, 1.0)?;

    let memory = engine
        .memories
        .store(&args.content, category, importance, args.tags.unwrap_or_default())?;

    // Minimal mutation response
    Ok(json!({ "ok": true, "id": memory.id }))
}

pub fn execute_retrieve(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: RetrieveArgs = parse_args(args)?;
    let limit = check_range_u("limit", args.limit.unwrap_or(10), 1, 50)?;
    let category = args
        .category
        .as_deref()
        .map(parse_closed::<MemoryCategory>)
        .transpose()?;

    let hits = engine
        .searcher
        .search_memories(&args.query, limit, category, args.min_importance)?;

    let results: Vec<Value> = hits
        .iter()
        .map(|hit| {
            json!({
                "id": hit.memory.id,
                "content": hit.memory.content,
                "category": hit.memory.category.as_str(),
                "importance": hit.memory.importance,
                "tags": hit.memory.tags,
                "score": hit.score,
                "created_at": hit.memory.created_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(json!({ "count": results.len(), "results": results }))
}

pub fn execute_list(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: ListArgs = parse_args(args)?;
    let limit = check_range_u("limit", args.limit.unwrap_or(20), 1, 100)?;
    let offset = args.offset.unwrap_or(0);
    let category = args
        .category
        .as_deref()
        .map(parse_closed::<MemoryCategory>)
        .transpose()?;

    let memories = engine
        .memories
        .list(category, &args.tags.unwrap_or_default(), limit, offset)?;

    let results: Vec<Value> = memories
        .iter()
        .map(|memory| {
            json!({
                "id": memory.id,
                "content": memory.content,
                "category": memory.category.as_str(),
                "importance": memory.importance,
                "tags": memory.tags,
                "created_at": memory.created_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(json!({ "count": results.len(), "results": results }))
}

pub fn execute_delete(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: DeleteArgs = parse_args(args)?;
    engine.memories.delete(&args.id)?;
    Ok(json!({ "ok": true }))
}
