//! Search Tools
//!
//! `search_experiences` and `search_all`.

use serde::Deserialize;
use serde_json::{json, Value};

use engram_core::{Axis, Domain, ExperienceHit, Outcome, SearchOps};

use super::{check_range_u, enum_prop, int_prop, parse_args, parse_closed, string_prop, ToolResult};
use crate::engine::Engine;

pub fn experiences_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": string_prop("Semantic search over resolved experiences"),
            "axis": enum_prop("Axis to search (default full)", Axis::names()),
            "domain": enum_prop("Restrict to one domain", Domain::names()),
            "outcome": enum_prop("Restrict to one outcome", Outcome::names()),
            "limit": int_prop("Maximum results", 1, 50, 10),
        },
        "required": ["query"]
    })
}

pub fn all_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": string_prop("Query applied across every domain"),
            "limit_per_type": int_prop("Maximum results per domain", 1, 20, 5),
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
struct ExperiencesArgs {
    query: String,
    axis: Option<String>,
    domain: Option<String>,
    outcome: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct AllArgs {
    query: String,
    limit_per_type: Option<usize>,
}

pub fn execute_experiences(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: ExperiencesArgs = parse_args(args)?;
    let limit = check_range_u("limit", args.limit.unwrap_or(10), 1, 50)?;
    let axis = match args.axis.as_deref() {
        Some(axis) => parse_closed::<Axis>(axis)?,
        None => Axis::Full,
    };
    let domain = args.domain.as_deref().map(parse_closed::<Domain>).transpose()?;
    let outcome = args
        .outcome
        .as_deref()
        .map(parse_closed::<Outcome>)
        .transpose()?;

    let hits = engine
        .searcher
        .search_experiences(&args.query, limit, axis, domain, outcome)?;
    let results: Vec<Value> = hits.iter().map(render_experience).collect();
    Ok(json!({ "count": results.len(), "results": results }))
}

pub fn execute_all(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: AllArgs = parse_args(args)?;
    let limit = check_range_u("limit_per_type", args.limit_per_type.unwrap_or(5), 1, 20)?;

    let memories = engine.searcher.search_memories(&args.query, limit, None, None)?;
    let code = engine.searcher.search_code(&args.query, limit, None, None)?;
    let experiences =
        engine
            .searcher
            .search_experiences(&args.query, limit, Axis::Full, None, None)?;
    let values = engine.searcher.search_values(&args.query, limit, None)?;
    let commits = engine.searcher.search_commits(&args.query, limit, None, None)?;

    Ok(json!({
        "memories": memories.iter().map(|hit| json!({
            "id": hit.memory.id,
            "content": hit.memory.content,
            "category": hit.memory.category.as_str(),
            "score": hit.score,
        })).collect::<Vec<_>>(),
        "code": code.iter().map(|hit| json!({
            "id": hit.unit.id,
            "qualified_name": hit.unit.qualified_name,
            "file_path": hit.unit.file_path,
            "score": hit.score,
        })).collect::<Vec<_>>(),
        "experiences": experiences.iter().map(render_experience).collect::<Vec<_>>(),
        "values": values.iter().map(|hit| json!({
            "id": hit.id,
            "text": hit.text,
            "axis": hit.axis.as_str(),
            "score": hit.score,
        })).collect::<Vec<_>>(),
        "commits": commits.iter().map(|hit| json!({
            "sha": hit.commit.sha,
            "message": hit.commit.message,
            "score": hit.score,
        })).collect::<Vec<_>>(),
    }))
}

fn render_experience(hit: &ExperienceHit) -> Value {
    json!({
        "ghap_id": hit.ghap_id,
        "axis": hit.axis.as_str(),
        "text": hit.text,
        "domain": hit.domain.as_str(),
        "strategy": hit.strategy.as_str(),
        "outcome": hit.outcome.map(|o| o.as_str()),
        "confidence_tier": hit.confidence_tier.as_str(),
        "created_at": hit.created_at.to_rfc3339(),
        "score": hit.score,
    })
}
