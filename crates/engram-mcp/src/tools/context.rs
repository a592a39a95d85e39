//! Context Tool
//!
//! `assemble_context`: token-budgeted markdown context block over the
//! enabled sources.

use serde::Deserialize;
use serde_json::{json, Value};

use engram_core::{ContextAssembler, ContextRequest, Searcher, SourceKind};

use super::{check_range_u, int_prop, parse_args, string_prop, ToolResult};
use crate::engine::Engine;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": string_prop("What the context should be about"),
            "sources": {
                "type": "array",
                "items": { "type": "string", "enum": SourceKind::names() },
                "description": "Sources to draw from (default: all)",
            },
            "per_source_limit": int_prop("Search limit per source", 1, 20, 5),
            "max_tokens": int_prop("Total token budget", 50, 20_000, 2_000),
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
struct Args {
    query: String,
    sources: Option<Vec<String>>,
    per_source_limit: Option<usize>,
    max_tokens: Option<usize>,
}

pub fn execute(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: Args = parse_args(args)?;
    let per_source_limit =
        check_range_u("per_source_limit", args.per_source_limit.unwrap_or(5), 1, 20)?;
    let max_tokens = check_range_u("max_tokens", args.max_tokens.unwrap_or(2_000), 50, 20_000)?;

    let sources = match args.sources {
        // Unknown source names are rejected with the valid set enumerated
        Some(names) => ContextAssembler::<Searcher>::parse_sources(&names)?,
        None => SourceKind::ALL.to_vec(),
    };

    let block = engine.assembler.assemble(&ContextRequest {
        query: args.query,
        sources,
        per_source_limit,
        max_tokens,
    })?;

    Ok(json!({
        "markdown": block.markdown,
        "items_included": block.items_included,
        "tokens_used": block.tokens_used,
    }))
}
