//! GHAP Tools
//!
//! `start_ghap`, `update_ghap`, `resolve_ghap`, `get_active_ghap`,
//! `list_ghap_entries`. Start/update/resolve return minimal bodies; the
//! 500-byte cap on mutation responses is a tested invariant.

use serde::Deserialize;
use serde_json::{json, Value};

use engram_core::{
    Domain, GhapFilter, GhapRecord, GhapStart, GhapUpdate, Outcome, Resolution, Strategy,
};

use super::{check_range_u, enum_prop, int_prop, parse_args, parse_closed, string_prop, ToolResult};
use crate::engine::Engine;

pub fn start_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "goal": string_prop("What this episode tries to achieve"),
            "hypothesis": string_prop("The belief under test"),
            "action": string_prop("What will be done"),
            "prediction": string_prop("The expected observation"),
            "domain": enum_prop("Problem domain", Domain::names()),
            "strategy": enum_prop("Approach taken", Strategy::names()),
            "session_id": string_prop("Override the caller-derived session id"),
        },
        "required": ["goal", "hypothesis", "action", "prediction", "domain", "strategy"]
    })
}

pub fn update_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "hypothesis": string_prop("Revised hypothesis"),
            "action": string_prop("Revised action"),
            "prediction": string_prop("Revised prediction"),
            "session_id": string_prop("Override the caller-derived session id"),
        },
        "required": []
    })
}

pub fn resolve_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "outcome": enum_prop("How the episode ended", Outcome::names()),
            "surprise": string_prop("What was unexpected (required when falsified)"),
            "root_cause": string_prop("Why the prediction failed (required when falsified)"),
            "lesson": string_prop("Takeaway worth keeping"),
            "session_id": string_prop("Override the caller-derived session id"),
        },
        "required": ["outcome"]
    })
}

pub fn active_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "session_id": string_prop("Override the caller-derived session id"),
        },
        "required": []
    })
}

pub fn list_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "session_id": string_prop("Restrict to one session"),
            "domain": enum_prop("Restrict to one domain", Domain::names()),
            "outcome": enum_prop("Restrict to one outcome", Outcome::names()),
            "limit": int_prop("Page size", 1, 100, 20),
            "offset": int_prop("Page offset", 0, 100_000, 0),
        },
        "required": []
    })
}

#[derive(Debug, Deserialize)]
struct StartArgs {
    goal: String,
    hypothesis: String,
    action: String,
    prediction: String,
    domain: String,
    strategy: String,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    hypothesis: Option<String>,
    action: Option<String>,
    prediction: Option<String>,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResolveArgs {
    outcome: String,
    surprise: Option<String>,
    root_cause: Option<String>,
    lesson: Option<String>,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActiveArgs {
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    session_id: Option<String>,
    domain: Option<String>,
    outcome: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

fn session<'a>(explicit: &'a Option<String>, derived: &'a str) -> &'a str {
    explicit.as_deref().unwrap_or(derived)
}

pub fn execute_start(engine: &Engine, session_id: &str, args: Option<Value>) -> ToolResult {
    let args: StartArgs = parse_args(args)?;
    let domain: Domain = parse_closed(&args.domain)?;
    let strategy: Strategy = parse_closed(&args.strategy)?;

    let entry = engine.ghap.start(
        session(&args.session_id, session_id),
        GhapStart {
            domain,
            strategy,
            goal: args.goal,
            hypothesis: args.hypothesis,
            action: args.action,
            prediction: args.prediction,
        },
    )?;

    // Minimal response; full entry data is not echoed
    Ok(json!({ "ok": true, "id": entry.id }))
}

pub fn execute_update(engine: &Engine, session_id: &str, args: Option<Value>) -> ToolResult {
    let args: UpdateArgs = parse_args(args)?;

    let entry = engine.ghap.update(
        session(&args.session_id, session_id),
        GhapUpdate {
            hypothesis: args.hypothesis,
            action: args.action,
            prediction: args.prediction,
        },
    )?;

    Ok(json!({ "ok": true, "id": entry.id, "iteration_count": entry.iteration_count }))
}

pub fn execute_resolve(engine: &Engine, session_id: &str, args: Option<Value>) -> ToolResult {
    let args: ResolveArgs = parse_args(args)?;
    let outcome: Outcome = parse_closed(&args.outcome)?;

    let id = engine.ghap.resolve(
        session(&args.session_id, session_id),
        Resolution {
            outcome,
            surprise: args.surprise,
            root_cause: args.root_cause,
            lesson: args.lesson,
        },
    )?;

    Ok(json!({ "ok": true, "id": id }))
}

pub fn execute_active(engine: &Engine, session_id: &str, args: Option<Value>) -> ToolResult {
    let args: ActiveArgs = parse_args(args)?;

    match engine.ghap.active(session(&args.session_id, session_id))? {
        Some(entry) => Ok(json!({
            "active": true,
            "entry": {
                "id": entry.id,
                "session_id": entry.session_id,
                "created_at": entry.created_at.to_rfc3339(),
                "domain": entry.domain.as_str(),
                "strategy": entry.strategy.as_str(),
                "goal": entry.goal,
                "hypothesis": entry.hypothesis,
                "action": entry.action,
                "prediction": entry.prediction,
                "iteration_count": entry.iteration_count,
            },
        })),
        None => Ok(json!({ "active": false })),
    }
}

pub fn execute_list(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: ListArgs = parse_args(args)?;
    let limit = check_range_u("limit", args.limit.unwrap_or(20), 1, 100)?;
    let domain = args.domain.as_deref().map(parse_closed::<Domain>).transpose()?;
    let outcome = args
        .outcome
        .as_deref()
        .map(parse_closed::<Outcome>)
        .transpose()?;

    let records = engine.metadata.list_ghap(&GhapFilter {
        session_id: args.session_id,
        domain,
        outcome,
        limit,
        offset: args.offset.unwrap_or(0),
    })
    .map_err(engram_core::EngineError::from)?;

    let results: Vec<Value> = records.iter().map(render_record).collect();
    Ok(json!({ "count": results.len(), "results": results }))
}

fn render_record(record: &GhapRecord) -> Value {
    json!({
        "id": record.id,
        "session_id": record.session_id,
        "created_at": record.created_at.to_rfc3339(),
        "resolved_at": record.resolved_at.map(|t| t.to_rfc3339()),
        "domain": record.domain.as_str(),
        "strategy": record.strategy.as_str(),
        "goal": record.goal,
        "hypothesis": record.hypothesis,
        "action": record.action,
        "prediction": record.prediction,
        "iteration_count": record.iteration_count,
        "outcome": record.outcome.map(|o| o.as_str()),
        "surprise": record.surprise,
        "root_cause": record.root_cause,
        "lesson": record.lesson,
        "confidence_tier": record.confidence_tier.map(|t| t.as_str()),
    })
}
