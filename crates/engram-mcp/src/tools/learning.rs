//! Learning Tools
//!
//! `get_clusters`, `get_cluster_members`, `validate_value`, `store_value`,
//! `list_values`. Clusters are derived on demand from one experience axis;
//! values are stored only after passing the centroid-similarity gate.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use engram_core::{
    cluster, cosine_similarity, validation_threshold, value_payload, Axis, ClusterParams,
    ClusterPoint, Clustering, ConfidenceTier, Point, ValueRecord, VALUES_COLLECTION,
};

use super::{check_range_u, enum_prop, int_prop, parse_args, parse_closed, string_prop, ToolError, ToolResult};
use crate::engine::Engine;

pub fn clusters_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "axis": enum_prop("Experience axis to cluster", Axis::names()),
            "min_cluster_size": int_prop("Minimum members per cluster", 2, 100, 5),
            "min_samples": int_prop("Neighbors required for a core point", 1, 10, 3),
        },
        "required": ["axis"]
    })
}

pub fn members_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "axis": enum_prop("Experience axis", Axis::names()),
            "cluster_id": int_prop("Cluster id from get_clusters", 0, 100_000, 0),
            "min_cluster_size": int_prop("Minimum members per cluster", 2, 100, 5),
            "min_samples": int_prop("Neighbors required for a core point", 1, 10, 3),
        },
        "required": ["axis", "cluster_id"]
    })
}

pub fn validate_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "axis": enum_prop("Experience axis", Axis::names()),
            "cluster_id": int_prop("Source cluster id", 0, 100_000, 0),
            "text": string_prop("Candidate value text"),
            "min_cluster_size": int_prop("Minimum members per cluster", 2, 100, 5),
            "min_samples": int_prop("Neighbors required for a core point", 1, 10, 3),
        },
        "required": ["axis", "cluster_id", "text"]
    })
}

pub fn store_schema() -> Value {
    validate_schema()
}

pub fn list_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "axis": enum_prop("Restrict to one axis", Axis::names()),
            "limit": int_prop("Page size", 1, 100, 20),
            "offset": int_prop("Page offset", 0, 100_000, 0),
        },
        "required": []
    })
}

#[derive(Debug, Deserialize)]
struct ClustersArgs {
    axis: String,
    min_cluster_size: Option<usize>,
    min_samples: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct MembersArgs {
    axis: String,
    cluster_id: i64,
    min_cluster_size: Option<usize>,
    min_samples: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ValueArgs {
    axis: String,
    cluster_id: i64,
    text: String,
    min_cluster_size: Option<usize>,
    min_samples: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    axis: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

/// Load every embedding of one axis with its tier weight
fn load_axis_points(engine: &Engine, axis: Axis) -> Result<Vec<ClusterPoint>, ToolError> {
    engine.ghap.ensure_collections()?;

    let mut points = Vec::new();
    let mut offset = 0;
    const PAGE: usize = 256;
    loop {
        let page = engine
            .store
            .scroll(axis.collection_name(), PAGE, offset, None, true)
            .map_err(engram_core::EngineError::from)?;
        let page_len = page.len();
        for point in page {
            let weight = point
                .payload
                .get("weight")
                .and_then(Value::as_f64)
                .map(|w| w as f32)
                .unwrap_or_else(|| ConfidenceTier::Abandoned.weight());
            points.push(ClusterPoint {
                id: point.id,
                vector: point.vector,
                weight,
            });
        }
        if page_len < PAGE {
            break;
        }
        offset += PAGE;
    }
    Ok(points)
}

fn params_from(
    min_cluster_size: Option<usize>,
    min_samples: Option<usize>,
) -> Result<ClusterParams, ToolError> {
    let defaults = ClusterParams::default();
    Ok(ClusterParams {
        min_cluster_size: check_range_u(
            "min_cluster_size",
            min_cluster_size.unwrap_or(defaults.min_cluster_size),
            2,
            100,
        )?,
        min_samples: check_range_u(
            "min_samples",
            min_samples.unwrap_or(defaults.min_samples),
            1,
            10,
        )?,
        eps: defaults.eps,
    })
}

fn run_clustering(
    engine: &Engine,
    axis: Axis,
    params: &ClusterParams,
) -> Result<Clustering, ToolError> {
    let points = load_axis_points(engine, axis)?;
    Ok(cluster(&points, params)?)
}

pub fn execute_clusters(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: ClustersArgs = parse_args(args)?;
    let axis: Axis = parse_closed(&args.axis)?;
    let params = params_from(args.min_cluster_size, args.min_samples)?;

    let clustering = run_clustering(engine, axis, &params)?;

    let clusters: Vec<Value> = clustering
        .clusters
        .iter()
        .map(|cluster| {
            json!({
                "cluster_id": cluster.id,
                "size": cluster.member_ids.len(),
                "member_ids": cluster.member_ids,
            })
        })
        .collect();

    Ok(json!({
        "axis": axis.as_str(),
        "n_clusters": clusters.len(),
        "noise_count": clustering.noise_count,
        "noise_ratio": clustering.noise_ratio(),
        "clusters": clusters,
    }))
}

pub fn execute_members(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: MembersArgs = parse_args(args)?;
    let axis: Axis = parse_closed(&args.axis)?;
    let params = params_from(args.min_cluster_size, args.min_samples)?;

    let clustering = run_clustering(engine, axis, &params)?;
    let Some(found) = clustering.clusters.iter().find(|c| c.id == args.cluster_id) else {
        return Err(ToolError::from(engram_core::EngineError::NotFound(format!(
            "cluster {} on axis {}",
            args.cluster_id,
            axis.as_str()
        ))));
    };

    let mut members = Vec::new();
    for member_id in &found.member_ids {
        let point = engine
            .store
            .get(axis.collection_name(), member_id)
            .map_err(engram_core::EngineError::from)?;
        if let Some(point) = point {
            members.push(json!({
                "ghap_id": member_id,
                "text": point.payload.get("text").cloned().unwrap_or(Value::Null),
                "domain": point.payload.get("domain").cloned().unwrap_or(Value::Null),
                "outcome": point.payload.get("outcome").cloned().unwrap_or(Value::Null),
                "confidence_tier": point.payload.get("confidence_tier").cloned().unwrap_or(Value::Null),
            }));
        }
    }

    Ok(json!({
        "axis": axis.as_str(),
        "cluster_id": found.id,
        "size": members.len(),
        "members": members,
    }))
}

/// Shared validation: embed the candidate and gate it against the source
/// cluster centroid at `mean(member_sims) + 0.5·stddev(member_sims)`
fn validate_candidate(
    engine: &Engine,
    axis: Axis,
    cluster_id: i64,
    text: &str,
    params: &ClusterParams,
) -> Result<(Vec<f32>, f32, f32), ToolError> {
    if text.trim().is_empty() {
        return Err(ToolError::validation("text cannot be empty"));
    }

    let clustering = run_clustering(engine, axis, params)?;
    let Some(found) = clustering.clusters.iter().find(|c| c.id == cluster_id) else {
        return Err(ToolError::from(engram_core::EngineError::NotFound(format!(
            "cluster {} on axis {}",
            cluster_id,
            axis.as_str()
        ))));
    };

    let vector = engine
        .registry
        .semantic()
        .embed(text)
        .map_err(engram_core::EngineError::from)?;
    let similarity = cosine_similarity(&vector, &found.centroid);
    let threshold = validation_threshold(&found.member_similarities);
    Ok((vector, similarity, threshold))
}

pub fn execute_validate(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: ValueArgs = parse_args(args)?;
    let axis: Axis = parse_closed(&args.axis)?;
    let params = params_from(args.min_cluster_size, args.min_samples)?;

    let (_, similarity, threshold) =
        validate_candidate(engine, axis, args.cluster_id, &args.text, &params)?;

    Ok(json!({
        "valid": similarity >= threshold,
        "similarity": similarity,
        "threshold": threshold,
    }))
}

pub fn execute_store(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: ValueArgs = parse_args(args)?;
    let axis: Axis = parse_closed(&args.axis)?;
    let params = params_from(args.min_cluster_size, args.min_samples)?;

    let (vector, similarity, threshold) =
        validate_candidate(engine, axis, args.cluster_id, &args.text, &params)?;
    if similarity < threshold {
        return Err(ToolError::validation(format!(
            "value similarity {:.4} is below the cluster threshold {:.4}",
            similarity, threshold
        )));
    }

    engine
        .store
        .ensure_collection(VALUES_COLLECTION, engine.registry.semantic().dimension())
        .map_err(engram_core::EngineError::from)?;

    let record = ValueRecord {
        id: Uuid::new_v4().to_string(),
        axis,
        cluster_id: args.cluster_id,
        text: args.text.clone(),
        similarity_to_centroid: f64::from(similarity),
        created_at: Utc::now(),
    };
    engine
        .metadata
        .insert_value(&record)
        .map_err(engram_core::EngineError::from)?;
    engine
        .store
        .upsert(
            VALUES_COLLECTION,
            Point::new(
                record.id.clone(),
                vector,
                value_payload(
                    &record.id,
                    axis,
                    record.cluster_id,
                    &record.text,
                    record.similarity_to_centroid,
                    record.created_at,
                ),
            ),
        )
        .map_err(engram_core::EngineError::from)?;

    Ok(json!({ "ok": true, "id": record.id }))
}

pub fn execute_list(engine: &Engine, args: Option<Value>) -> ToolResult {
    let args: ListArgs = parse_args(args)?;
    let limit = check_range_u("limit", args.limit.unwrap_or(20), 1, 100)?;
    let axis = args.axis.as_deref().map(parse_closed::<Axis>).transpose()?;

    let values = engine
        .metadata
        .list_values(axis, limit, args.offset.unwrap_or(0))
        .map_err(engram_core::EngineError::from)?;

    let results: Vec<Value> = values
        .iter()
        .map(|value| {
            json!({
                "id": value.id,
                "axis": value.axis.as_str(),
                "cluster_id": value.cluster_id,
                "text": value.text,
                "similarity_to_centroid": value.similarity_to_centroid,
                "created_at": value.created_at.to_rfc3339(),
            })
        })
        .collect();

    Ok(json!({ "count": results.len(), "results": results }))
}
