//! Experience Clusterer
//!
//! Density-based clustering over one experience axis at a time, with
//! cosine distance. Deterministic for a fixed input: points are visited
//! in input order, neighbor sets are index-ordered, and cluster ids are
//! assigned in first-touch order. Centroids are confidence-tier-weighted
//! means, L2-normalized.

use std::collections::VecDeque;

use crate::embeddings::{cosine_distance, cosine_similarity, l2_normalize};
use crate::error::{EngineError, Result};

/// Label for noise points
pub const NOISE: i64 = -1;

/// Default cosine-distance neighborhood radius
pub const DEFAULT_EPS: f32 = 0.34;

/// Clustering parameters
#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    /// Minimum members for a cluster to survive
    pub min_cluster_size: usize,
    /// Neighbors (self included) required for a core point
    pub min_samples: usize,
    /// Cosine-distance neighborhood radius
    pub eps: f32,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 5,
            min_samples: 3,
            eps: DEFAULT_EPS,
        }
    }
}

/// Parameter recommendation by dataset size:
/// `min_cluster_size = max(3, min(⌊√n⌋, ⌊0.03·n⌋))`, `min_samples` tiered.
pub fn adaptive_params(n: usize) -> ClusterParams {
    let sqrt_n = (n as f64).sqrt().floor() as usize;
    let frac_n = ((n as f64) * 0.03).floor() as usize;
    let min_cluster_size = 3.max(sqrt_n.min(frac_n));
    let min_samples = if n < 50 {
        1
    } else if n < 200 {
        2
    } else {
        3
    };
    ClusterParams {
        min_cluster_size,
        min_samples,
        eps: DEFAULT_EPS,
    }
}

/// One input point: id, embedding, tier weight
#[derive(Debug, Clone)]
pub struct ClusterPoint {
    /// Point id (a GHAP id)
    pub id: String,
    /// Axis embedding
    pub vector: Vec<f32>,
    /// Confidence-tier weight
    pub weight: f32,
}

/// One output cluster
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Cluster id, 0-based in first-touch order
    pub id: i64,
    /// Member point ids, in input order
    pub member_ids: Vec<String>,
    /// Tier-weighted, L2-normalized centroid
    pub centroid: Vec<f32>,
    /// Cosine similarity of each member to the centroid, aligned with
    /// `member_ids`
    pub member_similarities: Vec<f32>,
}

/// Clustering result
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Per-point labels aligned with the input (`-1` = noise)
    pub labels: Vec<i64>,
    /// Surviving clusters in label order
    pub clusters: Vec<Cluster>,
    /// Number of noise points
    pub noise_count: usize,
}

impl Clustering {
    /// Fraction of points labeled noise
    pub fn noise_ratio(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.noise_count as f64 / self.labels.len() as f64
    }
}

/// Cluster one axis. `n < min_cluster_size` is `insufficient_data`;
/// callers translate it into a user-facing error.
pub fn cluster(points: &[ClusterPoint], params: &ClusterParams) -> Result<Clustering> {
    if params.min_cluster_size == 0 || params.min_samples == 0 {
        return Err(EngineError::Validation(
            "min_cluster_size and min_samples must be at least 1".to_string(),
        ));
    }
    if points.len() < params.min_cluster_size {
        return Err(EngineError::InsufficientData(format!(
            "{} points, need at least {} (min_cluster_size)",
            points.len(),
            params.min_cluster_size
        )));
    }

    let n = points.len();
    let neighbors = neighbor_table(points, params.eps);

    // DBSCAN expansion, deterministic by index order
    let mut labels = vec![NOISE; n];
    let mut visited = vec![false; n];
    let mut next_label: i64 = 0;

    for start in 0..n {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        if neighbors[start].len() < params.min_samples {
            continue;
        }

        let label = next_label;
        next_label += 1;
        labels[start] = label;

        let mut queue: VecDeque<usize> = neighbors[start].iter().copied().collect();
        while let Some(point) = queue.pop_front() {
            if labels[point] == NOISE {
                labels[point] = label;
            }
            if visited[point] {
                continue;
            }
            visited[point] = true;
            if neighbors[point].len() >= params.min_samples {
                for &neighbor in &neighbors[point] {
                    if !visited[neighbor] || labels[neighbor] == NOISE {
                        queue.push_back(neighbor);
                    }
                }
            }
        }
    }

    // Clusters below min_cluster_size dissolve into noise
    let mut sizes = vec![0usize; next_label as usize];
    for &label in &labels {
        if label >= 0 {
            sizes[label as usize] += 1;
        }
    }
    let mut remap = vec![NOISE; next_label as usize];
    let mut kept: i64 = 0;
    for (label, &size) in sizes.iter().enumerate() {
        if size >= params.min_cluster_size {
            remap[label] = kept;
            kept += 1;
        }
    }
    for label in labels.iter_mut() {
        if *label >= 0 {
            *label = remap[*label as usize];
        }
    }

    // Build surviving clusters with weighted centroids
    let mut clusters: Vec<Cluster> = (0..kept)
        .map(|id| Cluster {
            id,
            member_ids: Vec::new(),
            centroid: Vec::new(),
            member_similarities: Vec::new(),
        })
        .collect();
    for (i, &label) in labels.iter().enumerate() {
        if label >= 0 {
            clusters[label as usize].member_ids.push(points[i].id.clone());
        }
    }
    for cluster in clusters.iter_mut() {
        let members: Vec<&ClusterPoint> = points
            .iter()
            .filter(|p| cluster.member_ids.contains(&p.id))
            .collect();
        cluster.centroid = weighted_centroid(&members);
        cluster.member_similarities = members
            .iter()
            .map(|p| cosine_similarity(&p.vector, &cluster.centroid))
            .collect();
    }

    let noise_count = labels.iter().filter(|&&l| l == NOISE).count();
    Ok(Clustering {
        labels,
        clusters,
        noise_count,
    })
}

/// Index-ordered neighbor lists (self included) within `eps`
fn neighbor_table(points: &[ClusterPoint], eps: f32) -> Vec<Vec<usize>> {
    let n = points.len();
    let mut table = vec![Vec::new(); n];
    for i in 0..n {
        for j in 0..n {
            if i == j || cosine_distance(&points[i].vector, &points[j].vector) <= eps {
                table[i].push(j);
            }
        }
    }
    table
}

/// `centroid(C) = Σ wᵢ·vᵢ / Σ wᵢ`, L2-normalized
fn weighted_centroid(members: &[&ClusterPoint]) -> Vec<f32> {
    let Some(first) = members.first() else {
        return Vec::new();
    };
    let dims = first.vector.len();
    let mut centroid = vec![0.0_f32; dims];
    let mut total_weight = 0.0_f32;

    for member in members {
        total_weight += member.weight;
        for (c, v) in centroid.iter_mut().zip(member.vector.iter()) {
            *c += member.weight * v;
        }
    }
    if total_weight > 0.0 {
        for c in centroid.iter_mut() {
            *c /= total_weight;
        }
    }
    l2_normalize(&mut centroid);
    centroid
}

/// Value-validation threshold over the member similarities of the source
/// cluster: `mean + 0.5·stddev`
pub fn validation_threshold(member_similarities: &[f32]) -> f32 {
    if member_similarities.is_empty() {
        return 0.0;
    }
    let n = member_similarities.len() as f32;
    let mean = member_similarities.iter().sum::<f32>() / n;
    let variance = member_similarities
        .iter()
        .map(|s| (s - mean).powi(2))
        .sum::<f32>()
        / n;
    mean + 0.5 * variance.sqrt()
}
