//! Context Assembler
//!
//! Token-budgeted composer over the unified search layer: query every
//! enabled source, de-duplicate by a stable fingerprint, rank by
//! `score · source_weight · recency_decay`, and greedily fill a markdown
//! block until the budget is exhausted. Token counts are estimated as
//! `⌈chars/4⌉` until an exact tokenizer is wired in.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};

use crate::enums::{Axis, SourceKind};
use crate::error::{EngineError, Result};
use crate::search::SearchOps;

/// Recency half-life style constant: one "decay unit" is 30 days
const RECENCY_SCALE_DAYS: f64 = 30.0;

/// Bucket width for the content-length component of the fingerprint
const LENGTH_BUCKET: usize = 256;

/// One candidate item for the context block.
///
/// `Hash` and `Eq` agree on the same fingerprint fields — `(source, id,
/// content-length bucket)` — so set-based de-duplication is sound.
#[derive(Debug, Clone)]
pub struct ContextItem {
    /// Originating source
    pub source: SourceKind,
    /// Source-local id
    pub id: String,
    /// Short label for the markdown line
    pub title: String,
    /// Body text
    pub body: String,
    /// Raw similarity score from search
    pub score: f32,
    /// Creation time, when the source provides one
    pub created_at: Option<DateTime<Utc>>,
}

impl ContextItem {
    fn length_bucket(&self) -> usize {
        self.body.chars().count() / LENGTH_BUCKET
    }

    /// Composite ranking score
    fn composite_score(&self, now: DateTime<Utc>) -> f64 {
        f64::from(self.score) * source_weight(self.source) * self.recency_decay(now)
    }

    fn recency_decay(&self, now: DateTime<Utc>) -> f64 {
        match self.created_at {
            Some(created_at) => {
                let age_days = (now - created_at).num_seconds().max(0) as f64 / 86_400.0;
                (-age_days / RECENCY_SCALE_DAYS).exp()
            }
            None => 1.0,
        }
    }

    /// Estimated token cost of this item's markdown line
    fn token_cost(&self) -> usize {
        estimate_tokens(&self.render())
    }

    fn render(&self) -> String {
        format!("- **[{}]** {}: {}\n", self.source.as_str(), self.title, self.body)
    }
}

impl PartialEq for ContextItem {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.id == other.id
            && self.length_bucket() == other.length_bucket()
    }
}

impl Eq for ContextItem {}

impl Hash for ContextItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.id.hash(state);
        self.length_bucket().hash(state);
    }
}

fn source_weight(source: SourceKind) -> f64 {
    match source {
        SourceKind::Values => 1.2,
        SourceKind::Experiences => 1.1,
        SourceKind::Memories => 1.0,
        SourceKind::Code => 0.9,
        SourceKind::Commits => 0.8,
    }
}

/// `⌈chars/4⌉`
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Assembly request
#[derive(Debug, Clone)]
pub struct ContextRequest {
    /// Search query
    pub query: String,
    /// Enabled sources
    pub sources: Vec<SourceKind>,
    /// Per-source search limit
    pub per_source_limit: usize,
    /// Total token budget
    pub max_tokens: usize,
}

/// Assembled context block
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContextBlock {
    /// The rendered markdown
    pub markdown: String,
    /// Number of items that made it under the budget
    pub items_included: usize,
    /// Estimated tokens consumed
    pub tokens_used: usize,
}

/// Token-budgeted context composer
pub struct ContextAssembler<S: SearchOps> {
    searcher: S,
}

impl<S: SearchOps> ContextAssembler<S> {
    /// Create the assembler over a search facade
    pub fn new(searcher: S) -> Self {
        Self { searcher }
    }

    /// Parse and validate source names; unknown names are rejected with
    /// the valid set enumerated
    pub fn parse_sources(names: &[String]) -> Result<Vec<SourceKind>> {
        if names.is_empty() {
            return Err(EngineError::Validation(
                "at least one source is required".to_string(),
            ));
        }
        names
            .iter()
            .map(|name| {
                SourceKind::parse_str(name).ok_or_else(|| {
                    EngineError::Validation(format!(
                        "unknown source '{}'; valid options: {}",
                        name,
                        SourceKind::names().join(", ")
                    ))
                })
            })
            .collect()
    }

    /// Assemble a context block for the request
    pub fn assemble(&self, request: &ContextRequest) -> Result<ContextBlock> {
        if request.query.trim().is_empty() {
            return Err(EngineError::Validation("query cannot be empty".to_string()));
        }
        if request.max_tokens == 0 {
            return Err(EngineError::Validation(
                "max_tokens must be at least 1".to_string(),
            ));
        }

        let mut candidates: Vec<ContextItem> = Vec::new();
        for source in &request.sources {
            candidates.extend(self.collect(*source, &request.query, request.per_source_limit)?);
        }

        // De-duplicate by fingerprint, first occurrence wins
        let mut seen: HashSet<ContextItem> = HashSet::new();
        let mut unique: Vec<ContextItem> = Vec::new();
        for item in candidates {
            if seen.insert(item.clone()) {
                unique.push(item);
            }
        }

        let now = Utc::now();
        unique.sort_by(|a, b| {
            b.composite_score(now)
                .partial_cmp(&a.composite_score(now))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        // Greedy fill: skip items that would overflow, keep trying smaller ones
        let header = format!("## Context: {}\n\n", request.query);
        let mut tokens_used = estimate_tokens(&header);
        let mut markdown = header;
        let mut items_included = 0;

        for item in &unique {
            let cost = item.token_cost();
            if tokens_used + cost > request.max_tokens {
                continue;
            }
            markdown.push_str(&item.render());
            tokens_used += cost;
            items_included += 1;
        }

        Ok(ContextBlock {
            markdown,
            items_included,
            tokens_used,
        })
    }

    fn collect(&self, source: SourceKind, query: &str, limit: usize) -> Result<Vec<ContextItem>> {
        let items = match source {
            SourceKind::Memories => self
                .searcher
                .search_memories(query, limit, None, None)?
                .into_iter()
                .map(|hit| ContextItem {
                    source,
                    id: hit.memory.id,
                    title: hit.memory.category.as_str().to_string(),
                    body: hit.memory.content,
                    score: hit.score,
                    created_at: Some(hit.memory.created_at),
                })
                .collect(),
            SourceKind::Experiences => self
                .searcher
                .search_experiences(query, limit, Axis::Full, None, None)?
                .into_iter()
                .map(|hit| ContextItem {
                    source,
                    id: hit.ghap_id,
                    title: format!("{}/{}", hit.domain.as_str(), hit.confidence_tier.as_str()),
                    body: hit.text,
                    score: hit.score,
                    created_at: Some(hit.created_at),
                })
                .collect(),
            SourceKind::Values => self
                .searcher
                .search_values(query, limit, None)?
                .into_iter()
                .map(|hit| ContextItem {
                    source,
                    id: hit.id,
                    title: format!("value/{}", hit.axis.as_str()),
                    body: hit.text,
                    score: hit.score,
                    created_at: Some(hit.created_at),
                })
                .collect(),
            SourceKind::Code => self
                .searcher
                .search_code(query, limit, None, None)?
                .into_iter()
                .map(|hit| ContextItem {
                    source,
                    id: hit.unit.id,
                    title: format!("{}:{}", hit.unit.file_path, hit.unit.start_line),
                    body: format!("{} — {}", hit.unit.qualified_name, hit.unit.signature),
                    score: hit.score,
                    created_at: None,
                })
                .collect(),
            SourceKind::Commits => self
                .searcher
                .search_commits(query, limit, None, None)?
                .into_iter()
                .map(|hit| ContextItem {
                    source,
                    id: hit.commit.sha.clone(),
                    title: hit.commit.sha.chars().take(8).collect(),
                    body: hit.commit.message,
                    score: hit.score,
                    created_at: Some(hit.commit.timestamp),
                })
                .collect(),
        };
        Ok(items)
    }
}
