//! GHAP State Machine and Persister
//!
//! A GHAP episode (Goal-Hypothesis-Action-Prediction) is the structured
//! learning loop: one ACTIVE entry per session, updated as the loop
//! iterates, then resolved with an outcome. On resolve the entry is
//! rendered into up to four semantic axes, embedded, and persisted to both
//! the metadata store and the per-axis vector collections in one logical
//! operation with bounded retry.

mod types;

pub use types::{GhapEntry, GhapStart, GhapUpdate, Resolution};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::embeddings::EmbeddingRegistry;
use crate::enums::{Axis, ConfidenceTier, Outcome};
use crate::error::{EngineError, Result};
use crate::journal::SessionJournal;
use crate::metadata::{GhapRecord, MetadataStore};
use crate::store::{Point, VectorStore};

/// Persistence retry backoff schedule
const RETRY_BACKOFF: &[Duration] = &[
    Duration::from_millis(50),
    Duration::from_millis(100),
    Duration::from_millis(200),
];

/// GHAP lifecycle engine
pub struct GhapEngine {
    active: Mutex<HashMap<String, GhapEntry>>,
    metadata: Arc<MetadataStore>,
    store: Arc<dyn VectorStore>,
    registry: EmbeddingRegistry,
    journal: Arc<SessionJournal>,
}

impl GhapEngine {
    /// Create the engine
    pub fn new(
        metadata: Arc<MetadataStore>,
        store: Arc<dyn VectorStore>,
        registry: EmbeddingRegistry,
        journal: Arc<SessionJournal>,
    ) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            metadata,
            store,
            registry,
            journal,
        }
    }

    /// Lazily create every axis collection
    pub fn ensure_collections(&self) -> Result<()> {
        let dimensions = self.registry.semantic().dimension();
        for axis in Axis::ALL {
            self.store.ensure_collection(axis.collection_name(), dimensions)?;
        }
        Ok(())
    }

    fn active_map(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, GhapEntry>>> {
        self.active
            .lock()
            .map_err(|_| EngineError::Internal("active-entry lock poisoned".to_string()))
    }

    /// Start an episode. Exactly one ACTIVE entry per session: a second
    /// start surfaces `active_ghap_exists` with the live id.
    pub fn start(&self, session_id: &str, start: GhapStart) -> Result<GhapEntry> {
        start.validate()?;

        let mut active = self.active_map()?;
        if let Some(existing) = active.get(session_id) {
            return Err(EngineError::ActiveGhapExists {
                id: existing.id.clone(),
            });
        }

        let entry = GhapEntry {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            created_at: Utc::now(),
            domain: start.domain,
            strategy: start.strategy,
            goal: start.goal,
            hypothesis: start.hypothesis,
            action: start.action,
            prediction: start.prediction,
            iteration_count: 1,
        };
        active.insert(session_id.to_string(), entry.clone());
        drop(active);

        // Journal policy: start and resolve are journaled; updates are not
        self.journal_event(session_id, "ghap_start", &entry.id);
        Ok(entry)
    }

    /// Update the active episode; each update increments `iteration_count`
    pub fn update(&self, session_id: &str, update: GhapUpdate) -> Result<GhapEntry> {
        if update.is_empty() {
            return Err(EngineError::Validation(
                "update requires at least one of: hypothesis, action, prediction".to_string(),
            ));
        }

        let mut active = self.active_map()?;
        let entry = active
            .get_mut(session_id)
            .ok_or(EngineError::NoActiveGhap)?;

        if let Some(hypothesis) = update.hypothesis {
            entry.hypothesis = hypothesis;
        }
        if let Some(action) = update.action {
            entry.action = action;
        }
        if let Some(prediction) = update.prediction {
            entry.prediction = prediction;
        }
        entry.iteration_count += 1;
        Ok(entry.clone())
    }

    /// The active episode for a session, if any
    pub fn active(&self, session_id: &str) -> Result<Option<GhapEntry>> {
        Ok(self.active_map()?.get(session_id).cloned())
    }

    /// Resolve the active episode. Renders and embeds the axes, then
    /// persists the row and axis vectors together; on persistence failure
    /// the entry stays ACTIVE and the error is surfaced.
    pub fn resolve(&self, session_id: &str, resolution: Resolution) -> Result<String> {
        resolution.validate()?;

        let entry = {
            let active = self.active_map()?;
            active
                .get(session_id)
                .cloned()
                .ok_or(EngineError::NoActiveGhap)?
        };

        let record = build_record(&entry, &resolution);
        let axes = render_axes(&record);

        let texts: Vec<&str> = axes.iter().map(|(_, text)| text.as_str()).collect();
        let vectors = self.registry.semantic().embed_batch(&texts)?;

        self.persist_with_retry(&record, &axes, &vectors)?;

        self.active_map()?.remove(session_id);
        self.journal_event(session_id, "ghap_resolve", &record.id);
        Ok(record.id)
    }

    /// Both halves land or neither: the metadata insert and the axis
    /// upserts are idempotent, so a retry redoes the whole operation.
    fn persist_with_retry(
        &self,
        record: &GhapRecord,
        axes: &[(Axis, String)],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        let mut last_error: Option<EngineError> = None;
        for (attempt, backoff) in std::iter::once(&Duration::ZERO)
            .chain(RETRY_BACKOFF.iter())
            .enumerate()
        {
            if !backoff.is_zero() {
                std::thread::sleep(*backoff);
            }
            match self.persist_once(record, axes, vectors) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        ghap_id = %record.id,
                        attempt,
                        "experience persistence failed: {}",
                        e
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| EngineError::Internal("persistence failed without error".to_string())))
    }

    fn persist_once(
        &self,
        record: &GhapRecord,
        axes: &[(Axis, String)],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        self.ensure_collections()?;
        self.metadata.insert_ghap(record)?;

        for ((axis, text), vector) in axes.iter().zip(vectors) {
            let payload = axis_payload(record, *axis, text);
            self.store.upsert(
                axis.collection_name(),
                Point::new(record.id.clone(), vector.clone(), payload),
            )?;
        }
        Ok(())
    }

    fn journal_event(&self, session_id: &str, event: &str, ghap_id: &str) {
        let line = json!({ "event": event, "ghap_id": ghap_id });
        if let Err(e) = self.journal.append(session_id, &line) {
            tracing::warn!(session_id, "journal append failed: {}", e);
        }
        if let Err(e) = self.metadata.journal_touch(session_id) {
            tracing::warn!(session_id, "journal bookkeeping failed: {}", e);
        }
    }
}

fn build_record(entry: &GhapEntry, resolution: &Resolution) -> GhapRecord {
    GhapRecord {
        id: entry.id.clone(),
        session_id: entry.session_id.clone(),
        created_at: entry.created_at,
        resolved_at: Some(Utc::now()),
        domain: entry.domain,
        strategy: entry.strategy,
        goal: entry.goal.clone(),
        hypothesis: entry.hypothesis.clone(),
        action: entry.action.clone(),
        prediction: entry.prediction.clone(),
        iteration_count: entry.iteration_count,
        outcome: Some(resolution.outcome),
        surprise: resolution.surprise.clone(),
        root_cause: resolution.root_cause.clone(),
        lesson: resolution.lesson.clone(),
        confidence_tier: Some(ConfidenceTier::from_outcome(resolution.outcome)),
    }
}

/// Render the textual axes of a resolved episode. `surprise` and
/// `root_cause` exist only for falsified outcomes.
pub fn render_axes(record: &GhapRecord) -> Vec<(Axis, String)> {
    let mut axes = Vec::with_capacity(4);

    let mut full = format!(
        "Goal: {}\nHypothesis: {}\nAction: {}\nPrediction: {}\nOutcome: {}",
        record.goal,
        record.hypothesis,
        record.action,
        record.prediction,
        record
            .outcome
            .map(|o| o.as_str())
            .unwrap_or("unresolved"),
    );
    if let Some(surprise) = &record.surprise {
        full.push_str(&format!("\nSurprise: {}", surprise));
    }
    if let Some(root_cause) = &record.root_cause {
        full.push_str(&format!("\nRoot cause: {}", root_cause));
    }
    if let Some(lesson) = &record.lesson {
        full.push_str(&format!("\nLesson: {}", lesson));
    }
    axes.push((Axis::Full, full));

    axes.push((
        Axis::Strategy,
        format!(
            "Strategy: {}\nGoal: {}\nAction: {}",
            record.strategy.as_str(),
            record.goal,
            record.action
        ),
    ));

    if record.outcome == Some(Outcome::Falsified) {
        if let Some(surprise) = &record.surprise {
            axes.push((Axis::Surprise, surprise.clone()));
        }
        if let Some(root_cause) = &record.root_cause {
            axes.push((Axis::RootCause, root_cause.clone()));
        }
    }

    axes
}

/// Payload stored next to each axis vector
fn axis_payload(record: &GhapRecord, axis: Axis, text: &str) -> Map<String, Value> {
    let tier = record
        .confidence_tier
        .unwrap_or(ConfidenceTier::Abandoned);
    let mut payload = Map::new();
    payload.insert("ghap_id".to_string(), json!(record.id));
    payload.insert("session_id".to_string(), json!(record.session_id));
    payload.insert("axis".to_string(), json!(axis.as_str()));
    payload.insert("domain".to_string(), json!(record.domain.as_str()));
    payload.insert("strategy".to_string(), json!(record.strategy.as_str()));
    payload.insert(
        "outcome".to_string(),
        json!(record.outcome.map(|o| o.as_str())),
    );
    payload.insert("confidence_tier".to_string(), json!(tier.as_str()));
    payload.insert("weight".to_string(), json!(tier.weight()));
    payload.insert("text".to_string(), json!(text));
    payload.insert(
        "created_at".to_string(),
        json!(record.created_at.to_rfc3339()),
    );
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::{Domain, Strategy};
    use crate::store::MemoryVectorStore;

    fn engine() -> (tempfile::TempDir, GhapEngine, Arc<dyn VectorStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
        let metadata =
            Arc::new(MetadataStore::open(&dir.path().join("metadata.db")).unwrap());
        let journal = Arc::new(SessionJournal::new(dir.path().join("sessions")));
        let engine = GhapEngine::new(
            metadata,
            store.clone(),
            EmbeddingRegistry::deterministic(),
            journal,
        );
        (dir, engine, store)
    }

    fn sample_start() -> GhapStart {
        GhapStart {
            domain: Domain::Debugging,
            strategy: Strategy::RootCauseAnalysis,
            goal: "fix null in parse".to_string(),
            hypothesis: "tokenizer drops the last token".to_string(),
            action: "log token stream on truncated input".to_string(),
            prediction: "last token is missing from the log".to_string(),
        }
    }

    #[test]
    fn second_start_reports_the_live_id() {
        let (_dir, engine, _) = engine();
        let first = engine.start("s1", sample_start()).unwrap();

        let err = engine.start("s1", sample_start()).unwrap_err();
        match err {
            EngineError::ActiveGhapExists { id } => assert_eq!(id, first.id),
            other => panic!("expected conflict, got {:?}", other),
        }

        // A different session is unaffected
        engine.start("s2", sample_start()).unwrap();
    }

    #[test]
    fn update_without_active_entry_fails() {
        let (_dir, engine, _) = engine();
        let err = engine
            .update("s1", GhapUpdate {
                hypothesis: Some("x".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), "no_active_ghap");
    }

    #[test]
    fn updates_increment_iteration_count() {
        let (_dir, engine, _) = engine();
        engine.start("s1", sample_start()).unwrap();

        let entry = engine
            .update("s1", GhapUpdate {
                action: Some("bisect the input".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(entry.iteration_count, 2);
        assert_eq!(entry.action, "bisect the input");

        let entry = engine
            .update("s1", GhapUpdate {
                prediction: Some("fails below 3 tokens".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(entry.iteration_count, 3);
    }

    #[test]
    fn empty_update_is_a_validation_error() {
        let (_dir, engine, _) = engine();
        engine.start("s1", sample_start()).unwrap();
        let err = engine.update("s1", GhapUpdate::default()).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn falsified_resolve_requires_surprise_and_root_cause() {
        let (_dir, engine, _) = engine();
        engine.start("s1", sample_start()).unwrap();

        let err = engine
            .resolve("s1", Resolution {
                outcome: Outcome::Falsified,
                surprise: None,
                root_cause: None,
                lesson: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        let message = err.to_string();
        assert!(message.contains("surprise"));
        assert!(message.contains("root_cause"));

        // Entry is still active after the rejected resolve
        assert!(engine.active("s1").unwrap().is_some());
    }

    #[test]
    fn confirmed_resolve_persists_two_axes() {
        let (_dir, engine, store) = engine();
        engine.start("s1", sample_start()).unwrap();

        let id = engine
            .resolve("s1", Resolution {
                outcome: Outcome::Confirmed,
                surprise: None,
                root_cause: None,
                lesson: Some("log before guessing".to_string()),
            })
            .unwrap();

        assert!(engine.active("s1").unwrap().is_none());
        assert!(store.get(Axis::Full.collection_name(), &id).unwrap().is_some());
        assert!(store.get(Axis::Strategy.collection_name(), &id).unwrap().is_some());
        assert!(store.get(Axis::Surprise.collection_name(), &id).unwrap().is_none());
        assert!(store.get(Axis::RootCause.collection_name(), &id).unwrap().is_none());
    }

    #[test]
    fn falsified_resolve_persists_four_axes_with_silver_tier() {
        let (_dir, engine, store) = engine();
        engine.start("s1", sample_start()).unwrap();

        let id = engine
            .resolve("s1", Resolution {
                outcome: Outcome::Falsified,
                surprise: Some("the tokenizer was fine".to_string()),
                root_cause: Some("the parser reads past EOF".to_string()),
                lesson: None,
            })
            .unwrap();

        for axis in Axis::ALL {
            let point = store.get(axis.collection_name(), &id).unwrap();
            assert!(point.is_some(), "missing axis {}", axis);
        }
        let full = store.get(Axis::Full.collection_name(), &id).unwrap().unwrap();
        assert_eq!(full.payload["confidence_tier"], "silver");
        assert_eq!(
            full.payload["weight"].as_f64().unwrap() as f32,
            ConfidenceTier::Silver.weight()
        );
    }

    #[test]
    fn second_resolve_sees_no_active_entry() {
        let (_dir, engine, _) = engine();
        engine.start("s1", sample_start()).unwrap();
        engine
            .resolve("s1", Resolution {
                outcome: Outcome::Abandoned,
                surprise: None,
                root_cause: None,
                lesson: None,
            })
            .unwrap();

        let err = engine
            .resolve("s1", Resolution {
                outcome: Outcome::Confirmed,
                surprise: None,
                root_cause: None,
                lesson: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "no_active_ghap");
    }

    #[test]
    fn render_axes_for_confirmed_has_no_falsified_axes() {
        let (_dir, engine, _) = engine();
        let entry = engine.start("s1", sample_start()).unwrap();
        let record = build_record(&entry, &Resolution {
            outcome: Outcome::Confirmed,
            surprise: None,
            root_cause: None,
            lesson: None,
        });
        let axes = render_axes(&record);
        assert_eq!(axes.len(), 2);
        assert!(axes[0].1.contains("Goal: fix null in parse"));
        assert!(axes[1].1.contains("root-cause-analysis"));
    }
}
