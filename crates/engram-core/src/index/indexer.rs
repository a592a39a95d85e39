//! Directory Indexing
//!
//! Per-file pipeline: fingerprint, short-circuit on an unchanged content
//! hash, extract units, paginate-delete the file's prior units, embed in
//! batches, upsert, and only then update the `indexed_files` row — so a
//! failed file leaves its previous state intact and a re-run redoes it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::embeddings::EmbeddingRegistry;
use crate::enums::{Language, UnitType};
use crate::error::{EngineError, Result};
use crate::metadata::{IndexedFileRecord, MetadataStore};
use crate::store::{Filter, Point, VectorStore};

use super::units::extract_units;

/// Collection holding code-unit embeddings (code dimension)
pub const CODE_UNITS_COLLECTION: &str = "code_units";

/// Directory names never descended into
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "target",
    "build",
    "dist",
    "__pycache__",
    ".venv",
    "venv",
    "vendor",
    ".next",
    ".cache",
];

/// An indexed semantic unit
#[derive(Debug, Clone, serde::Serialize)]
pub struct CodeUnit {
    /// Unit id
    pub id: String,
    /// Owning project
    pub project: String,
    /// Path relative to the indexed directory
    pub file_path: String,
    /// Source language
    pub language: Language,
    /// Kind of unit
    pub unit_type: UnitType,
    /// Bare name
    pub name: String,
    /// Container-qualified name
    pub qualified_name: String,
    /// Declaration line
    pub signature: String,
    /// 1-based first line
    pub start_line: usize,
    /// 1-based last line
    pub end_line: usize,
    /// Unit length in lines
    pub line_count: usize,
    /// Documentation attached
    pub has_docstring: bool,
    /// Hash of the owning file's bytes
    pub content_hash: String,
    /// Owning file's mtime, epoch seconds
    pub mtime: i64,
}

impl CodeUnit {
    /// Payload stored next to the embedding
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("project".to_string(), json!(self.project));
        payload.insert("file_path".to_string(), json!(self.file_path));
        payload.insert("language".to_string(), json!(self.language.as_str()));
        payload.insert("unit_type".to_string(), json!(self.unit_type.as_str()));
        payload.insert("name".to_string(), json!(self.name));
        payload.insert("qualified_name".to_string(), json!(self.qualified_name));
        payload.insert("signature".to_string(), json!(self.signature));
        payload.insert("start_line".to_string(), json!(self.start_line));
        payload.insert("end_line".to_string(), json!(self.end_line));
        payload.insert("line_count".to_string(), json!(self.line_count));
        payload.insert("has_docstring".to_string(), json!(self.has_docstring));
        payload.insert("content_hash".to_string(), json!(self.content_hash));
        payload.insert("mtime".to_string(), json!(self.mtime));
        payload
    }

    /// Rebuild a unit from a stored payload
    pub fn from_payload(id: &str, payload: &Map<String, Value>) -> Result<Self> {
        let get_str = |key: &str| -> Result<String> {
            payload
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| EngineError::Storage(format!("missing unit field '{}'", key)))
        };
        let get_u64 = |key: &str| -> u64 {
            payload.get(key).and_then(Value::as_u64).unwrap_or_default()
        };

        Ok(Self {
            id: id.to_string(),
            project: get_str("project")?,
            file_path: get_str("file_path")?,
            language: Language::parse_str(&get_str("language")?)
                .ok_or_else(|| EngineError::Storage(format!("corrupt language on unit {}", id)))?,
            unit_type: UnitType::parse_str(&get_str("unit_type")?)
                .ok_or_else(|| EngineError::Storage(format!("corrupt unit_type on unit {}", id)))?,
            name: get_str("name")?,
            qualified_name: get_str("qualified_name")?,
            signature: get_str("signature")?,
            start_line: get_u64("start_line") as usize,
            end_line: get_u64("end_line") as usize,
            line_count: get_u64("line_count") as usize,
            has_docstring: payload
                .get("has_docstring")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            content_hash: get_str("content_hash")?,
            mtime: payload.get("mtime").and_then(Value::as_i64).unwrap_or(0),
        })
    }
}

/// Result of one indexing run
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct IndexReport {
    /// Recognized files visited
    pub files_scanned: usize,
    /// Files whose units were (re)written
    pub files_indexed: usize,
    /// Files skipped because their content hash was unchanged
    pub files_skipped: usize,
    /// Rows removed because the file disappeared
    pub files_removed: usize,
    /// Units written in this run
    pub units_indexed: usize,
    /// Prior units deleted in this run
    pub units_deleted: usize,
    /// Per-language unit counts for this run
    pub by_language: BTreeMap<String, usize>,
    /// Accumulated unit-level parse errors; never abort a file
    pub errors: Vec<String>,
}

/// The code indexer
pub struct CodeIndexer {
    store: Arc<dyn VectorStore>,
    metadata: Arc<MetadataStore>,
    registry: EmbeddingRegistry,
    batch_size: usize,
    cancel: Arc<AtomicBool>,
}

impl CodeIndexer {
    /// Create an indexer
    pub fn new(
        store: Arc<dyn VectorStore>,
        metadata: Arc<MetadataStore>,
        registry: EmbeddingRegistry,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            metadata,
            registry,
            batch_size: batch_size.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancellation flag; long runs check it between files
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Lazily create the collection at the code embedder's dimension; a
    /// dimension change recreates it
    pub fn ensure_collection(&self) -> Result<()> {
        self.store
            .ensure_collection(CODE_UNITS_COLLECTION, self.registry.code().dimension())?;
        Ok(())
    }

    /// Index a directory into the given project
    pub fn index_directory(
        &self,
        directory: &Path,
        project: &str,
        recursive: bool,
    ) -> Result<IndexReport> {
        if !directory.is_dir() {
            return Err(EngineError::Validation(format!(
                "'{}' is not a directory",
                directory.display()
            )));
        }
        if project.trim().is_empty() {
            return Err(EngineError::Validation("project cannot be empty".to_string()));
        }

        self.ensure_collection()?;
        self.metadata
            .upsert_project(project, &directory.display().to_string())?;

        let mut report = IndexReport::default();
        let mut seen_files: Vec<String> = Vec::new();

        let max_depth = if recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(directory)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_excluded(entry.path()));

        for entry in walker {
            if self.cancel.load(Ordering::Relaxed) {
                tracing::info!(project, "indexing cancelled");
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report.errors.push(format!("walk error: {}", e));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(language) = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(Language::from_extension)
            else {
                continue;
            };

            let relative = entry
                .path()
                .strip_prefix(directory)
                .unwrap_or(entry.path())
                .display()
                .to_string();
            report.files_scanned += 1;
            seen_files.push(relative.clone());

            match self.index_file(entry.path(), &relative, project, language, &mut report) {
                Ok(indexed) => {
                    if indexed {
                        report.files_indexed += 1;
                    } else {
                        report.files_skipped += 1;
                    }
                }
                Err(e) => {
                    // File-level failure leaves the prior row untouched;
                    // a re-run redoes the file
                    report.errors.push(format!("{}: {}", relative, e));
                }
            }
        }

        // Files that disappeared since the last full walk lose their units
        if recursive && !self.cancel.load(Ordering::Relaxed) {
            for record in self.metadata.list_indexed_files(project)? {
                if !seen_files.contains(&record.file_path) {
                    report.units_deleted +=
                        self.delete_file_units(project, &record.file_path)?;
                    self.metadata
                        .delete_indexed_file(project, &record.file_path)?;
                    report.files_removed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Index one file; returns false when skipped as unchanged
    fn index_file(
        &self,
        absolute: &Path,
        relative: &str,
        project: &str,
        language: Language,
        report: &mut IndexReport,
    ) -> Result<bool> {
        let bytes = std::fs::read(absolute)
            .map_err(|e| EngineError::Storage(format!("read failed: {}", e)))?;
        let content_hash = hex_sha256(&bytes);
        let mtime = file_mtime(absolute);

        let previous = self.metadata.get_indexed_file(project, relative)?;
        if let Some(previous) = &previous {
            if previous.content_hash == content_hash {
                return Ok(false);
            }
        }

        let source = String::from_utf8_lossy(&bytes);
        let (raw_units, parse_errors) = extract_units(language, &source);
        for error in parse_errors {
            report.errors.push(format!("{}: {}", relative, error));
        }

        let lines: Vec<&str> = source.lines().collect();
        let units: Vec<CodeUnit> = raw_units
            .into_iter()
            .map(|raw| CodeUnit {
                id: Uuid::new_v4().to_string(),
                project: project.to_string(),
                file_path: relative.to_string(),
                language,
                line_count: raw.end_line.saturating_sub(raw.start_line) + 1,
                unit_type: raw.unit_type,
                name: raw.name,
                qualified_name: raw.qualified_name,
                signature: raw.signature,
                start_line: raw.start_line,
                end_line: raw.end_line,
                has_docstring: raw.has_docstring,
                content_hash: content_hash.clone(),
                mtime,
            })
            .collect();

        // Replace the prior unit set before upserting the new one; the
        // row update below only happens after every upsert succeeded
        if previous.is_some() {
            report.units_deleted += self.delete_file_units(project, relative)?;
        }

        let texts: Vec<String> = units
            .iter()
            .map(|unit| embedding_text(unit, &lines))
            .collect();

        for (unit_chunk, text_chunk) in units
            .chunks(self.batch_size)
            .zip(texts.chunks(self.batch_size))
        {
            let refs: Vec<&str> = text_chunk.iter().map(String::as_str).collect();
            let vectors = self.registry.code().embed_batch(&refs)?;
            let points: Vec<Point> = unit_chunk
                .iter()
                .zip(vectors)
                .map(|(unit, vector)| Point::new(unit.id.clone(), vector, unit.to_payload()))
                .collect();
            self.store.upsert_batch(CODE_UNITS_COLLECTION, points)?;
        }

        report.units_indexed += units.len();
        *report
            .by_language
            .entry(language.as_str().to_string())
            .or_insert(0) += units.len();

        self.metadata.upsert_indexed_file(&IndexedFileRecord {
            project: project.to_string(),
            file_path: relative.to_string(),
            content_hash,
            mtime,
            unit_count: units.len(),
            indexed_at: Utc::now(),
        })?;

        Ok(true)
    }

    /// Paginate-delete every unit of `(project, file_path)`; loops until the
    /// match set is empty
    fn delete_file_units(&self, project: &str, file_path: &str) -> Result<usize> {
        let filter = Filter::new()
            .eq("project", project)
            .eq("file_path", file_path);
        Ok(self.store.delete_by_filter(CODE_UNITS_COLLECTION, &filter)?)
    }
}

/// Text handed to the embedder for one unit: qualified name, signature and
/// the unit's source slice
fn embedding_text(unit: &CodeUnit, lines: &[&str]) -> String {
    let start = unit.start_line.saturating_sub(1);
    let end = unit.end_line.min(lines.len());
    let body = if start < end {
        lines[start..end].join("\n")
    } else {
        String::new()
    };
    format!("{}\n{}\n{}", unit.qualified_name, unit.signature, body)
}

fn is_excluded(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn file_mtime(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| {
            mtime
                .duration_since(std::time::UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs() as i64)
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryVectorStore;

    fn harness() -> (tempfile::TempDir, CodeIndexer, Arc<dyn VectorStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
        let metadata =
            Arc::new(MetadataStore::open(&dir.path().join("metadata.db")).unwrap());
        let indexer = CodeIndexer::new(
            store.clone(),
            metadata,
            EmbeddingRegistry::deterministic(),
            100,
        );
        (dir, indexer, store)
    }

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn indexes_and_skips_unchanged_files() {
        let (dir, indexer, store) = harness();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        write(&src, "lib.rs", "pub fn alpha() -> u8 {\n    1\n}\n\npub fn beta() -> u8 {\n    2\n}\n");
        write(&src, "util.py", "def gamma():\n    return 3\n");

        let report = indexer.index_directory(&src, "demo", true).unwrap();
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.units_indexed, 3);
        assert!(report.errors.is_empty());
        assert_eq!(store.count(CODE_UNITS_COLLECTION, None).unwrap(), 3);

        // Unchanged re-run: no vector writes
        let report = indexer.index_directory(&src, "demo", true).unwrap();
        assert_eq!(report.units_indexed, 0);
        assert_eq!(report.files_indexed, 0);
        assert_eq!(report.files_skipped, 2);
    }

    #[test]
    fn touch_without_content_change_still_skips() {
        let (dir, indexer, _store) = harness();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let file = src.join("lib.rs");
        std::fs::write(&file, "pub fn alpha() {}\n").unwrap();

        indexer.index_directory(&src, "demo", true).unwrap();

        // Rewrite identical bytes (fresh mtime)
        std::fs::write(&file, "pub fn alpha() {}\n").unwrap();
        let report = indexer.index_directory(&src, "demo", true).unwrap();
        assert_eq!(report.units_indexed, 0);
        assert_eq!(report.files_skipped, 1);
    }

    #[test]
    fn modified_file_replaces_prior_units() {
        let (dir, indexer, store) = harness();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let file = src.join("lib.rs");
        std::fs::write(&file, "pub fn alpha() -> u8 {\n    1\n}\n").unwrap();

        indexer.index_directory(&src, "demo", true).unwrap();
        let before = store
            .scroll(CODE_UNITS_COLLECTION, 10, 0, None, false)
            .unwrap();
        let old_id = before[0].id.clone();

        std::fs::write(&file, "pub fn alpha() -> u8 {\n    42\n}\n").unwrap();
        let report = indexer.index_directory(&src, "demo", true).unwrap();
        assert!(report.units_indexed >= 1);
        assert_eq!(report.units_deleted, 1);

        let after = store
            .scroll(CODE_UNITS_COLLECTION, 10, 0, None, false)
            .unwrap();
        assert!(after.iter().all(|p| p.id != old_id));
    }

    #[test]
    fn disappeared_file_loses_its_units() {
        let (dir, indexer, store) = harness();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        write(&src, "a.rs", "pub fn alpha() {}\n");
        write(&src, "b.rs", "pub fn beta() {}\n");

        indexer.index_directory(&src, "demo", true).unwrap();
        std::fs::remove_file(src.join("b.rs")).unwrap();

        let report = indexer.index_directory(&src, "demo", true).unwrap();
        assert_eq!(report.files_removed, 1);
        assert_eq!(store.count(CODE_UNITS_COLLECTION, None).unwrap(), 1);
    }

    #[test]
    fn excluded_directories_are_not_walked() {
        let (dir, indexer, store) = harness();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("node_modules/pkg")).unwrap();
        write(&src.join("node_modules/pkg"), "index.js", "function hidden() {}\n");
        write(&src, "main.js", "function visible() {}\n");

        let report = indexer.index_directory(&src, "demo", true).unwrap();
        assert_eq!(report.files_scanned, 1);
        assert_eq!(store.count(CODE_UNITS_COLLECTION, None).unwrap(), 1);
    }

    #[test]
    fn non_recursive_stays_at_the_top_level() {
        let (dir, indexer, _store) = harness();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        write(&src, "top.rs", "pub fn top() {}\n");
        write(&src.join("nested"), "deep.rs", "pub fn deep() {}\n");

        let report = indexer.index_directory(&src, "demo", false).unwrap();
        assert_eq!(report.files_scanned, 1);
    }

    #[test]
    fn missing_directory_is_a_validation_error() {
        let (dir, indexer, _store) = harness();
        let err = indexer
            .index_directory(&dir.path().join("absent"), "demo", true)
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn unit_payload_round_trip() {
        let unit = CodeUnit {
            id: "u1".to_string(),
            project: "demo".to_string(),
            file_path: "src/lib.rs".to_string(),
            language: Language::Rust,
            unit_type: UnitType::Function,
            name: "alpha".to_string(),
            qualified_name: "alpha".to_string(),
            signature: "pub fn alpha() -> u8".to_string(),
            start_line: 1,
            end_line: 3,
            line_count: 3,
            has_docstring: true,
            content_hash: "abc".to_string(),
            mtime: 1_700_000_000,
        };
        let restored = CodeUnit::from_payload("u1", &unit.to_payload()).unwrap();
        assert_eq!(restored.qualified_name, unit.qualified_name);
        assert_eq!(restored.language, unit.language);
        assert_eq!(restored.unit_type, unit.unit_type);
        assert_eq!(restored.line_count, 3);
        assert!(restored.has_docstring);
    }
}
