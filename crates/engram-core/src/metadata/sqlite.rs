//! SQLite Metadata Store
//!
//! Reader/writer connection pair behind Mutexes; all methods take `&self`
//! so the engine can hold `Arc<MetadataStore>`. Timestamps are stored as
//! RFC-3339 TEXT and strictly parsed on read — a numeric epoch in a
//! timestamp column is corruption, not a format to accommodate.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::migrations::apply_migrations;
use crate::enums::{Axis, ConfidenceTier, Domain, Outcome, Strategy};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Metadata store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Stored timestamp is not RFC-3339
    #[error("invalid timestamp '{0}': expected RFC-3339")]
    InvalidTimestamp(String),
    /// Stored enum literal is not in its closed set
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// Initialization error
    #[error("initialization error: {0}")]
    Init(String),
}

/// Metadata store result type
pub type Result<T> = std::result::Result<T, MetadataError>;

// ============================================================================
// RECORD TYPES
// ============================================================================

/// A registered project
#[derive(Debug, Clone)]
pub struct ProjectRecord {
    /// Project identifier
    pub name: String,
    /// Absolute root directory
    pub root_path: String,
    /// First registration time
    pub created_at: DateTime<Utc>,
}

/// Fingerprint of an indexed file
#[derive(Debug, Clone)]
pub struct IndexedFileRecord {
    /// Owning project
    pub project: String,
    /// Path relative to the project root
    pub file_path: String,
    /// Hex SHA-256 of the file bytes whose units are in the vector store
    pub content_hash: String,
    /// File modification time, epoch seconds
    pub mtime: i64,
    /// Number of units extracted from this file
    pub unit_count: usize,
    /// When the file was last indexed
    pub indexed_at: DateTime<Utc>,
}

/// Per-repository git indexing state
#[derive(Debug, Clone)]
pub struct GitIndexState {
    /// Repository root
    pub repo_path: String,
    /// Newest indexed commit
    pub last_commit_sha: String,
    /// When indexing last ran
    pub indexed_at: DateTime<Utc>,
}

/// A persisted GHAP row
#[derive(Debug, Clone)]
pub struct GhapRecord {
    /// Entry id
    pub id: String,
    /// Owning session
    pub session_id: String,
    /// Creation time; immutable
    pub created_at: DateTime<Utc>,
    /// Resolution time
    pub resolved_at: Option<DateTime<Utc>>,
    /// Problem domain
    pub domain: Domain,
    /// Approach taken
    pub strategy: Strategy,
    /// What the episode tried to achieve
    pub goal: String,
    /// The belief under test
    pub hypothesis: String,
    /// What was done
    pub action: String,
    /// The expected observation
    pub prediction: String,
    /// Number of updates + 1
    pub iteration_count: u32,
    /// Resolution outcome
    pub outcome: Option<Outcome>,
    /// What was unexpected; required iff falsified
    pub surprise: Option<String>,
    /// Why the prediction failed; required iff falsified
    pub root_cause: Option<String>,
    /// Takeaway
    pub lesson: Option<String>,
    /// Derived from outcome
    pub confidence_tier: Option<ConfidenceTier>,
}

/// Listing filter for GHAP rows
#[derive(Debug, Clone, Default)]
pub struct GhapFilter {
    /// Restrict to one session
    pub session_id: Option<String>,
    /// Restrict to one domain
    pub domain: Option<Domain>,
    /// Restrict to one outcome
    pub outcome: Option<Outcome>,
    /// Page size (0 = unbounded)
    pub limit: usize,
    /// Page offset
    pub offset: usize,
}

/// A stored, centroid-validated value
#[derive(Debug, Clone)]
pub struct ValueRecord {
    /// Value id
    pub id: String,
    /// Source axis
    pub axis: Axis,
    /// Source cluster id
    pub cluster_id: i64,
    /// The distilled text
    pub text: String,
    /// Cosine similarity of the value embedding to the cluster centroid
    pub similarity_to_centroid: f64,
    /// Storage time
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// STORE
// ============================================================================

/// SQLite-backed metadata store
pub struct MetadataStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl MetadataStore {
    /// Open (or create) the store at `path` and apply pending migrations
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, Duration::from_secs_f64(5.0))
    }

    /// Open with an explicit busy timeout (fractional seconds preserved)
    pub fn open_with_timeout(path: &Path, timeout: Duration) -> Result<Self> {
        let writer = Connection::open(path)?;
        Self::configure_connection(&writer, timeout)?;
        apply_migrations(&writer)?;

        let reader = Connection::open(path)?;
        Self::configure_connection(&reader, timeout)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    fn configure_connection(conn: &Connection, timeout: Duration) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA temp_store = MEMORY;",
        )?;
        conn.busy_timeout(timeout)?;
        Ok(())
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| MetadataError::Init("writer lock poisoned".to_string()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| MetadataError::Init("reader lock poisoned".to_string()))
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    /// Register (or re-register) a project root
    pub fn upsert_project(&self, name: &str, root_path: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO projects (name, root_path, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET root_path = excluded.root_path",
            params![name, root_path, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Look up a project
    pub fn get_project(&self, name: &str) -> Result<Option<ProjectRecord>> {
        let reader = self.reader()?;
        reader
            .query_row(
                "SELECT name, root_path, created_at FROM projects WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
            .map(|(name, root_path, created_at)| {
                Ok(ProjectRecord {
                    name,
                    root_path,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .transpose()
    }

    // ------------------------------------------------------------------
    // Indexed files
    // ------------------------------------------------------------------

    /// Fingerprint of a previously indexed file
    pub fn get_indexed_file(
        &self,
        project: &str,
        file_path: &str,
    ) -> Result<Option<IndexedFileRecord>> {
        let reader = self.reader()?;
        reader
            .query_row(
                "SELECT content_hash, mtime, unit_count, indexed_at FROM indexed_files
                 WHERE project = ?1 AND file_path = ?2",
                params![project, file_path],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?
            .map(|(content_hash, mtime, unit_count, indexed_at)| {
                Ok(IndexedFileRecord {
                    project: project.to_string(),
                    file_path: file_path.to_string(),
                    content_hash,
                    mtime,
                    unit_count: unit_count as usize,
                    indexed_at: parse_timestamp(&indexed_at)?,
                })
            })
            .transpose()
    }

    /// Insert-or-replace an indexed-file row
    pub fn upsert_indexed_file(&self, record: &IndexedFileRecord) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT OR REPLACE INTO indexed_files
             (project, file_path, content_hash, mtime, unit_count, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.project,
                record.file_path,
                record.content_hash,
                record.mtime,
                record.unit_count as i64,
                record.indexed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Drop an indexed-file row (the file disappeared)
    pub fn delete_indexed_file(&self, project: &str, file_path: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "DELETE FROM indexed_files WHERE project = ?1 AND file_path = ?2",
            params![project, file_path],
        )?;
        Ok(())
    }

    /// All indexed files of a project
    pub fn list_indexed_files(&self, project: &str) -> Result<Vec<IndexedFileRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT file_path, content_hash, mtime, unit_count, indexed_at
             FROM indexed_files WHERE project = ?1 ORDER BY file_path",
        )?;
        let rows = stmt.query_map(params![project], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (file_path, content_hash, mtime, unit_count, indexed_at) = row?;
            records.push(IndexedFileRecord {
                project: project.to_string(),
                file_path,
                content_hash,
                mtime,
                unit_count: unit_count as usize,
                indexed_at: parse_timestamp(&indexed_at)?,
            });
        }
        Ok(records)
    }

    // ------------------------------------------------------------------
    // Git index state
    // ------------------------------------------------------------------

    /// Indexing state for a repository
    pub fn get_git_state(&self, repo_path: &str) -> Result<Option<GitIndexState>> {
        let reader = self.reader()?;
        reader
            .query_row(
                "SELECT last_commit_sha, indexed_at FROM git_index_state WHERE repo_path = ?1",
                params![repo_path],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?
            .map(|(last_commit_sha, indexed_at)| {
                Ok(GitIndexState {
                    repo_path: repo_path.to_string(),
                    last_commit_sha,
                    indexed_at: parse_timestamp(&indexed_at)?,
                })
            })
            .transpose()
    }

    /// Record the newest indexed commit for a repository
    pub fn set_git_state(&self, repo_path: &str, last_commit_sha: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT OR REPLACE INTO git_index_state (repo_path, last_commit_sha, indexed_at)
             VALUES (?1, ?2, ?3)",
            params![repo_path, last_commit_sha, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // GHAP entries
    // ------------------------------------------------------------------

    /// Persist a resolved GHAP row (insert-or-replace on id)
    pub fn insert_ghap(&self, record: &GhapRecord) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT OR REPLACE INTO ghap_entries
             (id, session_id, created_at, resolved_at, domain, strategy,
              goal, hypothesis, action, prediction, iteration_count,
              outcome, surprise, root_cause, lesson, confidence_tier)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                record.id,
                record.session_id,
                record.created_at.to_rfc3339(),
                record.resolved_at.map(|t| t.to_rfc3339()),
                record.domain.as_str(),
                record.strategy.as_str(),
                record.goal,
                record.hypothesis,
                record.action,
                record.prediction,
                record.iteration_count,
                record.outcome.map(|o| o.as_str()),
                record.surprise,
                record.root_cause,
                record.lesson,
                record.confidence_tier.map(|t| t.as_str()),
            ],
        )?;
        Ok(())
    }

    /// Look up a GHAP row by id
    pub fn get_ghap(&self, id: &str) -> Result<Option<GhapRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {} FROM ghap_entries WHERE id = ?1",
            GHAP_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id], ghap_row_tuple)?;
        match rows.next() {
            Some(row) => Ok(Some(ghap_from_tuple(row?)?)),
            None => Ok(None),
        }
    }

    /// List GHAP rows, newest first
    pub fn list_ghap(&self, filter: &GhapFilter) -> Result<Vec<GhapRecord>> {
        let mut sql = format!("SELECT {} FROM ghap_entries WHERE 1=1", GHAP_COLUMNS);
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(session_id) = &filter.session_id {
            sql.push_str(" AND session_id = ?");
            args.push(Box::new(session_id.clone()));
        }
        if let Some(domain) = filter.domain {
            sql.push_str(" AND domain = ?");
            args.push(Box::new(domain.as_str().to_string()));
        }
        if let Some(outcome) = filter.outcome {
            sql.push_str(" AND outcome = ?");
            args.push(Box::new(outcome.as_str().to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC");
        if filter.limit > 0 {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", filter.limit, filter.offset));
        }

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt.query_map(params.as_slice(), ghap_row_tuple)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(ghap_from_tuple(row?)?);
        }
        Ok(records)
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Persist a validated value
    pub fn insert_value(&self, record: &ValueRecord) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT OR REPLACE INTO value_records
             (id, axis, cluster_id, text, similarity_to_centroid, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.axis.as_str(),
                record.cluster_id,
                record.text,
                record.similarity_to_centroid,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// List values, newest first
    pub fn list_values(
        &self,
        axis: Option<Axis>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ValueRecord>> {
        let mut sql = String::from(
            "SELECT id, axis, cluster_id, text, similarity_to_centroid, created_at
             FROM value_records WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(axis) = axis {
            sql.push_str(" AND axis = ?");
            args.push(Box::new(axis.as_str().to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC");
        if limit > 0 {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        }

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::types::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, axis, cluster_id, text, similarity_to_centroid, created_at) = row?;
            records.push(ValueRecord {
                id,
                axis: parse_enum::<Axis>(&axis)?,
                cluster_id,
                text,
                similarity_to_centroid,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(records)
    }

    // ------------------------------------------------------------------
    // Session journal bookkeeping
    // ------------------------------------------------------------------

    /// Bump the journal counters for a session
    pub fn journal_touch(&self, session_id: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO session_journal (session_id, event_count, last_event_at)
             VALUES (?1, 1, ?2)
             ON CONFLICT(session_id) DO UPDATE SET
                 event_count = event_count + 1,
                 last_event_at = excluded.last_event_at",
            params![session_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const GHAP_COLUMNS: &str = "id, session_id, created_at, resolved_at, domain, strategy, \
     goal, hypothesis, action, prediction, iteration_count, \
     outcome, surprise, root_cause, lesson, confidence_tier";

#[allow(clippy::type_complexity)]
fn ghap_row_tuple(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<(
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
        row.get(15)?,
    ))
}

#[allow(clippy::type_complexity)]
fn ghap_from_tuple(
    t: (
        String,
        String,
        String,
        Option<String>,
        String,
        String,
        String,
        String,
        String,
        String,
        i64,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
    ),
) -> Result<GhapRecord> {
    Ok(GhapRecord {
        id: t.0,
        session_id: t.1,
        created_at: parse_timestamp(&t.2)?,
        resolved_at: t.3.as_deref().map(parse_timestamp).transpose()?,
        domain: parse_enum::<Domain>(&t.4)?,
        strategy: parse_enum::<Strategy>(&t.5)?,
        goal: t.6,
        hypothesis: t.7,
        action: t.8,
        prediction: t.9,
        iteration_count: t.10 as u32,
        outcome: t.11.as_deref().map(parse_enum::<Outcome>).transpose()?,
        surprise: t.12,
        root_cause: t.13,
        lesson: t.14,
        confidence_tier: t
            .15
            .as_deref()
            .map(parse_enum::<ConfidenceTier>)
            .transpose()?,
    })
}

fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> Result<T> {
    s.parse().map_err(MetadataError::Corrupt)
}

/// Parse an RFC-3339 timestamp, rejecting numeric epochs
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(MetadataError::InvalidTimestamp(s.to_string()));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| MetadataError::InvalidTimestamp(s.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================
