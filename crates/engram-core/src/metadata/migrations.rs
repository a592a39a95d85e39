//! Database Migrations
//!
//! Forward-only schema migrations for the metadata store. No rollback:
//! the system is re-indexable, so recovery from a bad schema is recreate.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: projects, indexed files, git state, GHAP, values, journal",
        up: MIGRATION_V1_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    name TEXT PRIMARY KEY,
    root_path TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- One row per (project, file); content_hash reflects the exact bytes whose
-- units are present in the vector store
CREATE TABLE IF NOT EXISTS indexed_files (
    project TEXT NOT NULL,
    file_path TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    mtime INTEGER NOT NULL,
    unit_count INTEGER NOT NULL DEFAULT 0,
    indexed_at TEXT NOT NULL,
    PRIMARY KEY (project, file_path)
);

CREATE INDEX IF NOT EXISTS idx_indexed_files_project ON indexed_files(project);

-- One row per repository
CREATE TABLE IF NOT EXISTS git_index_state (
    repo_path TEXT PRIMARY KEY,
    last_commit_sha TEXT NOT NULL,
    indexed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ghap_entries (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    resolved_at TEXT,
    domain TEXT NOT NULL,
    strategy TEXT NOT NULL,
    goal TEXT NOT NULL,
    hypothesis TEXT NOT NULL,
    action TEXT NOT NULL,
    prediction TEXT NOT NULL,
    iteration_count INTEGER NOT NULL DEFAULT 1,
    outcome TEXT,
    surprise TEXT,
    root_cause TEXT,
    lesson TEXT,
    confidence_tier TEXT
);

CREATE INDEX IF NOT EXISTS idx_ghap_session ON ghap_entries(session_id);
CREATE INDEX IF NOT EXISTS idx_ghap_domain ON ghap_entries(domain);
CREATE INDEX IF NOT EXISTS idx_ghap_outcome ON ghap_entries(outcome);

CREATE TABLE IF NOT EXISTS value_records (
    id TEXT PRIMARY KEY,
    axis TEXT NOT NULL,
    cluster_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    similarity_to_centroid REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_values_axis ON value_records(axis);

-- Journal bookkeeping; the journal lines themselves are JSONL files under
-- the sessions directory
CREATE TABLE IF NOT EXISTS session_journal (
    session_id TEXT PRIMARY KEY,
    event_count INTEGER NOT NULL DEFAULT 0,
    last_event_at TEXT NOT NULL
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let applied_again = apply_migrations(&conn).unwrap();
        assert_eq!(applied_again, 0);
        assert_eq!(get_current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn versions_are_strictly_increasing() {
        let mut last = 0;
        for migration in MIGRATIONS {
            assert!(migration.version > last);
            last = migration.version;
        }
    }
}
