//! Metadata Store
//!
//! Durable relational state: indexed-file fingerprints, project registry,
//! git index state, GHAP rows, distilled values, and session-journal
//! bookkeeping. Forward-only migrations; all timestamps are RFC-3339
//! strings and numeric-epoch reads are rejected at the boundary.

mod migrations;
mod sqlite;

pub use migrations::{apply_migrations, Migration, MIGRATIONS};
pub use sqlite::{
    GhapFilter, GhapRecord, GitIndexState, IndexedFileRecord, MetadataError, MetadataStore,
    ProjectRecord, Result, ValueRecord,
};
