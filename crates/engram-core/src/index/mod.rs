//! Code Indexer
//!
//! Walks a directory, extracts semantic units from recognized source
//! files, embeds them with the code embedder and upserts them into the
//! `code_units` collection. Change detection is content-hash based: a file
//! whose bytes are unchanged is never re-embedded.

mod indexer;
mod units;

pub use indexer::{CodeIndexer, CodeUnit, IndexReport, CODE_UNITS_COLLECTION, EXCLUDED_DIRS};
pub use units::{extract_units, RawUnit};
