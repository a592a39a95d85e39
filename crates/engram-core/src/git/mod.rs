//! Git Indexer and Analyzer
//!
//! Reads commit history through libgit2: embeds commit messages into the
//! `commits` collection for semantic search, and answers file-history,
//! churn-hotspot and author queries directly from the walk. The commit
//! payload stores the timestamp as epoch seconds so range filters apply.
//!
//! A missing repository is not an error: every query degrades to an empty
//! result and the surface reports `git_not_configured`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use git2::{Commit, Repository, Sort};
use serde_json::{json, Map, Value};

use crate::embeddings::EmbeddingRegistry;
use crate::error::{EngineError, Result};
use crate::metadata::MetadataStore;
use crate::store::{Point, VectorStore};

/// Collection holding commit-message embeddings (semantic dimension)
pub const COMMITS_COLLECTION: &str = "commits";

/// Cap on commits walked per indexing run
const MAX_COMMITS_PER_RUN: usize = 5_000;

/// An indexed commit; immutable after indexing
#[derive(Debug, Clone, serde::Serialize)]
pub struct CommitInfo {
    /// Full SHA
    pub sha: String,
    /// Commit message
    pub message: String,
    /// Author name
    pub author: String,
    /// Author email
    pub author_email: String,
    /// Author time
    pub timestamp: DateTime<Utc>,
    /// Files touched
    pub files_changed: usize,
    /// Lines added
    pub insertions: usize,
    /// Lines removed
    pub deletions: usize,
}

impl CommitInfo {
    /// Payload stored next to the embedding. `timestamp` is epoch seconds
    /// (numeric) to keep range filters applicable.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("sha".to_string(), json!(self.sha));
        payload.insert("message".to_string(), json!(self.message));
        payload.insert("author".to_string(), json!(self.author));
        payload.insert("author_email".to_string(), json!(self.author_email));
        payload.insert("timestamp".to_string(), json!(self.timestamp.timestamp()));
        payload.insert("files_changed".to_string(), json!(self.files_changed));
        payload.insert("insertions".to_string(), json!(self.insertions));
        payload.insert("deletions".to_string(), json!(self.deletions));
        payload
    }

    /// Rebuild from a stored payload
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self> {
        let get_str = |key: &str| -> Result<String> {
            payload
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| EngineError::Storage(format!("missing commit field '{}'", key)))
        };
        let get_usize =
            |key: &str| -> usize { payload.get(key).and_then(Value::as_u64).unwrap_or(0) as usize };

        let epoch = payload
            .get("timestamp")
            .and_then(Value::as_i64)
            .ok_or_else(|| EngineError::Storage("missing commit timestamp".to_string()))?;

        Ok(Self {
            sha: get_str("sha")?,
            message: get_str("message")?,
            author: get_str("author")?,
            author_email: get_str("author_email")?,
            timestamp: DateTime::from_timestamp(epoch, 0)
                .ok_or_else(|| EngineError::Storage("commit timestamp out of range".to_string()))?,
            files_changed: get_usize("files_changed"),
            insertions: get_usize("insertions"),
            deletions: get_usize("deletions"),
        })
    }
}

/// One row of the churn report. The field names are part of the contract.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChurnHotspot {
    /// Path relative to the repository root
    pub file_path: String,
    /// Commits touching the file in the window
    pub change_count: usize,
    /// Lines added across those commits
    pub total_insertions: usize,
    /// Lines removed across those commits
    pub total_deletions: usize,
    /// Distinct authors, sorted
    pub authors: Vec<String>,
    /// Most recent touch
    pub last_changed: DateTime<Utc>,
}

/// Per-author statistics for a path
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthorStats {
    /// Author name
    pub author: String,
    /// Author email
    pub author_email: String,
    /// Commits touching the path
    pub commit_count: usize,
    /// Lines added
    pub insertions: usize,
    /// Lines removed
    pub deletions: usize,
}

/// Result of one indexing run
#[derive(Debug, Clone, serde::Serialize)]
pub struct GitIndexReport {
    /// Commits embedded in this run
    pub commits_indexed: usize,
    /// Newest indexed SHA after the run
    pub last_commit_sha: String,
}

/// Git history reader and indexer
pub struct GitAnalyzer {
    store: Arc<dyn VectorStore>,
    metadata: Arc<MetadataStore>,
    registry: EmbeddingRegistry,
    repo_path: Option<PathBuf>,
}

impl GitAnalyzer {
    /// Create an analyzer. `repo_path = None` auto-detects the repository
    /// from the working directory on each call.
    pub fn new(
        store: Arc<dyn VectorStore>,
        metadata: Arc<MetadataStore>,
        registry: EmbeddingRegistry,
        repo_path: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            metadata,
            registry,
            repo_path,
        }
    }

    /// Open the configured or discovered repository; `None` when there is
    /// no repository at all
    fn open_repo(&self) -> Option<Repository> {
        let result = match &self.repo_path {
            Some(path) => Repository::discover(path),
            None => match std::env::current_dir() {
                Ok(cwd) => Repository::discover(cwd),
                Err(_) => return None,
            },
        };
        match result {
            Ok(repo) if !repo.is_empty().unwrap_or(true) => Some(repo),
            Ok(_) => {
                tracing::debug!("repository has no commits yet");
                None
            }
            Err(e) => {
                tracing::debug!("no git repository available: {}", e.message());
                None
            }
        }
    }

    /// Whether a repository is reachable
    pub fn repo_available(&self) -> bool {
        self.open_repo().is_some()
    }

    /// Lazily create the commits collection
    pub fn ensure_collection(&self) -> Result<()> {
        self.store
            .ensure_collection(COMMITS_COLLECTION, self.registry.semantic().dimension())?;
        Ok(())
    }

    /// Embed commits newer than the recorded index state.
    /// Returns `None` when no repository is configured or discoverable.
    pub fn index_commits(&self, since: Option<DateTime<Utc>>) -> Result<Option<GitIndexReport>> {
        let Some(repo) = self.open_repo() else {
            return Ok(None);
        };
        self.ensure_collection()?;

        let repo_key = repo_key(&repo);
        let last_sha = self
            .metadata
            .get_git_state(&repo_key)?
            .map(|state| state.last_commit_sha);

        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(Sort::TIME)?;

        let mut commits = Vec::new();
        let mut newest_sha: Option<String> = None;
        for oid in revwalk.take(MAX_COMMITS_PER_RUN) {
            let oid = oid?;
            let sha = oid.to_string();
            if Some(&sha) == last_sha.as_ref() {
                break;
            }
            let commit = repo.find_commit(oid)?;
            let info = commit_info(&repo, &commit)?;
            if let Some(since) = since {
                if info.timestamp < since {
                    break;
                }
            }
            if newest_sha.is_none() {
                newest_sha = Some(sha);
            }
            commits.push(info);
        }

        if commits.is_empty() {
            let last = last_sha.unwrap_or_default();
            return Ok(Some(GitIndexReport {
                commits_indexed: 0,
                last_commit_sha: last,
            }));
        }

        // Re-index is idempotent on sha: points upsert by sha
        let texts: Vec<String> = commits
            .iter()
            .map(|c| {
                if c.message.trim().is_empty() {
                    c.sha.clone()
                } else {
                    c.message.clone()
                }
            })
            .collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = self.registry.semantic().embed_batch(&refs)?;

        let points: Vec<Point> = commits
            .iter()
            .zip(vectors)
            .map(|(commit, vector)| Point::new(commit.sha.clone(), vector, commit.to_payload()))
            .collect();
        self.store.upsert_batch(COMMITS_COLLECTION, points)?;

        let newest = newest_sha.unwrap_or_default();
        self.metadata.set_git_state(&repo_key, &newest)?;

        Ok(Some(GitIndexReport {
            commits_indexed: commits.len(),
            last_commit_sha: newest,
        }))
    }

    /// Commits touching `path`, newest first. No embedding involved.
    pub fn file_history(&self, path: &str, limit: usize) -> Result<Vec<CommitInfo>> {
        let Some(repo) = self.open_repo() else {
            return Ok(vec![]);
        };

        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(Sort::TIME)?;

        let mut history = Vec::new();
        for oid in revwalk {
            if history.len() >= limit {
                break;
            }
            let commit = repo.find_commit(oid?)?;
            if commit_touches_path(&repo, &commit, path)? {
                history.push(commit_info(&repo, &commit)?);
            }
        }
        Ok(history)
    }

    /// Aggregate file churn over the last `days`, sorted by change count
    pub fn churn_hotspots(&self, days: u32, limit: usize) -> Result<Vec<ChurnHotspot>> {
        let Some(repo) = self.open_repo() else {
            return Ok(vec![]);
        };
        let cutoff = Utc::now() - Duration::days(i64::from(days));

        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(Sort::TIME)?;

        struct Acc {
            change_count: usize,
            total_insertions: usize,
            total_deletions: usize,
            authors: Vec<String>,
            last_changed: DateTime<Utc>,
        }
        let mut by_file: BTreeMap<String, Acc> = BTreeMap::new();

        for oid in revwalk {
            let commit = repo.find_commit(oid?)?;
            let when = commit_time(&commit);
            if when < cutoff {
                break;
            }
            let author = commit.author().name().unwrap_or("unknown").to_string();

            for (file_path, insertions, deletions) in commit_file_stats(&repo, &commit)? {
                let acc = by_file.entry(file_path).or_insert_with(|| Acc {
                    change_count: 0,
                    total_insertions: 0,
                    total_deletions: 0,
                    authors: Vec::new(),
                    last_changed: when,
                });
                acc.change_count += 1;
                acc.total_insertions += insertions;
                acc.total_deletions += deletions;
                if !acc.authors.contains(&author) {
                    acc.authors.push(author.clone());
                }
                if when > acc.last_changed {
                    acc.last_changed = when;
                }
            }
        }

        let mut hotspots: Vec<ChurnHotspot> = by_file
            .into_iter()
            .map(|(file_path, mut acc)| {
                acc.authors.sort();
                ChurnHotspot {
                    file_path,
                    change_count: acc.change_count,
                    total_insertions: acc.total_insertions,
                    total_deletions: acc.total_deletions,
                    authors: acc.authors,
                    last_changed: acc.last_changed,
                }
            })
            .collect();
        hotspots.sort_by(|a, b| {
            b.change_count
                .cmp(&a.change_count)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        hotspots.truncate(limit);
        Ok(hotspots)
    }

    /// Per-author commit counts and line deltas for a path
    pub fn code_authors(&self, path: &str) -> Result<Vec<AuthorStats>> {
        let Some(repo) = self.open_repo() else {
            return Ok(vec![]);
        };

        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(Sort::TIME)?;

        let mut by_author: BTreeMap<String, AuthorStats> = BTreeMap::new();
        for oid in revwalk {
            let commit = repo.find_commit(oid?)?;
            for (file_path, insertions, deletions) in commit_file_stats(&repo, &commit)? {
                if file_path != path {
                    continue;
                }
                let author = commit.author();
                let name = author.name().unwrap_or("unknown").to_string();
                let email = author.email().unwrap_or("").to_string();
                let stats = by_author.entry(name.clone()).or_insert_with(|| AuthorStats {
                    author: name,
                    author_email: email,
                    commit_count: 0,
                    insertions: 0,
                    deletions: 0,
                });
                stats.commit_count += 1;
                stats.insertions += insertions;
                stats.deletions += deletions;
            }
        }

        let mut authors: Vec<AuthorStats> = by_author.into_values().collect();
        authors.sort_by(|a, b| b.commit_count.cmp(&a.commit_count));
        Ok(authors)
    }
}

fn repo_key(repo: &Repository) -> String {
    repo.workdir()
        .unwrap_or_else(|| repo.path())
        .display()
        .to_string()
}

fn commit_time(commit: &Commit<'_>) -> DateTime<Utc> {
    DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_else(Utc::now)
}

fn commit_info(repo: &Repository, commit: &Commit<'_>) -> Result<CommitInfo> {
    let (files_changed, insertions, deletions) = diff_totals(repo, commit)?;
    let author = commit.author();
    Ok(CommitInfo {
        sha: commit.id().to_string(),
        message: commit.message().unwrap_or("").trim().to_string(),
        author: author.name().unwrap_or("unknown").to_string(),
        author_email: author.email().unwrap_or("").to_string(),
        timestamp: commit_time(commit),
        files_changed,
        insertions,
        deletions,
    })
}

fn diff_of<'repo>(repo: &'repo Repository, commit: &Commit<'_>) -> Result<git2::Diff<'repo>> {
    let tree = commit.tree()?;
    let parent_tree = match commit.parent(0) {
        Ok(parent) => Some(parent.tree()?),
        Err(_) => None,
    };
    Ok(repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?)
}

fn diff_totals(repo: &Repository, commit: &Commit<'_>) -> Result<(usize, usize, usize)> {
    let diff = diff_of(repo, commit)?;
    let stats = diff.stats()?;
    Ok((stats.files_changed(), stats.insertions(), stats.deletions()))
}

fn commit_touches_path(repo: &Repository, commit: &Commit<'_>, path: &str) -> Result<bool> {
    let diff = diff_of(repo, commit)?;
    Ok(diff.deltas().any(|delta| {
        delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .is_some_and(|p| p == Path::new(path))
    }))
}

/// Per-file `(path, insertions, deletions)` for one commit
fn commit_file_stats(
    repo: &Repository,
    commit: &Commit<'_>,
) -> Result<Vec<(String, usize, usize)>> {
    let diff = diff_of(repo, commit)?;

    let mut files: Vec<(String, usize, usize)> = diff
        .deltas()
        .filter_map(|delta| {
            delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|path| (path.display().to_string(), 0, 0))
        })
        .collect();

    diff.foreach(
        &mut |_, _| true,
        None,
        None,
        Some(&mut |delta, _, line| {
            let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) else {
                return true;
            };
            let path = path.display().to_string();
            if let Some(entry) = files.iter_mut().find(|(p, _, _)| *p == path) {
                match line.origin() {
                    '+' => entry.1 += 1,
                    '-' => entry.2 += 1,
                    _ => {}
                }
            }
            true
        }),
    )?;

    Ok(files)
}
