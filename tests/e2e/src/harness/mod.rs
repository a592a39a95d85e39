//! Test Harness
//!
//! Builds a full engine on a temporary state root with in-memory vector
//! storage and the deterministic embedder, then drives the real tool
//! dispatch path. Each harness is isolated; the temp directory is
//! deleted when it drops.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;

use engram_mcp::engine::{test_engine, Engine};
use engram_mcp::server::McpServer;
use engram_mcp::tools::ToolError;

/// A full engine plus tool server over a temp state root
pub struct TestHarness {
    /// The assembled engine
    pub engine: Arc<Engine>,
    server: McpServer,
    temp_dir: TempDir,
}

impl TestHarness {
    /// Harness with no git repository (git tools degrade gracefully)
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Harness pointed at a real git repository
    pub fn with_repo(repo_path: PathBuf) -> Self {
        Self::build(Some(repo_path))
    }

    fn build(repo_path: Option<PathBuf>) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let engine = Arc::new(
            test_engine(temp_dir.path().join("state"), repo_path)
                .expect("failed to build test engine"),
        );
        let server = McpServer::new(engine.clone(), "test-session");
        Self {
            engine,
            server,
            temp_dir,
        }
    }

    /// Call a tool through the real dispatch path
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        self.server.dispatch(name, Some(arguments)).await
    }

    /// Call a tool and expect success
    pub async fn call_ok(&self, name: &str, arguments: Value) -> Value {
        match self.call(name, arguments).await {
            Ok(value) => value,
            Err(error) => panic!("tool {} failed: {} ({})", name, error.message, error.kind),
        }
    }

    /// Call a tool and expect a specific error kind
    pub async fn call_err(&self, name: &str, arguments: Value) -> ToolError {
        match self.call(name, arguments).await {
            Ok(value) => panic!("tool {} unexpectedly succeeded: {}", name, value),
            Err(error) => error,
        }
    }

    /// Scratch space inside the harness temp dir
    pub fn scratch_dir(&self, name: &str) -> PathBuf {
        let dir = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&dir).expect("failed to create scratch dir");
        dir
    }

    /// The harness session id used for GHAP state
    pub fn session_id(&self) -> &str {
        "test-session"
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize a git repository with the given `(file, contents, message)`
/// commits, in order
pub fn seed_repo(dir: &Path, commits: &[(&str, &str, &str)]) {
    let repo = git2::Repository::init(dir).expect("git init failed");
    {
        let mut config = repo.config().expect("git config failed");
        config.set_str("user.name", "E2E Author").unwrap();
        config.set_str("user.email", "e2e@example.com").unwrap();
    }

    for (file, contents, message) in commits {
        std::fs::write(dir.join(file), contents).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(file)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = repo.signature().unwrap();
        let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
    }
}
