//! Settings
//!
//! Single typed settings object; every other site reads from it.
//! Values come from `ENGRAM_*` environment variables with platform-directory
//! defaults. On daemon start a shell-sourced view of the same settings is
//! written into the state root so hooks never hard-code paths or ports.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;

/// Default HTTP bind host
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 3950;

/// Default outbound request timeout in seconds. Fractional on purpose:
/// sub-second timeouts must survive to the transport untruncated.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 7.5;

/// Default embedding batch size for the indexers
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 100;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory for all persisted state
    pub state_root: PathBuf,
    /// SQLite file for relational metadata
    pub metadata_db_path: PathBuf,
    /// SQLite file for vector collections
    pub vectors_db_path: PathBuf,
    /// Directory for append-only session journals (`*.jsonl`)
    pub sessions_dir: PathBuf,
    /// HTTP bind host
    pub http_host: String,
    /// HTTP bind port
    pub http_port: u16,
    /// Outbound request timeout, fractional seconds
    pub request_timeout_secs: f64,
    /// Embedding batch size used by the code and git indexers
    pub embed_batch_size: usize,
    /// Git repository override; `None` means auto-detect from the working
    /// directory
    pub repo_path: Option<PathBuf>,
}

impl Settings {
    /// Build settings rooted at an explicit state directory
    pub fn with_state_root(state_root: PathBuf) -> Self {
        let metadata_db_path = state_root.join("metadata.db");
        let vectors_db_path = state_root.join("vectors.db");
        let sessions_dir = state_root.join("sessions");
        Self {
            state_root,
            metadata_db_path,
            vectors_db_path,
            sessions_dir,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            repo_path: None,
        }
    }

    /// Build settings from the environment.
    ///
    /// `ENGRAM_STATE_ROOT` overrides the platform data directory;
    /// `ENGRAM_HTTP_HOST` / `ENGRAM_HTTP_PORT` override the bind address;
    /// `ENGRAM_REQUEST_TIMEOUT` is parsed as fractional seconds;
    /// `ENGRAM_REPO_PATH` pins the git repository.
    pub fn from_env() -> std::io::Result<Self> {
        let state_root = match std::env::var("ENGRAM_STATE_ROOT") {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => default_state_root()?,
        };

        let mut settings = Self::with_state_root(state_root);

        if let Ok(host) = std::env::var("ENGRAM_HTTP_HOST") {
            if !host.is_empty() {
                settings.http_host = host;
            }
        }
        if let Ok(port) = std::env::var("ENGRAM_HTTP_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                settings.http_port = port;
            }
        }
        if let Ok(timeout) = std::env::var("ENGRAM_REQUEST_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<f64>() {
                if secs > 0.0 {
                    settings.request_timeout_secs = secs;
                }
            }
        }
        if let Ok(batch) = std::env::var("ENGRAM_EMBED_BATCH_SIZE") {
            if let Ok(batch) = batch.parse::<usize>() {
                if batch > 0 {
                    settings.embed_batch_size = batch;
                }
            }
        }
        if let Ok(repo) = std::env::var("ENGRAM_REPO_PATH") {
            if !repo.is_empty() {
                settings.repo_path = Some(PathBuf::from(repo));
            }
        }

        Ok(settings)
    }

    /// Request timeout as a [`Duration`]. Built with `from_secs_f64` so a
    /// timeout like `0.5` reaches the transport as 500ms, never `0`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }

    /// Create the state root and sessions directory if absent
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.state_root)?;
        std::fs::create_dir_all(&self.sessions_dir)?;
        Ok(())
    }

    /// Write a shell-sourced view of these settings into the state root.
    /// Hooks `source` this file instead of hard-coding paths or ports.
    pub fn write_shell_snapshot(&self) -> std::io::Result<PathBuf> {
        let path = self.state_root.join("env.sh");
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "# generated by engram on daemon start; do not edit")?;
        writeln!(file, "export ENGRAM_STATE_ROOT=\"{}\"", self.state_root.display())?;
        writeln!(file, "export ENGRAM_HTTP_HOST=\"{}\"", self.http_host)?;
        writeln!(file, "export ENGRAM_HTTP_PORT=\"{}\"", self.http_port)?;
        writeln!(
            file,
            "export ENGRAM_REQUEST_TIMEOUT=\"{}\"",
            self.request_timeout_secs
        )?;
        if let Some(repo) = &self.repo_path {
            writeln!(file, "export ENGRAM_REPO_PATH=\"{}\"", repo.display())?;
        }
        Ok(path)
    }
}

/// Platform default: `~/.local/share/engram` on Linux,
/// `~/Library/Application Support/engram` on macOS.
fn default_state_root() -> std::io::Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "engram", "engram") {
        return Ok(proj_dirs.data_dir().to_path_buf());
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "could not determine a platform data directory",
    ))
}

/// Resolve the model cache directory for embedding downloads.
/// `ENGRAM_MODEL_CACHE` wins; otherwise the platform cache directory.
pub fn model_cache_dir() -> PathBuf {
    if let Ok(path) = std::env::var("ENGRAM_MODEL_CACHE") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Some(proj_dirs) = ProjectDirs::from("dev", "engram", "engram") {
        return proj_dirs.cache_dir().join("models");
    }
    Path::new(".engram_model_cache").to_path_buf()
}
