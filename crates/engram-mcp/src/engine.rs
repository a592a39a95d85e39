//! Engine Assembly
//!
//! One struct owning every subsystem, shared as `Arc<Engine>` across
//! sessions and transports. All subsystem methods take `&self`, so no
//! outer lock is needed.
//!
//! The embedding registry is created here but models load on first embed;
//! construct the engine only inside the daemon's final process (the heavy
//! numeric runtime must not be initialized before a fork).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use engram_core::{
    CodeIndexer, ContextAssembler, EmbeddingRegistry, GhapEngine, GitAnalyzer, Memories,
    MetadataStore, Searcher, SessionJournal, Settings, SqliteVectorStore, VectorStore,
};

/// The assembled engine
pub struct Engine {
    /// Engine settings
    pub settings: Settings,
    /// Relational metadata
    pub metadata: Arc<MetadataStore>,
    /// Vector collections
    pub store: Arc<dyn VectorStore>,
    /// The two-model embedding registry
    pub registry: EmbeddingRegistry,
    /// Memory operations
    pub memories: Memories,
    /// Code indexing
    pub indexer: CodeIndexer,
    /// Git history
    pub git: GitAnalyzer,
    /// GHAP lifecycle
    pub ghap: GhapEngine,
    /// Unified search
    pub searcher: Searcher,
    /// Context assembly
    pub assembler: ContextAssembler<Searcher>,
    /// Session journal
    pub journal: Arc<SessionJournal>,
    started_at: Instant,
}

impl Engine {
    /// Open the engine against the settings' state root with persistent
    /// storage and the local embedding models
    pub fn open(settings: Settings) -> anyhow::Result<Self> {
        settings.ensure_dirs()?;
        let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::open_with_timeout(
            &settings.vectors_db_path,
            settings.request_timeout(),
        )?);
        let metadata = Arc::new(MetadataStore::open_with_timeout(
            &settings.metadata_db_path,
            settings.request_timeout(),
        )?);
        let registry = EmbeddingRegistry::local();
        Ok(Self::assemble(settings, store, metadata, registry))
    }

    /// Assemble over caller-provided storage and embedders (test harness)
    pub fn with_components(
        settings: Settings,
        store: Arc<dyn VectorStore>,
        metadata: Arc<MetadataStore>,
        registry: EmbeddingRegistry,
    ) -> Self {
        Self::assemble(settings, store, metadata, registry)
    }

    fn assemble(
        settings: Settings,
        store: Arc<dyn VectorStore>,
        metadata: Arc<MetadataStore>,
        registry: EmbeddingRegistry,
    ) -> Self {
        let journal = Arc::new(SessionJournal::new(settings.sessions_dir.clone()));
        let memories = Memories::new(store.clone(), registry.clone());
        let indexer = CodeIndexer::new(
            store.clone(),
            metadata.clone(),
            registry.clone(),
            settings.embed_batch_size,
        );
        let git = GitAnalyzer::new(
            store.clone(),
            metadata.clone(),
            registry.clone(),
            settings.repo_path.clone(),
        );
        let ghap = GhapEngine::new(
            metadata.clone(),
            store.clone(),
            registry.clone(),
            journal.clone(),
        );
        let searcher = Searcher::new(store.clone(), registry.clone());
        let assembler = ContextAssembler::new(Searcher::new(store.clone(), registry.clone()));

        Self {
            settings,
            metadata,
            store,
            registry,
            memories,
            indexer,
            git,
            ghap,
            searcher,
            assembler,
            journal,
            started_at: Instant::now(),
        }
    }

    /// Seconds since the engine came up
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Test-friendly engine over a temp state root, in-memory vectors and the
/// deterministic embedder. The git repo path is pinned to the state root
/// (normally not a repository) so repo discovery never escapes the sandbox;
/// pass `repo_path` to point at a real repository.
pub fn test_engine(state_root: PathBuf, repo_path: Option<PathBuf>) -> anyhow::Result<Engine> {
    use engram_core::MemoryVectorStore;

    let mut settings = Settings::with_state_root(state_root);
    settings.repo_path = Some(repo_path.unwrap_or_else(|| settings.state_root.clone()));
    settings.ensure_dirs()?;
    let metadata = Arc::new(MetadataStore::open(&settings.metadata_db_path)?);
    Ok(Engine::with_components(
        settings,
        Arc::new(MemoryVectorStore::new()),
        metadata,
        EmbeddingRegistry::deterministic(),
    ))
}
