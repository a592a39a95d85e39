//! Engram MCP Server
//!
//! Persistent memory and learning for code-assistant agents:
//!
//! - Semantic memories with categories, importance and tags
//! - Code indexing into semantic units with content-hash change detection
//! - Git history indexing and analysis
//! - GHAP learning episodes (Goal-Hypothesis-Action-Prediction) with
//!   experience clustering and distilled values
//! - Token-budgeted context assembly for prompt injection
//!
//! Transports: stdio JSON-RPC (default) or HTTP (`--http`).

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engram_core::Settings;
use engram_mcp::engine::Engine;
use engram_mcp::protocol::stdio::StdioTransport;
use engram_mcp::server::McpServer;

#[derive(Debug, Parser)]
#[command(name = "engram-mcp", version, about = "Persistent memory and learning MCP server")]
struct Args {
    /// Custom state root (defaults to the platform data directory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Serve HTTP instead of stdio
    #[arg(long)]
    http: bool,

    /// HTTP bind host
    #[arg(long)]
    host: Option<String>,

    /// HTTP bind port
    #[arg(long)]
    port: Option<u16>,

    /// Git repository to analyze (defaults to auto-detection)
    #[arg(long)]
    repo: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr: stdout belongs to the stdio transport
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut settings = match &args.data_dir {
        Some(dir) => Settings::with_state_root(dir.clone()),
        None => Settings::from_env()?,
    };
    if let Some(host) = args.host {
        settings.http_host = host;
    }
    if let Some(port) = args.port {
        settings.http_port = port;
    }
    if let Some(repo) = args.repo {
        settings.repo_path = Some(repo);
    }

    // The runtime exists before the engine: embedding models initialize a
    // numeric runtime that must never cross a later fork, so everything
    // heavy happens inside this (spawned, final) process.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        settings.ensure_dirs()?;
        let snapshot = settings.write_shell_snapshot()?;
        info!("settings snapshot written to {}", snapshot.display());

        let engine = Arc::new(Engine::open(settings.clone())?);

        if args.http {
            #[cfg(feature = "http")]
            {
                use engram_mcp::protocol::http::{HttpTransport, HttpTransportConfig};
                let transport = HttpTransport::new(HttpTransportConfig {
                    host: settings.http_host.clone(),
                    port: settings.http_port,
                });
                transport.run(engine).await?;
            }
            #[cfg(not(feature = "http"))]
            anyhow::bail!("this build has no http feature");
        } else {
            info!("engram-mcp v{} serving stdio", env!("CARGO_PKG_VERSION"));
            let server = McpServer::new(engine, "stdio");
            StdioTransport::new().run(server).await?;
        }

        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}
