//! Server Core
//!
//! Routes JSON-RPC requests to tool handlers. One server instance per
//! session; the engine is shared behind an `Arc`. Tool descriptions and
//! the dispatch table are generated from the same module functions, so a
//! tool cannot be listed without being callable (or vice versa).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
use crate::tools;
use crate::tools::ToolResult;

/// Tool server for one session
pub struct McpServer {
    engine: Arc<Engine>,
    session_id: String,
    initialized: bool,
}

impl McpServer {
    /// Create a server bound to a session identifier
    pub fn new(engine: Arc<Engine>, session_id: impl Into<String>) -> Self {
        Self {
            engine,
            session_id: session_id.into(),
            initialized: false,
        }
    }

    /// Handle an incoming JSON-RPC request; `None` for notifications
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(params) => serde_json::from_value(params)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Use the client's version when it is older; newer clients get ours
        let negotiated = if request.protocol_version.as_str() < PROTOCOL_VERSION {
            request.protocol_version
        } else {
            PROTOCOL_VERSION.to_string()
        };

        self.initialized = true;

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "engram".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
            },
            instructions: Some(
                "Engram is the agent's persistent memory: store facts and preferences with \
                 store_memory, index code and git history, and run GHAP learning episodes \
                 (start_ghap → update_ghap → resolve_ghap). Use assemble_context at prompt \
                 time to pull the most relevant memories, experiences and values under a \
                 token budget."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        let tools = tool_descriptions();
        serde_json::to_value(ListToolsResult { tools })
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(params) => serde_json::from_value(params)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing params")),
        };

        let result = self.dispatch(&request.name, request.arguments).await;

        let body = match result {
            Ok(payload) => CallToolResult::success(&payload),
            Err(error) => {
                if error.kind == "internal_error" {
                    tracing::error!(tool = %request.name, "tool failed: {}", error.message);
                } else {
                    tracing::warn!(tool = %request.name, kind = %error.kind, "{}", error.message);
                }
                CallToolResult::failure(&error.to_json())
            }
        };

        serde_json::to_value(body).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    /// Dispatch one tool call. Indexing and embedding work is blocking, so
    /// heavy tools run on the blocking pool.
    pub async fn dispatch(&self, name: &str, arguments: Option<Value>) -> ToolResult {
        let engine = self.engine.clone();
        let session = self.session_id.clone();
        let name = name.to_string();

        let handle = tokio::task::spawn_blocking(move || {
            dispatch_blocking(&engine, &session, &name, arguments)
        });
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(tools::ToolError {
                kind: "internal_error".to_string(),
                message: format!("tool task failed: {}", e),
                hint: None,
                data: None,
            }),
        }
    }

    /// The session this server is bound to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

fn dispatch_blocking(
    engine: &Engine,
    session: &str,
    name: &str,
    arguments: Option<Value>,
) -> ToolResult {
    match name {
        // Memory
        "store_memory" => tools::memory::execute_store(engine, arguments),
        "retrieve_memories" => tools::memory::execute_retrieve(engine, arguments),
        "list_memories" => tools::memory::execute_list(engine, arguments),
        "delete_memory" => tools::memory::execute_delete(engine, arguments),
        // Code
        "index_codebase" => tools::code::execute_index(engine, arguments),
        "search_code" => tools::code::execute_search(engine, arguments),
        "find_similar_code" => tools::code::execute_similar(engine, arguments),
        // Git
        "index_commits" => tools::git::execute_index(engine, arguments),
        "search_commits" => tools::git::execute_search(engine, arguments),
        "get_file_history" => tools::git::execute_history(engine, arguments),
        "get_churn_hotspots" => tools::git::execute_churn(engine, arguments),
        "get_code_authors" => tools::git::execute_authors(engine, arguments),
        // GHAP
        "start_ghap" => tools::ghap::execute_start(engine, session, arguments),
        "update_ghap" => tools::ghap::execute_update(engine, session, arguments),
        "resolve_ghap" => tools::ghap::execute_resolve(engine, session, arguments),
        "get_active_ghap" => tools::ghap::execute_active(engine, session, arguments),
        "list_ghap_entries" => tools::ghap::execute_list(engine, arguments),
        // Learning
        "get_clusters" => tools::learning::execute_clusters(engine, arguments),
        "get_cluster_members" => tools::learning::execute_members(engine, arguments),
        "validate_value" => tools::learning::execute_validate(engine, arguments),
        "store_value" => tools::learning::execute_store(engine, arguments),
        "list_values" => tools::learning::execute_list(engine, arguments),
        // Search / context
        "search_experiences" => tools::search::execute_experiences(engine, arguments),
        "search_all" => tools::search::execute_all(engine, arguments),
        "assemble_context" => tools::context::execute(engine, arguments),
        other => Err(tools::ToolError {
            kind: "not_found".to_string(),
            message: format!("unknown tool '{}'", other),
            hint: Some("call tools/list for the available tools".to_string()),
            data: None,
        }),
    }
}

/// The advertised tool table
pub fn tool_descriptions() -> Vec<ToolDescription> {
    fn tool(name: &str, description: &str, schema: Value) -> ToolDescription {
        ToolDescription {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: schema,
        }
    }

    vec![
        // ================================================================
        // MEMORY
        // ================================================================
        tool(
            "store_memory",
            "Store a memory (fact, preference, event, workflow or context). Returns a minimal {ok, id}.",
            tools::memory::store_schema(),
        ),
        tool(
            "retrieve_memories",
            "Semantic search over stored memories.",
            tools::memory::retrieve_schema(),
        ),
        tool(
            "list_memories",
            "List memories newest-first with optional category/tag filters.",
            tools::memory::list_schema(),
        ),
        tool(
            "delete_memory",
            "Delete a memory by id.",
            tools::memory::delete_schema(),
        ),
        // ================================================================
        // CODE
        // ================================================================
        tool(
            "index_codebase",
            "Index a directory into semantic code units. Unchanged files (by content hash) are skipped.",
            tools::code::index_schema(),
        ),
        tool(
            "search_code",
            "Semantic search over indexed code units.",
            tools::code::search_schema(),
        ),
        tool(
            "find_similar_code",
            "Find indexed units similar to a code snippet.",
            tools::code::similar_schema(),
        ),
        // ================================================================
        // GIT
        // ================================================================
        tool(
            "index_commits",
            "Embed commit messages newer than the last indexed commit.",
            tools::git::index_schema(),
        ),
        tool(
            "search_commits",
            "Semantic search over indexed commit messages.",
            tools::git::search_schema(),
        ),
        tool(
            "get_file_history",
            "Commits touching a file, newest first.",
            tools::git::history_schema(),
        ),
        tool(
            "get_churn_hotspots",
            "Most-changed files in a time window.",
            tools::git::churn_schema(),
        ),
        tool(
            "get_code_authors",
            "Per-author commit counts and line deltas for a file.",
            tools::git::authors_schema(),
        ),
        // ================================================================
        // GHAP
        // ================================================================
        tool(
            "start_ghap",
            "Start a Goal-Hypothesis-Action-Prediction episode. One active episode per session.",
            tools::ghap::start_schema(),
        ),
        tool(
            "update_ghap",
            "Revise the active episode; increments iteration_count.",
            tools::ghap::update_schema(),
        ),
        tool(
            "resolve_ghap",
            "Resolve the active episode (confirmed | falsified | abandoned). Falsified requires surprise and root_cause.",
            tools::ghap::resolve_schema(),
        ),
        tool(
            "get_active_ghap",
            "The session's active episode, if any.",
            tools::ghap::active_schema(),
        ),
        tool(
            "list_ghap_entries",
            "List resolved episodes with session/domain/outcome filters.",
            tools::ghap::list_schema(),
        ),
        // ================================================================
        // LEARNING
        // ================================================================
        tool(
            "get_clusters",
            "Density-cluster one experience axis and return membership.",
            tools::learning::clusters_schema(),
        ),
        tool(
            "get_cluster_members",
            "Member texts of one cluster.",
            tools::learning::members_schema(),
        ),
        tool(
            "validate_value",
            "Check a candidate value against its source cluster centroid.",
            tools::learning::validate_schema(),
        ),
        tool(
            "store_value",
            "Store a candidate value after centroid validation.",
            tools::learning::store_schema(),
        ),
        tool(
            "list_values",
            "List stored values.",
            tools::learning::list_schema(),
        ),
        // ================================================================
        // SEARCH / CONTEXT
        // ================================================================
        tool(
            "search_experiences",
            "Semantic search over resolved episodes on one axis.",
            tools::search::experiences_schema(),
        ),
        tool(
            "search_all",
            "One query across memories, code, experiences, values and commits.",
            tools::search::all_schema(),
        ),
        tool(
            "assemble_context",
            "Token-budgeted markdown context block from the enabled sources.",
            tools::context::schema(),
        ),
    ]
}
