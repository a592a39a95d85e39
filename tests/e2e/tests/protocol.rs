//! JSON-RPC surface: initialize gating, tools/list, tools/call envelopes.

use std::sync::Arc;

use engram_e2e_tests::harness::TestHarness;
use engram_mcp::engine::test_engine;
use engram_mcp::protocol::types::{JsonRpcRequest, JSONRPC_VERSION};
use engram_mcp::server::{tool_descriptions, McpServer};
use serde_json::{json, Value};
use tempfile::TempDir;

fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: Some(json!(id)),
        method: method.to_string(),
        params: Some(params),
    }
}

async fn initialized_server() -> (TempDir, McpServer) {
    let temp = TempDir::new().unwrap();
    let engine = Arc::new(test_engine(temp.path().join("state"), None).unwrap());
    let mut server = McpServer::new(engine, "protocol-test");
    let response = server
        .handle_request(request(1, "initialize", json!({})))
        .await
        .unwrap();
    assert!(response.error.is_none());
    (temp, server)
}

#[tokio::test]
async fn requests_before_initialize_are_rejected() {
    let temp = TempDir::new().unwrap();
    let engine = Arc::new(test_engine(temp.path().join("state"), None).unwrap());
    let mut server = McpServer::new(engine, "protocol-test");

    let response = server
        .handle_request(request(1, "tools/list", json!({})))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32003);
}

#[tokio::test]
async fn tools_list_advertises_all_25_tools() {
    let (_temp, mut server) = initialized_server().await;

    let response = server
        .handle_request(request(2, "tools/list", json!({})))
        .await
        .unwrap();
    let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
    assert_eq!(tools, 25);
    assert_eq!(tool_descriptions().len(), 25);
}

#[tokio::test]
async fn tools_call_wraps_success_and_errors() {
    let (_temp, mut server) = initialized_server().await;

    let ok = server
        .handle_request(request(
            3,
            "tools/call",
            json!({
                "name": "store_memory",
                "arguments": { "content": "hello", "category": "fact" },
            }),
        ))
        .await
        .unwrap();
    let result = ok.result.unwrap();
    assert_eq!(result["isError"], json!(false));
    let body: Value =
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(body["ok"], json!(true));

    let err = server
        .handle_request(request(
            4,
            "tools/call",
            json!({
                "name": "store_memory",
                "arguments": { "content": "hello", "category": "gossip" },
            }),
        ))
        .await
        .unwrap();
    let result = err.result.unwrap();
    assert_eq!(result["isError"], json!(true));
    let body: Value =
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(body["error"]["kind"], json!("validation_error"));
}

#[tokio::test]
async fn unknown_method_and_tool_are_distinct_failures() {
    let (_temp, mut server) = initialized_server().await;

    let response = server
        .handle_request(request(5, "resources/list", json!({})))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32601);

    let response = server
        .handle_request(request(
            6,
            "tools/call",
            json!({ "name": "no_such_tool", "arguments": {} }),
        ))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["isError"], json!(true));
    let body: Value =
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(body["error"]["kind"], json!("not_found"));
}

#[tokio::test]
async fn schema_enums_match_the_domain_tables() {
    for tool in tool_descriptions() {
        let Some(properties) = tool.input_schema["properties"].as_object() else {
            continue;
        };
        for (name, prop) in properties {
            let Some(listed) = prop["enum"].as_array() else {
                continue;
            };
            let listed: Vec<&str> = listed.iter().filter_map(Value::as_str).collect();
            let expected: Option<Vec<&'static str>> = match name.as_str() {
                "category" => Some(engram_core::MemoryCategory::names()),
                "domain" => Some(engram_core::Domain::names()),
                "strategy" => Some(engram_core::Strategy::names()),
                "outcome" => Some(engram_core::Outcome::names()),
                "axis" => Some(engram_core::Axis::names()),
                "language" => Some(engram_core::Language::names()),
                _ => None,
            };
            if let Some(expected) = expected {
                assert_eq!(listed, expected, "enum drift on {}.{}", tool.name, name);
            }
        }
    }
}

#[tokio::test]
async fn harness_surface_matches_dispatch() {
    // Every advertised tool is callable (anything but a not_found on name)
    let harness = TestHarness::new();
    for tool in tool_descriptions() {
        let result = harness.call(&tool.name, json!({})).await;
        if let Err(error) = result {
            assert_ne!(
                (error.kind.as_str(), error.message.contains("unknown tool")),
                ("not_found", true),
                "tool {} is advertised but not dispatchable",
                tool.name
            );
        }
    }
}
