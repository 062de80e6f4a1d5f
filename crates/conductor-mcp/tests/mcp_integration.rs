#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for conductor-mcp against mock JSON-RPC tool servers.
//!
//! Covers: StaticServerDirectory, RegistryAggregator, ToolDispatcher, HttpToolClient,
//! StdioToolClient.

use conductor_core::{ExecutionTracer, ToolCallRequest, TraceLevel};
use conductor_mcp::{RegistryAggregator, StaticServerDirectory, ToolDispatcher, ToolServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn tool_server(tools: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({"method": "tools/list"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"tools": tools}
        })))
        .mount(&server)
        .await;
    server
}

fn server_config(id: &str, url: &str) -> ToolServerConfig {
    serde_json::from_value(serde_json::json!({"id": id, "url": url})).unwrap()
}

fn aggregator(configs: &[ToolServerConfig]) -> RegistryAggregator {
    let directory = StaticServerDirectory::from_configs(configs, Duration::from_secs(2)).unwrap();
    RegistryAggregator::new(Arc::new(directory), Duration::from_secs(2))
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_aggregates_live_servers_and_skips_dead_one() {
    let docs = tool_server(serde_json::json!([
        {"name": "search_docs", "description": "Full-text search", "inputSchema": {"type": "object", "properties": {"q": {"type": "string"}}}}
    ]))
    .await;
    let excel = tool_server(serde_json::json!([
        {"name": "read_range", "description": "Read cells"}
    ]))
    .await;

    let configs = vec![
        server_config("docserver", &docs.uri()),
        server_config("dead", "http://127.0.0.1:1/rpc"),
        server_config("excel", &excel.uri()),
    ];

    let mut tracer = ExecutionTracer::new();
    let registry = aggregator(&configs)
        .build("alice", &mut tracer, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        registry.wire_names(),
        vec!["docserver__search_docs", "excel__read_range"]
    );
    let schema = registry.get("docserver__search_docs").unwrap().to_schema();
    assert_eq!(schema.name, "docserver__search_docs");
    assert_eq!(schema.input_schema["properties"]["q"]["type"], "string");

    let warns: Vec<_> = tracer
        .entries()
        .iter()
        .filter(|e| e.level == TraceLevel::Warn)
        .collect();
    assert_eq!(warns.len(), 1);
    assert!(warns[0].message.contains("'dead'"));
}

#[tokio::test]
async fn test_malformed_tools_list_is_skipped() {
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"tools": "not-a-list"}
        })))
        .mount(&broken)
        .await;

    let mut tracer = ExecutionTracer::new();
    let registry = aggregator(&[server_config("broken", &broken.uri())])
        .build("alice", &mut tracer, &CancellationToken::new())
        .await
        .unwrap();
    assert!(registry.is_empty());
    assert!(tracer
        .entries()
        .iter()
        .any(|e| e.level == TraceLevel::Warn && e.message.contains("'broken'")));
}

#[tokio::test]
async fn test_session_bound_server_is_listed_after_handshake() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({"method": "initialize"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", "c0ffee")
                .set_body_json(serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "protocolVersion": "2024-11-05",
                        "serverInfo": {"name": "excel-mcp", "version": "2.1.0"}
                    }
                })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("mcp-session-id", "c0ffee"))
        .and(body_partial_json(
            serde_json::json!({"method": "notifications/initialized"}),
        ))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("mcp-session-id", "c0ffee"))
        .and(body_partial_json(serde_json::json!({"method": "tools/list"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {"tools": [{"name": "read_range"}, {"name": "write_range"}]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: No valid session ID"))
        .with_priority(10)
        .mount(&server)
        .await;

    let config: ToolServerConfig = serde_json::from_value(serde_json::json!({
        "id": "excel",
        "url": server.uri(),
        "handshake": true
    }))
    .unwrap();

    let mut tracer = ExecutionTracer::new();
    let registry = aggregator(&[config])
        .build("alice", &mut tracer, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        registry.wire_names(),
        vec!["excel__read_range", "excel__write_range"]
    );
    assert!(!tracer
        .entries()
        .iter()
        .any(|e| e.level == TraceLevel::Warn));
}

#[cfg(unix)]
#[tokio::test]
async fn test_stdio_server_alongside_http_server() {
    const FILES_SERVER: &str = r##"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/^{"jsonrpc":"2.0","id":\([0-9]*\),.*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05"}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"stat_file"}]}}\n' "$id" ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"4096 bytes"}]}}\n' "$id" ;;
  esac
done
"##;

    let docs = tool_server(serde_json::json!([{"name": "search_docs"}])).await;
    let files: ToolServerConfig = serde_json::from_value(serde_json::json!({
        "id": "files",
        "command": "sh",
        "args": ["-c", FILES_SERVER],
        "handshake": true
    }))
    .unwrap();

    let mut tracer = ExecutionTracer::new();
    let cancel = CancellationToken::new();
    let registry = aggregator(&[server_config("docs", &docs.uri()), files])
        .build("alice", &mut tracer, &cancel)
        .await
        .unwrap();
    assert_eq!(
        registry.wire_names(),
        vec!["docs__search_docs", "files__stat_file"]
    );

    let requests = vec![ToolCallRequest {
        id: "toolu_9".into(),
        name: "files__stat_file".into(),
        input: serde_json::json!({"path": "/etc/hosts"}),
    }];
    let outcomes = ToolDispatcher::new(Duration::from_secs(2))
        .dispatch_all(&requests, &registry, &cancel)
        .await;
    assert!(!outcomes[0].result.is_error);
    assert_eq!(outcomes[0].result.content, "4096 bytes");
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dispatch_round_with_one_failing_server() {
    let docs = tool_server(serde_json::json!([{"name": "search_docs"}])).await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "method": "tools/call",
            "params": {"name": "search_docs"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {"content": [{"type": "text", "text": "3 documents found"}]}
        })))
        .mount(&docs)
        .await;

    let sheets = tool_server(serde_json::json!([{"name": "read_range"}])).await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({"method": "tools/call"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32603, "message": "workbook locked"}
        })))
        .mount(&sheets)
        .await;

    let mut tracer = ExecutionTracer::new();
    let cancel = CancellationToken::new();
    let registry = aggregator(&[
        server_config("docs", &docs.uri()),
        server_config("sheets", &sheets.uri()),
    ])
    .build("alice", &mut tracer, &cancel)
    .await
    .unwrap();
    assert_eq!(registry.len(), 2);

    let requests = vec![
        ToolCallRequest {
            id: "toolu_1".into(),
            name: "sheets__read_range".into(),
            input: serde_json::json!({"range": "A1:C3"}),
        },
        ToolCallRequest {
            id: "toolu_2".into(),
            name: "docs__search_docs".into(),
            input: serde_json::json!({"q": "budget"}),
        },
    ];

    let outcomes = ToolDispatcher::new(Duration::from_secs(2))
        .dispatch_all(&requests, &registry, &cancel)
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].result.tool_use_id, "toolu_1");
    assert!(outcomes[0].result.is_error);
    assert!(outcomes[0].result.content.contains("workbook locked"));
    assert_eq!(outcomes[1].result.tool_use_id, "toolu_2");
    assert!(!outcomes[1].result.is_error);
    assert_eq!(outcomes[1].result.content, "3 documents found");
}
