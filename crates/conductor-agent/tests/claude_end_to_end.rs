#![allow(clippy::unwrap_used, clippy::expect_used)]

use conductor_agent::{ChatRequest, ModelConfig, Orchestrator, OrchestratorConfig};
use conductor_core::TraceLevel;
use conductor_mcp::{StaticServerDirectory, ToolServerConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn tool_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"tools": [{
                "name": "search_docs",
                "description": "Full-text search over uploaded documents",
                "inputSchema": {"type": "object", "properties": {"query": {"type": "string"}}}
            }]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "tools/call",
            "params": {"name": "search_docs"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {"content": [{"type": "text", "text": "budget.xlsx: total 48,200 EUR"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_full_round_trip_over_http() {
    let claude = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-e2e"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("anthropic-ratelimit-tokens-remaining", "79000")
                .set_body_json(json!({
                    "content": [{
                        "type": "tool_use",
                        "id": "toolu_01",
                        "name": "docserver__search_docs",
                        "input": {"query": "budget"}
                    }],
                    "stop_reason": "tool_use",
                    "usage": {"input_tokens": 410, "output_tokens": 52}
                })),
        )
        .up_to_n_times(1)
        .mount(&claude)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "The budget totals 48,200 EUR."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 520, "output_tokens": 14}
        })))
        .mount(&claude)
        .await;

    let tools = tool_server().await;
    let servers: Vec<ToolServerConfig> = vec![serde_json::from_value(json!({
        "id": "docserver",
        "url": format!("{}/rpc", tools.uri()),
        "headers": {"authorization": "Bearer tool-secret"}
    }))
    .unwrap()];
    let directory = StaticServerDirectory::from_configs(&servers, Duration::from_secs(5)).unwrap();

    let mut model = ModelConfig::claude("claude-3-5-haiku-latest", "sk-e2e");
    model.api_base_url = Some(claude.uri());
    let orch = Orchestrator::new(model, OrchestratorConfig::default(), Arc::new(directory));

    let resp = orch
        .handle(
            ChatRequest::new("alice", "What is the budget total?"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(resp.reply, "The budget totals 48,200 EUR.");
    assert_eq!(resp.metadata.mcp_tools_executed, 1);
    assert_eq!(resp.metadata.tokens.input, 930);
    assert_eq!(resp.metadata.tokens.output, 66);
    let expected_cost = (930.0 * 0.8 + 66.0 * 4.0) / 1e6;
    assert!((resp.metadata.cost - expected_cost).abs() < 1e-12);

    let rate_limits = resp
        .logs
        .iter()
        .find(|e| e.message == "Provider rate limits")
        .unwrap();
    assert_eq!(rate_limits.level, TraceLevel::Info);

    // the second completion request carries the tool result
    let requests = claude.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let second: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    let result = &second["messages"][2]["content"][0];
    assert_eq!(result["type"], "tool_result");
    assert_eq!(result["tool_use_id"], "toolu_01");
    assert_eq!(result["content"], "budget.xlsx: total 48,200 EUR");
    assert_eq!(second["tools"][0]["name"], "docserver__search_docs");

    // secrets never reach the trace
    let logs = serde_json::to_string(&resp.logs).unwrap();
    assert!(!logs.contains("sk-e2e"));
    assert!(!logs.contains("tool-secret"));
}

#[tokio::test]
async fn test_provider_rejection_returns_envelope() {
    let claude = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .mount(&claude)
        .await;

    let mut model = ModelConfig::claude("claude-sonnet-4-20250514", "sk-bad");
    model.api_base_url = Some(claude.uri());
    let directory = StaticServerDirectory::from_configs(&[], Duration::from_secs(5)).unwrap();
    let orch = Orchestrator::new(model, OrchestratorConfig::default(), Arc::new(directory));

    let failure = orch
        .handle(ChatRequest::new("alice", "hello"), &CancellationToken::new())
        .await
        .unwrap_err();
    let envelope = serde_json::to_value(failure.into_envelope()).unwrap();
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["errorType"], "completion_provider");
    assert!(envelope["error"]
        .as_str()
        .unwrap()
        .contains("authentication_error"));
    assert!(!envelope["logs"].as_array().unwrap().is_empty());
}
