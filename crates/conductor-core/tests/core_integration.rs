#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for conductor-core: turns, blocks, tool identity, tracing.

use conductor_core::{
    ContentBlock, ConversationTurn, ExecutionTracer, Role, ToolCallResult, ToolKey, TraceLevel,
    TurnContent,
};

#[test]
fn test_assistant_round_then_results_correlate_by_id() {
    let assistant = ConversationTurn::assistant_blocks(vec![
        ContentBlock::text("Let me look that up."),
        ContentBlock::ToolUse {
            id: "toolu_a".into(),
            name: "docs__search".into(),
            input: serde_json::json!({"q": "invoices"}),
        },
        ContentBlock::ToolUse {
            id: "toolu_b".into(),
            name: "sheets__read".into(),
            input: serde_json::json!({"range": "A1:B2"}),
        },
    ]);
    let requests = assistant.tool_requests();
    assert_eq!(requests.len(), 2);

    let results: Vec<ToolCallResult> = requests
        .iter()
        .map(|r| ToolCallResult::success(&r.id, "done"))
        .collect();
    let user = ConversationTurn::tool_results(results);

    let TurnContent::Blocks(blocks) = &user.content else {
        panic!("tool results must be blocks");
    };
    let ids: Vec<&str> = blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec!["toolu_a", "toolu_b"]);
}

#[test]
fn test_turn_serialization_roundtrip_keeps_role() {
    let turn = ConversationTurn::assistant("All done.");
    let json = serde_json::to_string(&turn).unwrap();
    let back: ConversationTurn = serde_json::from_str(&json).unwrap();
    assert_eq!(back.role, Role::Assistant);
    assert_eq!(back.first_text(), Some("All done."));
}

#[test]
fn test_tool_key_display_matches_wire_for_clean_names() {
    let key = ToolKey::new("excel", "write_cells");
    assert_eq!(key.to_string(), key.wire_name());
    assert_eq!(ToolKey::parse(&key.wire_name()), Some(key));
}

#[test]
fn test_trace_serializes_for_the_response_envelope() {
    let mut tracer = ExecutionTracer::new();
    tracer.info("request", "Request received");
    tracer.log(TraceLevel::Ai, "completion", "Completion received");
    let logs = serde_json::to_value(tracer.into_entries()).unwrap();
    assert_eq!(logs.as_array().unwrap().len(), 2);
    assert_eq!(logs[1]["level"], "AI");
    assert!(logs[0]["timestamp"].is_string());
}
