use super::CompletionBackend;
use crate::config::ModelConfig;
use crate::llm::{CompletionResponse, StopReason};
use crate::usage::RoundUsage;
use async_trait::async_trait;
use conductor_core::{
    ConductorError, ConductorResult, ContentBlock, ConversationTurn, Role, ToolSchema,
    TurnContent,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const RATE_LIMIT_HEADER_PREFIX: &str = "anthropic-ratelimit-";

/// Claude (Anthropic Messages API) backend.
pub struct ClaudeBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl ClaudeBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: ModelConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: Role,
    content: &'a TurnContent,
}

#[async_trait]
impl CompletionBackend for ClaudeBackend {
    fn provider(&self) -> &str {
        self.config.provider.as_str()
    }

    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[ConversationTurn],
        tools: &[ToolSchema],
    ) -> ConductorResult<CompletionResponse> {
        let url = format!("{}/v1/messages", self.config.base_url());
        let api_key = self.config.resolve_api_key().ok_or_else(|| {
            ConductorError::Configuration("no API key configured for provider claude".into())
        })?;

        let api_messages: Vec<ClaudeMessage<'_>> = messages
            .iter()
            .map(|m| ClaudeMessage {
                role: m.role,
                content: &m.content,
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": api_messages,
        });

        if let Some(sys) = system_prompt {
            body["system"] = serde_json::json!(sys);
        }

        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)?;
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ConductorError::Timeout(format!("Claude API: {e}"))
                } else {
                    ConductorError::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        let rate_limits = rate_limit_headers(resp.headers());

        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ConductorError::CompletionProvider {
                status: status.as_u16(),
                body: error_body,
            });
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ConductorError::Http(e.to_string()))?;

        let mut response = parse_claude_response(&resp_body)?;
        response.rate_limits = rate_limits;
        debug!(
            stop_reason = %response.stop_reason,
            blocks = response.content.len(),
            "Claude response parsed"
        );
        Ok(response)
    }
}

fn rate_limit_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with(RATE_LIMIT_HEADER_PREFIX))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Parses a Messages API body. Block types other than text and tool_use
/// (thinking, citations, ...) are dropped.
pub fn parse_claude_response(body: &serde_json::Value) -> ConductorResult<CompletionResponse> {
    let blocks = body["content"].as_array().ok_or_else(|| {
        ConductorError::Protocol("Missing content in Claude response".into())
    })?;

    let mut content = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(t) = block["text"].as_str() {
                    content.push(ContentBlock::text(t));
                }
            }
            Some("tool_use") => {
                let id = block["id"].as_str().unwrap_or_default().to_string();
                let name = block["name"].as_str().unwrap_or_default().to_string();
                let input = match &block["input"] {
                    serde_json::Value::Null => serde_json::json!({}),
                    other => other.clone(),
                };
                content.push(ContentBlock::ToolUse { id, name, input });
            }
            _ => {}
        }
    }

    let stop_reason = body["stop_reason"]
        .as_str()
        .map(StopReason::parse)
        .unwrap_or(StopReason::EndTurn);

    let usage = RoundUsage::new(
        body["usage"]["input_tokens"].as_u64().unwrap_or(0),
        body["usage"]["output_tokens"].as_u64().unwrap_or(0),
    );

    Ok(CompletionResponse {
        content,
        stop_reason,
        usage,
        rate_limits: BTreeMap::new(),
    })
}
