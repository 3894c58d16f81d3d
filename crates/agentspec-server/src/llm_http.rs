// SPDX-License-Identifier: MIT OR Apache-2.0
//! An OpenAI-chat-completions-shaped [`LlmClient`], the default production
//! model backend. Any endpoint speaking the same `/chat/completions` wire
//! format (a growing number of hosted and self-hosted runtimes do) works
//! without a dedicated vendor SDK.

use agentspec_agent::{LlmClient, LlmError, LlmRequest, LlmResponse, LlmToolCall};
use agentspec_session::Role;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Talks to a single configured chat-completions endpoint over HTTP.
pub struct HttpLlmClient {
    client: reqwest::Client,
    /// Base URL, e.g. `"https://api.openai.com/v1"`; `/chat/completions` is
    /// appended.
    base_url: String,
    api_key: Option<String>,
}

impl HttpLlmClient {
    /// Build a client against `base_url`, authenticating with `api_key` via
    /// `Authorization: Bearer` when set.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), api_key }
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn build_body(request: &LlmRequest) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| {
            let mut entry = json!({"role": role_str(m.role), "content": m.content});
            if let Some(call_id) = &m.tool_call_id {
                entry["tool_call_id"] = json!(call_id);
            }
            entry
        })
        .collect();

    let tools: Vec<Value> = request
        .tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters_schema,
                }
            })
        })
        .collect();

    let mut body = json!({ "model": request.model, "messages": messages });
    if !tools.is_empty() {
        body["tools"] = json!(tools);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

fn parse_response(body: &Value) -> Result<LlmResponse, LlmError> {
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| LlmError::Transport("response had no choices".to_string()))?;
    let message = choice
        .get("message")
        .ok_or_else(|| LlmError::Transport("choice had no message".to_string()))?;

    let text = message.get("content").and_then(Value::as_str).unwrap_or("").to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let id = call.get("id")?.as_str()?.to_string();
                    let function = call.get("function")?;
                    let name = function.get("name")?.as_str()?.to_string();
                    let arguments_str = function.get("arguments").and_then(Value::as_str).unwrap_or("{}");
                    let arguments = serde_json::from_str(arguments_str).unwrap_or(Value::Null);
                    Some(LlmToolCall { id, name, arguments })
                })
                .collect()
        })
        .unwrap_or_default();

    let input_tokens = body.get("usage").and_then(|u| u.get("prompt_tokens")).and_then(Value::as_u64).unwrap_or(0);
    let output_tokens =
        body.get("usage").and_then(|u| u.get("completion_tokens")).and_then(Value::as_u64).unwrap_or(0);

    Ok(LlmResponse { text, tool_calls, input_tokens, output_tokens })
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = build_body(&request);

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| LlmError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| LlmError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(LlmError::Transport(format!("{status}: {text}")));
        }
        let body: Value = serde_json::from_str(&text).map_err(|e| LlmError::Transport(e.to_string()))?;
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentspec_session::Message;

    #[test]
    fn build_body_includes_tools_only_when_present() {
        let request = LlmRequest { model: "m".into(), messages: vec![], tools: vec![], temperature: None };
        let body = build_body(&request);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn build_body_maps_message_roles() {
        let request = LlmRequest {
            model: "m".into(),
            messages: vec![Message::new(Role::User, "hi")],
            tools: vec![],
            temperature: Some(0.2),
        };
        let body = build_body(&request);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["temperature"], 0.2);
    }

    #[test]
    fn parse_response_extracts_text_and_tool_calls() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": "hello",
                    "tool_calls": [{"id": "c1", "function": {"name": "echo", "arguments": "{\"x\":1}"}}]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        });
        let response = parse_response(&body).unwrap();
        assert_eq!(response.text, "hello");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "echo");
        assert_eq!(response.input_tokens, 10);
        assert_eq!(response.output_tokens, 5);
    }

    #[test]
    fn parse_response_rejects_missing_choices() {
        let body = json!({"choices": []});
        assert!(parse_response(&body).is_err());
    }
}
