use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use swarmflow_core::config::ModelConfig;
use swarmflow_core::error::{Result, SwarmError};
use swarmflow_core::traits::ModelClient;
use swarmflow_core::types::*;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const OLLAMA_API_URL: &str = "http://localhost:11434/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> &str {
        match (&self.config.base_url, self.config.provider.as_str()) {
            (Some(url), _) => url.as_str(),
            (None, "ollama") => OLLAMA_API_URL,
            (None, _) => OPENAI_API_URL,
        }
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OaiTool>,
}

#[derive(Serialize, Debug)]
pub(crate) struct OaiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OaiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct OaiToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: OaiFunction,
}

fn function_type() -> String { "function".to_string() }

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct OaiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize)]
pub(crate) struct OaiTool {
    r#type: String,
    function: OaiToolDef,
}

#[derive(Serialize)]
pub(crate) struct OaiToolDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OaiToolCall>>,
}

#[derive(Deserialize, Debug)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub(crate) fn convert_tools(tools: &[ToolDefinition]) -> Vec<OaiTool> {
    tools
        .iter()
        .map(|t| OaiTool {
            r#type: "function".to_string(),
            function: OaiToolDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

pub(crate) fn convert_messages(system_prompt: &str, messages: &[ChatMessage]) -> Vec<OaiMessage> {
    let mut oai_msgs = Vec::with_capacity(messages.len() + 1);

    if !system_prompt.is_empty() {
        oai_msgs.push(OaiMessage {
            role: "system".to_string(),
            content: Some(system_prompt.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for msg in messages {
        match msg.role {
            Role::User => {
                oai_msgs.push(OaiMessage {
                    role: "user".to_string(),
                    content: Some(msg.text()),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
            Role::Assistant => {
                let tool_uses = msg.tool_uses();
                let text = msg.text();
                if tool_uses.is_empty() {
                    oai_msgs.push(OaiMessage {
                        role: "assistant".to_string(),
                        content: Some(text),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                } else {
                    let calls = tool_uses
                        .iter()
                        .map(|(id, name, arguments)| OaiToolCall {
                            id: id.to_string(),
                            r#type: function_type(),
                            function: OaiFunction {
                                name: name.to_string(),
                                arguments: arguments.to_string(),
                            },
                        })
                        .collect();
                    oai_msgs.push(OaiMessage {
                        role: "assistant".to_string(),
                        content: if text.is_empty() { None } else { Some(text) },
                        tool_calls: Some(calls),
                        tool_call_id: None,
                    });
                }
            }
            Role::Tool => {
                for block in &msg.content {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        oai_msgs.push(OaiMessage {
                            role: "tool".to_string(),
                            content: Some(content.clone()),
                            tool_calls: None,
                            tool_call_id: Some(tool_use_id.clone()),
                        });
                    }
                }
            }
        }
    }

    oai_msgs
}

fn parse_response(body: &str) -> Result<ModelResponse> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| SwarmError::ModelParse(e.to_string()))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| SwarmError::ModelParse("response has no choices".into()))?;

    let tool_calls: Vec<ToolCallRequest> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCallRequest::new(tc.id, tc.function.name, tc.function.arguments))
        .collect();

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        Some("stop") | None => {
            if tool_calls.is_empty() {
                StopReason::EndTurn
            } else {
                StopReason::ToolUse
            }
        }
        Some(_) => StopReason::EndTurn,
    };

    let usage = parsed
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(ModelResponse {
        text: choice.message.content,
        tool_calls,
        usage,
        stop_reason,
    })
}

impl ModelClient for OpenAiClient {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>> {
        Box::pin(async move {
            let model = if request.model.is_empty() {
                self.config.model_id.clone()
            } else {
                request.model.clone()
            };

            let body = ChatRequest {
                model,
                messages: convert_messages(&request.system_prompt, &request.messages),
                max_tokens: self.config.max_tokens,
                temperature: if self.config.temperature > 0.0 {
                    Some(self.config.temperature)
                } else {
                    None
                },
                tools: convert_tools(&request.tools),
            };

            let mut req = self.http.post(self.endpoint()).json(&body);

            if let Some(api_key) = &self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
            if let Some(timeout) = request.timeout {
                req = req.timeout(timeout);
            }

            let response = req.send().await.map_err(|e| {
                if e.is_timeout() {
                    SwarmError::ModelTimeout {
                        timeout_secs: request.timeout.map(|t| t.as_secs()).unwrap_or(0),
                    }
                } else {
                    SwarmError::ModelRequest(e.to_string())
                }
            })?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| SwarmError::ModelRequest(e.to_string()))?;

            if !status.is_success() {
                return Err(SwarmError::ModelRequest(format!("HTTP {}: {}", status, text)));
            }

            debug!(status = %status, bytes = text.len(), "Model response received");
            parse_response(&text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_messages_maps_roles() {
        let calls = vec![ToolCallRequest::new("call_1", "get_context", r#"{"agent_name":"a"}"#)];
        let history = vec![
            ChatMessage::user("Write a report"),
            ChatMessage::assistant_tool_calls(None, &calls),
            ChatMessage::tool_result("call_1", "A's output", false),
        ];

        let msgs = convert_messages("You are a writer.", &history);
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[1].role, "user");
        assert_eq!(msgs[2].role, "assistant");
        assert!(msgs[2].content.is_none());
        assert_eq!(msgs[2].tool_calls.as_ref().unwrap()[0].function.name, "get_context");
        assert_eq!(msgs[3].role, "tool");
        assert_eq!(msgs[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_parse_text_response() {
        let body = r#"{
            "choices": [{"message": {"content": "Hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let resp = parse_response(body).unwrap();
        assert_eq!(resp.text.as_deref(), Some("Hello"));
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert_eq!(resp.usage, TokenUsage::new(12, 3));
    }

    #[test]
    fn test_parse_tool_call_response() {
        let body = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "search_context", "arguments": "{\"query\":\"x\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let resp = parse_response(body).unwrap();
        assert!(resp.text.is_none());
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(
            resp.tool_calls,
            vec![ToolCallRequest::new("call_9", "search_context", r#"{"query":"x"}"#)]
        );
        assert_eq!(resp.usage, TokenUsage::default());
    }

    #[test]
    fn test_parse_rejects_empty_choices() {
        let err = parse_response(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, SwarmError::ModelParse(_)));
    }
}
