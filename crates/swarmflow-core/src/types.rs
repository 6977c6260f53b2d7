use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A single content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    /// A tool invocation requested by the model. `arguments` is the raw JSON
    /// text exactly as the model produced it.
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        arguments: String,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// A chat message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    /// Assistant turn that requests tool invocations.
    pub fn assistant_tool_calls(text: Option<String>, calls: &[ToolCallRequest]) -> Self {
        let mut content = Vec::with_capacity(calls.len() + 1);
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            content.push(ContentBlock::Text { text });
        }
        content.extend(calls.iter().map(|c| ContentBlock::ToolUse {
            id: c.id.clone(),
            name: c.name.clone(),
            arguments: c.arguments.clone(),
        }));
        Self {
            role: Role::Assistant,
            content,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error,
            }],
            timestamp: Some(Utc::now()),
        }
    }

    /// Extract all text content from this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract all tool use blocks from this message as (id, name, arguments).
    pub fn tool_uses(&self) -> Vec<(&str, &str, &str)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse {
                    id,
                    name,
                    arguments,
                } => Some((id.as_str(), name.as_str(), arguments.as_str())),
                _ => None,
            })
            .collect()
    }
}

/// Why the model stopped producing output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
        };
        f.write_str(s)
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw JSON object text; may be malformed.
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Token accounting for one or more model calls.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), |mut acc, u| {
            acc += u;
            acc
        })
    }
}

/// Tool definition for sending to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Result of a tool execution, already rendered as text for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// One round trip to the model.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub model: String,
    /// Per-call timeout, enforced by the transport.
    pub timeout: Option<Duration>,
    /// Transport-level retry budget.
    pub max_retries: Option<u32>,
}

impl ModelRequest {
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

/// The model's reply: final text, or tool invocations to perform.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: TokenUsage,
    pub stop_reason: StopReason,
}

impl ModelResponse {
    /// A plain text answer.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: vec![],
            usage: TokenUsage::default(),
            stop_reason: StopReason::EndTurn,
        }
    }

    /// A response requesting tool calls.
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            text: None,
            tool_calls: calls,
            usage: TokenUsage::default(),
            stop_reason: StopReason::ToolUse,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Execution event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum SwarmEvent {
    /// A flow run started.
    RunStarted { task: String, step_count: usize },
    /// A flow run completed.
    RunComplete {
        elapsed_ms: u64,
        agent_count: usize,
        usage: TokenUsage,
        /// USD; zero when no pricing is configured.
        total_cost: f64,
    },
    /// A top-level step started.
    StepStarted {
        index: usize,
        agents: Vec<String>,
        parallel: bool,
    },
    /// A top-level step completed and its results were committed.
    StepComplete { index: usize },
    /// An agent started working on the task.
    AgentStarted { agent: String, task: String },
    /// An agent produced its final answer.
    AgentComplete {
        agent: String,
        elapsed_ms: u64,
        cost: f64,
    },
    /// An agent failed; the run will abort.
    AgentFailed { agent: String, error: String },
    /// A model call is about to be issued.
    ModelCallStarted { agent: String, call_index: usize },
    /// A model call returned.
    ModelCallComplete {
        agent: String,
        call_index: usize,
        stop_reason: StopReason,
        elapsed_ms: u64,
        usage: TokenUsage,
    },
    /// A tool invocation started.
    ToolStarted {
        agent: String,
        tool: String,
        arguments: String,
    },
    /// A tool invocation finished (successfully or with an error payload).
    ToolComplete {
        agent: String,
        tool: String,
        is_error: bool,
        elapsed_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_sums() {
        let total: TokenUsage = [TokenUsage::new(10, 20), TokenUsage::new(1, 2)]
            .into_iter()
            .sum();
        assert_eq!(total.prompt_tokens, 11);
        assert_eq!(total.completion_tokens, 22);
        assert_eq!(total.total_tokens, 33);
    }

    #[test]
    fn assistant_tool_calls_skips_empty_text() {
        let calls = vec![ToolCallRequest::new("call_1", "lookup", r#"{"q":"x"}"#)];
        let msg = ChatMessage::assistant_tool_calls(Some(String::new()), &calls);
        assert_eq!(msg.content.len(), 1);
        assert_eq!(msg.tool_uses(), vec![("call_1", "lookup", r#"{"q":"x"}"#)]);
    }

    #[test]
    fn content_block_serializes_with_type_tag() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "call_1".into(),
            content: "ok".into(),
            is_error: false,
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
    }
}
