use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use swarmflow_core::error::{Result, SwarmError};
use swarmflow_core::traits::Tool;
use swarmflow_core::types::{ToolDefinition, ToolResult};

/// Ordered registry of the tools offered to one agent.
///
/// Definitions are sent to the model in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Tool names must be unique.
    pub fn register(&mut self, tool: impl Tool) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        if self.get(tool.name()).is_some() {
            return Err(SwarmError::Schema {
                tool: tool.name().to_string(),
                param: None,
                message: "duplicate tool name".to_string(),
            });
        }
        self.tools.push(tool);
        Ok(())
    }

    /// A copy of this registry with `extra` appended.
    ///
    /// Used for run-scoped tools; `self` is left untouched.
    pub fn with_extra(&self, extra: &[Arc<dyn Tool>]) -> Result<Self> {
        let mut merged = self.clone();
        for tool in extra {
            merged.register_arc(tool.clone())?;
        }
        Ok(merged)
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Get tool definitions for sending to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.schema().definition()).collect()
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, args: Map<String, Value>) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| SwarmError::ToolNotFound(name.to_string()))?;

        let timeout = Duration::from_secs(tool.timeout_secs());

        match tokio::time::timeout(timeout, tool.execute(args)).await {
            Ok(result) => result,
            Err(_) => Err(SwarmError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
    }

    /// Execute a model-requested call with raw JSON arguments.
    ///
    /// Never fails: every problem is rendered as an error payload the model
    /// can read and react to.
    pub async fn invoke(&self, name: &str, raw_args: &str) -> ToolResult {
        if self.get(name).is_none() {
            return ToolResult::error(format!("Error: unknown tool '{}'", name));
        }

        let args = match parse_arguments(raw_args) {
            Ok(args) => args,
            Err(why) => {
                return ToolResult::error(format!("Error: invalid arguments JSON: {}", why))
            }
        };

        match self.execute(name, args).await {
            Ok(content) => ToolResult::success(content),
            Err(e) => {
                debug!(tool = %name, error = %e, "Tool call failed");
                ToolResult::error(error_payload(name, &e))
            }
        }
    }
}

fn parse_arguments(raw: &str) -> std::result::Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected an object, got {}", json_kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn error_payload(name: &str, err: &SwarmError) -> String {
    let why = match err {
        SwarmError::ToolNotFound(_) => return format!("Error: unknown tool '{}'", name),
        SwarmError::ToolExecution { message, .. } => message.clone(),
        SwarmError::ToolTimeout { timeout_secs, .. } => {
            format!("timed out after {}s", timeout_secs)
        }
        SwarmError::ToolValidation(message) => message.clone(),
        other => other.to_string(),
    };
    format!("Error: tool '{}' failed: {}", name, why)
}
