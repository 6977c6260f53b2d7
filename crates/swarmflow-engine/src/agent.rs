use std::sync::Arc;

use swarmflow_core::config::AgentConfig;
use swarmflow_core::error::{Result, SwarmError};
use swarmflow_core::traits::Tool;
use swarmflow_tools::{is_reserved_tool_name, ToolRegistry};

/// A named role in a flow: instructions, tools, and optional overrides of the
/// engine defaults.
///
/// Agents are immutable once placed in a flow and are reused across runs.
#[derive(Clone)]
pub struct Agent {
    name: String,
    instructions: String,
    model: Option<String>,
    tools: ToolRegistry,
    max_turns: Option<usize>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

impl Agent {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model: None,
            tools: ToolRegistry::new(),
            max_turns: None,
            timeout_secs: None,
            max_retries: None,
        }
    }

    /// Build an agent from its `[[agents]]` entry.
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            name: config.name.clone(),
            instructions: config.instructions.clone(),
            model: config.model.clone(),
            tools: ToolRegistry::new(),
            max_turns: config.max_turns,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Add a tool. Fails if the agent already has a tool with that name, or
    /// if the name belongs to one of the engine's context tools.
    pub fn with_tool(self, tool: impl Tool) -> Result<Self> {
        self.with_tool_arc(Arc::new(tool))
    }

    pub fn with_tool_arc(mut self, tool: Arc<dyn Tool>) -> Result<Self> {
        if is_reserved_tool_name(tool.name()) {
            return Err(SwarmError::Schema {
                tool: tool.name().to_string(),
                param: None,
                message: "name is reserved for the context tools".to_string(),
            });
        }
        self.tools.register_arc(tool)?;
        Ok(self)
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn max_turns(&self) -> Option<usize> {
        self.max_turns
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tools.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmflow_tools::{FunctionTool, Signature, ToolArgs};

    fn named_tool(name: &str) -> FunctionTool {
        FunctionTool::new(Signature::new(name).doc("Test tool."), |_args: ToolArgs| {
            Ok::<_, SwarmError>("ok")
        })
        .unwrap()
    }

    #[test]
    fn test_context_tool_names_are_reserved() {
        for name in ["list_context", "get_context", "search_context", "expand_context"] {
            let err = Agent::new("a", "").with_tool(named_tool(name)).unwrap_err();
            match err {
                SwarmError::Schema { tool, .. } => assert_eq!(tool, name),
                other => panic!("unexpected error: {}", other),
            }
        }
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let agent = Agent::new("a", "").with_tool(named_tool("lookup")).unwrap();
        assert!(agent.with_tool(named_tool("lookup")).is_err());
    }

    #[test]
    fn test_from_config_copies_overrides() {
        let config = AgentConfig {
            name: "writer".into(),
            instructions: "Write.".into(),
            model: Some("small".into()),
            max_turns: Some(2),
            timeout_secs: None,
            max_retries: Some(0),
        };
        let agent = Agent::from_config(&config);
        assert_eq!(agent.name(), "writer");
        assert_eq!(agent.model(), Some("small"));
        assert_eq!(agent.max_turns(), Some(2));
        assert_eq!(agent.timeout_secs(), None);
        assert!(agent.tools().names().is_empty());
    }
}
