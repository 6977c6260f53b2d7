use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::debug;

use swarmflow_core::context::SharedContext;
use swarmflow_core::error::{Result, SwarmError};
use swarmflow_core::schema::{ParamType, ToolSchema};
use swarmflow_core::traits::Tool;

/// Names the engine reserves for the run-scoped context tools. Agents may
/// not register their own tools under these names.
pub const RESERVED_TOOL_NAMES: [&str; 4] =
    ["list_context", "get_context", "search_context", "expand_context"];

pub fn is_reserved_tool_name(name: &str) -> bool {
    RESERVED_TOOL_NAMES.contains(&name)
}

/// Read-only view of the shared context handed to the context tools.
#[derive(Debug, Clone)]
pub struct ContextHandle {
    snapshot: Arc<SharedContext>,
}

impl ContextHandle {
    pub fn new(snapshot: Arc<SharedContext>) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &SharedContext {
        &self.snapshot
    }

    fn full_text(&self, agent: &str) -> Result<String> {
        match self.snapshot.get(agent) {
            Some(text) => Ok(text.to_string()),
            None => {
                let names = self.snapshot.names();
                Err(SwarmError::ContextNotFound {
                    agent: agent.to_string(),
                    available: if names.is_empty() {
                        "(none)".to_string()
                    } else {
                        names.join(", ")
                    },
                })
            }
        }
    }
}

/// Pull-mode tools: `list_context`, `get_context`, `search_context`.
pub fn context_tools(handle: ContextHandle) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListContextTool::new(handle.clone())),
        Arc::new(GetContextTool::new(handle.clone())),
        Arc::new(SearchContextTool::new(handle)),
    ]
}

/// Push-mode tool for reading a summarized entry in full.
pub fn expand_tool(handle: ContextHandle) -> Arc<dyn Tool> {
    Arc::new(ExpandContextTool::new(handle))
}

fn agent_name_arg(args: &Map<String, Value>) -> Result<&str> {
    args.get("agent_name")
        .and_then(Value::as_str)
        .ok_or_else(|| SwarmError::ToolValidation("missing required argument 'agent_name'".into()))
}

// ── list_context ────────────────────────────────────────────────

pub struct ListContextTool {
    schema: ToolSchema,
    handle: ContextHandle,
}

impl ListContextTool {
    pub fn new(handle: ContextHandle) -> Self {
        Self {
            schema: ToolSchema::new(
                "list_context",
                "List the outputs of prior agents with their size and a one-line summary.",
            ),
            handle,
        }
    }
}

impl Tool for ListContextTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn execute(&self, _args: Map<String, Value>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Ok(self.handle.snapshot().listing()) })
    }
}

// ── get_context ─────────────────────────────────────────────────

pub struct GetContextTool {
    schema: ToolSchema,
    handle: ContextHandle,
}

impl GetContextTool {
    pub fn new(handle: ContextHandle) -> Self {
        Self {
            schema: ToolSchema::new("get_context", "Read the full output of a prior agent.")
                .required("agent_name", ParamType::String, "Name of the agent whose output to read"),
            handle,
        }
    }
}

impl Tool for GetContextTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let agent = agent_name_arg(&args)?;
            debug!(agent = %agent, "Context pulled");
            self.handle.full_text(agent)
        })
    }
}

// ── search_context ──────────────────────────────────────────────

pub struct SearchContextTool {
    schema: ToolSchema,
    handle: ContextHandle,
}

impl SearchContextTool {
    pub fn new(handle: ContextHandle) -> Self {
        Self {
            schema: ToolSchema::new(
                "search_context",
                "Search all prior agent outputs for a regex or literal text. Returns matching lines with surrounding text, grouped by agent.",
            )
            .required("query", ParamType::String, "Regex pattern or plain text to look for"),
            handle,
        }
    }
}

impl Tool for SearchContextTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let query = args
                .get("query")
                .and_then(Value::as_str)
                .ok_or_else(|| SwarmError::ToolValidation("missing required argument 'query'".into()))?;

            let hits = self.handle.snapshot().search(query);
            if hits.is_empty() {
                return Ok(format!("No matches found for '{}'.", query));
            }

            let mut out = String::new();
            let mut current: Option<&str> = None;
            for hit in &hits {
                if current != Some(hit.agent.as_str()) {
                    if current.is_some() {
                        out.push('\n');
                    }
                    out.push_str(&format!("**{}**:\n", hit.agent));
                    current = Some(hit.agent.as_str());
                }
                out.push_str(&format!("  line {}:\n", hit.line));
                for line in hit.excerpt.lines() {
                    out.push_str("    ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            Ok(out.trim_end().to_string())
        })
    }
}

// ── expand_context ──────────────────────────────────────────────

pub struct ExpandContextTool {
    schema: ToolSchema,
    handle: ContextHandle,
}

impl ExpandContextTool {
    pub fn new(handle: ContextHandle) -> Self {
        Self {
            schema: ToolSchema::new(
                "expand_context",
                "Read the full output of a prior agent that is only shown as a summary.",
            )
            .required("agent_name", ParamType::String, "Name of the summarized agent"),
            handle,
        }
    }
}

impl Tool for ExpandContextTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let agent = agent_name_arg(&args)?;
            debug!(agent = %agent, "Context expanded");
            self.handle.full_text(agent)
        })
    }
}
