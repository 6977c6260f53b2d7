use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwarmError {
    // Build-time errors
    #[error("Flow construction failed: {0}")]
    Construction(String),

    #[error("Tool schema error: {tool}: {message}")]
    Schema {
        tool: String,
        /// Offending parameter, when the problem is with one parameter.
        param: Option<String>,
        message: String,
    },

    // Model errors
    #[error("Model request failed: {0}")]
    ModelRequest(String),

    #[error("Model request timed out after {timeout_secs}s")]
    ModelTimeout { timeout_secs: u64 },

    #[error("Model response parse error: {0}")]
    ModelParse(String),

    #[error("Model provider not supported: {0}")]
    UnsupportedProvider(String),

    // Tool errors
    #[error("unknown tool '{0}'")]
    ToolNotFound(String),

    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("tool '{tool}' timed out after {timeout_secs}s")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("invalid tool input: {0}")]
    ToolValidation(String),

    #[error("No context found for agent '{agent}'. Available agents: {available}")]
    ContextNotFound { agent: String, available: String },

    // Agent errors
    #[error("Agent exceeded max turns ({0})")]
    MaxTurnsExceeded(usize),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Agent '{agent}': {source}")]
    Agent {
        agent: String,
        #[source]
        source: Box<SwarmError>,
    },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwarmError {
    /// Wrap an error with the name of the agent it belongs to.
    ///
    /// Errors already scoped to an agent are returned unchanged.
    pub fn for_agent(self, agent: impl Into<String>) -> Self {
        match self {
            e @ SwarmError::Agent { .. } => e,
            other => SwarmError::Agent {
                agent: agent.into(),
                source: Box::new(other),
            },
        }
    }

    /// Name of the agent this error is scoped to, if any.
    pub fn agent_name(&self) -> Option<&str> {
        match self {
            SwarmError::Agent { agent, .. } => Some(agent),
            _ => None,
        }
    }

    /// The underlying error with any agent scoping removed.
    pub fn root(&self) -> &SwarmError {
        match self {
            SwarmError::Agent { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when an agent ran out of turns.
    pub fn is_turn_limit(&self) -> bool {
        matches!(self.root(), SwarmError::MaxTurnsExceeded(_))
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_agent_wraps_once() {
        let err = SwarmError::MaxTurnsExceeded(3).for_agent("writer");
        assert_eq!(err.agent_name(), Some("writer"));

        let again = err.for_agent("editor");
        assert_eq!(again.agent_name(), Some("writer"));
        assert!(again.is_turn_limit());
    }

    #[test]
    fn agent_error_message_names_agent() {
        let err = SwarmError::ModelRequest("HTTP 500".into()).for_agent("researcher");
        assert_eq!(
            err.to_string(),
            "Agent 'researcher': Model request failed: HTTP 500"
        );
    }

    #[test]
    fn schema_error_names_parameter() {
        let err = SwarmError::Schema {
            tool: "search".into(),
            param: Some("filters".into()),
            message: "parameter 'filters': unsupported type 'HashMap<String, String>'".into(),
        };
        assert_eq!(
            err.to_string(),
            "Tool schema error: search: parameter 'filters': unsupported type 'HashMap<String, String>'"
        );
    }
}
