use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SwarmError};
use crate::types::TokenUsage;

/// How prior agent outputs reach the next agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Only names and summaries in the prompt; details fetched with tools.
    #[default]
    Pull,
    /// Tiered context document injected into the prompt.
    Push,
}

impl std::fmt::Display for ContextMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextMode::Pull => f.write_str("pull"),
            ContextMode::Push => f.write_str("push"),
        }
    }
}

/// Top-level SwarmFlow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    /// Flow in text notation, e.g. `researcher >> [analyst, critic] >> writer`.
    #[serde(default)]
    pub flow: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub context_mode: ContextMode,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Ask agents for a `<summary>` section.
    #[serde(default = "default_structured_output")]
    pub structured_output: bool,
    /// Execute tool calls from one model response concurrently.
    #[serde(default)]
    pub parallel_tools: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_mode: ContextMode::default(),
            max_turns: default_max_turns(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            structured_output: default_structured_output(),
            parallel_tools: false,
        }
    }
}

fn default_max_turns() -> usize { 10 }
fn default_timeout_secs() -> u64 { 120 }
fn default_max_retries() -> u32 { 3 }
fn default_structured_output() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Token prices keyed by model id. Models without an entry cost nothing.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pricing: BTreeMap<String, ModelPricing>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

/// Token prices for one model, in USD per million tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub input_per_million: f64,
    #[serde(default)]
    pub output_per_million: f64,
}

impl ModelPricing {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Cost in USD of the given usage.
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 * self.input_per_million
            + usage.completion_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Backoff settings for model requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// One agent definition. Unset fields inherit from `[engine]` and `[model]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub instructions: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_turns: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwarmError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self = toml::from_str(&expanded).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Invalid config");
            SwarmError::Config(e.to_string())
        })?;
        debug!(
            path = %path.display(),
            provider = %config.model.provider,
            model = %config.model.model_id,
            agents = config.agents.len(),
            "Config loaded"
        );
        Ok(config)
    }

    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.name == name)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables are left as written
                Err(_) => {
                    debug!(var = %var_name, "Config references unset environment variable");
                    result.push_str(&format!("${{{}}}", var_name))
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_SWARMFLOW_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_SWARMFLOW_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_SWARMFLOW_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_SWARMFLOW_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_SWARMFLOW_VAR}\"");
    }

    #[test]
    fn test_engine_defaults_from_minimal_toml() {
        let toml_str = r#"
[model]
model_id = "gpt-4o-mini"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.context_mode, ContextMode::Pull);
        assert_eq!(config.engine.max_turns, 10);
        assert!(config.engine.structured_output);
        assert!(!config.engine.parallel_tools);
        assert_eq!(config.model.provider, "openai");
        assert!(config.agents.is_empty());
        assert!(config.flow.is_none());
    }

    #[test]
    fn test_agents_and_flow() {
        let toml_str = r#"
flow = "researcher >> writer"

[engine]
context_mode = "push"
max_turns = 4

[model]
model_id = "gpt-4o-mini"

[[agents]]
name = "researcher"
instructions = "Research the topic."
max_turns = 2

[[agents]]
name = "writer"
instructions = "Write it up."
model = "gpt-4o"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.context_mode, ContextMode::Push);
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agent("researcher").unwrap().max_turns, Some(2));
        assert_eq!(config.agent("writer").unwrap().model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.flow.as_deref(), Some("researcher >> writer"));
    }

    #[test]
    fn test_model_pricing() {
        let toml_str = r#"
[model]
model_id = "gpt-4o-mini"

[model.pricing."gpt-4o-mini"]
input_per_million = 0.15
output_per_million = 0.60
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let pricing = config.model.pricing["gpt-4o-mini"];
        assert_eq!(pricing, ModelPricing::new(0.15, 0.60));

        let cost = pricing.cost(&TokenUsage::new(1_000_000, 500_000));
        assert!((cost - 0.45).abs() < 1e-9);
        assert_eq!(ModelPricing::default().cost(&TokenUsage::new(10, 10)), 0.0);
    }

    #[test]
    fn test_unknown_context_mode_rejected() {
        let toml_str = r#"
[engine]
context_mode = "telepathy"

[model]
model_id = "gpt-4o-mini"
"#;
        assert!(toml::from_str::<AppConfig>(toml_str).is_err());
    }
}
