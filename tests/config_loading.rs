use std::io::Write;

use swarmflow_core::config::{AppConfig, ContextMode};
use swarmflow_core::error::SwarmError;
use swarmflow_engine::{Agent, Flow};
use swarmflow_test_utils::{sample_config, write_config};

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
flow = "planner >> [researcher, critic] >> writer"

[engine]
context_mode = "push"
max_turns = 6
timeout_secs = 30
max_retries = 1
structured_output = false
parallel_tools = true

[model]
provider = "ollama"
model_id = "llama3.2"
api_key = "sk-test-key"
base_url = "http://localhost:11434/v1/chat/completions"
max_tokens = 2048
temperature = 0.5

[model.retry]
initial_backoff_ms = 250
max_backoff_ms = 4000

[model.pricing."llama3.2:70b"]
input_per_million = 0.59
output_per_million = 0.79

[[agents]]
name = "planner"
instructions = "Plan the work."

[[agents]]
name = "researcher"
instructions = "Research the topic."
model = "llama3.2:70b"
max_turns = 12

[[agents]]
name = "critic"
instructions = "Criticize the plan."
timeout_secs = 10

[[agents]]
name = "writer"
instructions = "Write the report."
max_retries = 0
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.context_mode, ContextMode::Push);
    assert_eq!(config.engine.max_turns, 6);
    assert_eq!(config.engine.timeout_secs, 30);
    assert_eq!(config.engine.max_retries, 1);
    assert!(!config.engine.structured_output);
    assert!(config.engine.parallel_tools);

    assert_eq!(config.model.provider, "ollama");
    assert_eq!(config.model.api_key, Some("sk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 2048);
    let retry = config.model.retry.as_ref().expect("retry present");
    assert_eq!(retry.initial_backoff_ms, 250);
    assert_eq!(retry.max_backoff_ms, 4000);
    let pricing = config.model.pricing["llama3.2:70b"];
    assert_eq!(pricing.input_per_million, 0.59);
    assert_eq!(pricing.output_per_million, 0.79);
    assert!(!config.model.pricing.contains_key("llama3.2"));

    assert_eq!(config.agents.len(), 4);
    let researcher = config.agent("researcher").expect("researcher present");
    assert_eq!(researcher.model.as_deref(), Some("llama3.2:70b"));
    assert_eq!(researcher.max_turns, Some(12));
    assert_eq!(config.agent("critic").and_then(|a| a.timeout_secs), Some(10));
    assert_eq!(config.agent("writer").and_then(|a| a.max_retries), Some(0));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("SWARMFLOW_IT_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "test-model"
api_key = "${SWARMFLOW_IT_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("SWARMFLOW_IT_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "gpt-4o-mini"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.context_mode, ContextMode::Pull);
    assert_eq!(config.engine.max_turns, 10);
    assert!(config.engine.structured_output);
    assert!(!config.engine.parallel_tools);
    assert_eq!(config.model.provider, "openai");
    assert!(config.model.retry.is_none());
    assert!(config.agents.is_empty());
    assert!(config.flow.is_none());
}

#[test]
fn test_missing_file_is_config_not_found() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, SwarmError::ConfigNotFound(_)));
}

#[test]
fn test_invalid_toml_is_config_error() {
    let (_dir, path) = write_config("[model\nmodel_id = ");
    let err = AppConfig::load(&path).unwrap_err();
    assert!(matches!(err, SwarmError::Config(_)));
}

#[test]
fn test_configured_flow_parses() {
    let (_dir, path) = write_config(&sample_config());
    let config = AppConfig::load(&path).expect("load config");

    let agents: Vec<Agent> = config.agents.iter().map(Agent::from_config).collect();
    let flow = Flow::parse(config.flow.as_deref().unwrap(), &agents).expect("parse flow");
    assert_eq!(flow.to_string(), "researcher >> writer");
    assert_eq!(flow.agents()[1].max_turns(), Some(2));
}

#[test]
fn test_configured_flow_with_unknown_agent_fails() {
    let (_dir, path) = write_config(&sample_config().replace("researcher >> writer", "researcher >> editor"));
    let config = AppConfig::load(&path).expect("load config");

    let agents: Vec<Agent> = config.agents.iter().map(Agent::from_config).collect();
    let err = Flow::parse(config.flow.as_deref().unwrap(), &agents).unwrap_err();
    assert!(err.to_string().contains("unknown agent 'editor'"));
}
