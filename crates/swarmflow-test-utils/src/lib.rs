//! Shared test fixtures: a scripted model client and config helpers.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use swarmflow_core::error::{Result, SwarmError};
use swarmflow_core::traits::ModelClient;
use swarmflow_core::types::{ModelRequest, ModelResponse, ToolCallRequest};

/// Build a tool-call request with raw JSON arguments.
pub fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
    ToolCallRequest::new(id, name, arguments)
}

/// Build a tool-call request from a JSON value.
pub fn tool_call_json(id: &str, name: &str, arguments: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, arguments.to_string())
}

struct Script {
    prefix: String,
    responses: VecDeque<ModelResponse>,
}

/// A [`ModelClient`] that replays canned responses and records every request.
///
/// Responses are picked in this order:
/// 1. the script whose prefix the system prompt starts with (agent
///    instructions come first in the system prompt, so a prefix selects an
///    agent)
/// 2. the shared queue
/// 3. the repeating response, if any
///
/// When nothing is left the call fails with a `ModelRequest` error.
pub struct ScriptedClient {
    queue: Mutex<VecDeque<ModelResponse>>,
    scripts: Mutex<Vec<Script>>,
    delays: Vec<(String, Duration)>,
    repeat: Option<ModelResponse>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            queue: Mutex::new(responses.into()),
            scripts: Mutex::new(Vec::new()),
            delays: Vec::new(),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same response.
    pub fn repeating(response: ModelResponse) -> Self {
        let mut client = Self::new(Vec::new());
        client.repeat = Some(response);
        client
    }

    /// Responses for the agent whose instructions start with `prefix`.
    pub fn script(self, prefix: impl Into<String>, responses: Vec<ModelResponse>) -> Self {
        self.scripts.lock().unwrap().push(Script {
            prefix: prefix.into(),
            responses: responses.into(),
        });
        self
    }

    /// Delay answers for the agent whose instructions start with `prefix`.
    pub fn delay(mut self, prefix: impl Into<String>, delay: Duration) -> Self {
        self.delays.push((prefix.into(), delay));
        self
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose system prompt starts with `prefix`.
    pub fn requests_for(&self, prefix: &str) -> Vec<ModelRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.system_prompt.starts_with(prefix))
            .collect()
    }

    fn next_response(&self, system_prompt: &str) -> Option<ModelResponse> {
        {
            let mut scripts = self.scripts.lock().unwrap();
            if let Some(script) = scripts
                .iter_mut()
                .find(|s| system_prompt.starts_with(&s.prefix))
            {
                return script.responses.pop_front().or_else(|| self.repeat.clone());
            }
        }
        let queued = self.queue.lock().unwrap().pop_front();
        queued.or_else(|| self.repeat.clone())
    }
}

impl ModelClient for ScriptedClient {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>> {
        Box::pin(async move {
            let delay = self
                .delays
                .iter()
                .find(|(prefix, _)| request.system_prompt.starts_with(prefix.as_str()))
                .map(|(_, d)| *d);

            let response = self.next_response(&request.system_prompt);
            self.requests.lock().unwrap().push(request);

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            response.ok_or_else(|| SwarmError::ModelRequest("no scripted response left".into()))
        })
    }
}

/// Write `contents` to a `swarmflow.toml` inside a fresh temp dir.
///
/// Keep the returned dir alive for as long as the file is needed.
pub fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("swarmflow.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

/// A minimal valid config with two agents and a flow.
pub fn sample_config() -> String {
    r#"
flow = "researcher >> writer"

[engine]
context_mode = "push"
max_turns = 4

[model]
provider = "openai"
model_id = "gpt-4o-mini"

[[agents]]
name = "researcher"
instructions = "You research the topic."

[[agents]]
name = "writer"
instructions = "You write the final report."
max_turns = 2
"#
    .to_string()
}

/// Parse a config fixture without touching the filesystem.
pub fn parse_config(contents: &str) -> swarmflow_core::config::AppConfig {
    toml::from_str(contents).unwrap()
}
