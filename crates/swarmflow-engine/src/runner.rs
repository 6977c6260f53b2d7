use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use swarmflow_core::config::{EngineConfig, ModelPricing};
use swarmflow_core::error::{Result, SwarmError};
use swarmflow_core::event::EventBus;
use swarmflow_core::summary::{extract_summary, StructuredOutput, SUMMARY_INSTRUCTION};
use swarmflow_core::traits::{ModelClient, Tool};
use swarmflow_core::types::*;
use swarmflow_tools::ToolRegistry;

use crate::agent::Agent;

/// Effective settings for one agent invocation: engine defaults with the
/// agent's overrides applied.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub model: String,
    pub max_turns: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub structured_output: bool,
    pub parallel_tools: bool,
    /// Prices for `model`; no pricing means the call is free.
    pub pricing: Option<ModelPricing>,
}

impl RunSettings {
    pub fn resolve(engine: &EngineConfig, default_model: &str, agent: &Agent) -> Self {
        Self {
            model: agent.model().unwrap_or(default_model).to_string(),
            max_turns: agent.max_turns().unwrap_or(engine.max_turns),
            timeout: Duration::from_secs(agent.timeout_secs().unwrap_or(engine.timeout_secs)),
            max_retries: agent.max_retries().unwrap_or(engine.max_retries),
            structured_output: engine.structured_output,
            parallel_tools: engine.parallel_tools,
            pricing: None,
        }
    }

    pub fn with_pricing(mut self, pricing: Option<ModelPricing>) -> Self {
        self.pricing = pricing;
        self
    }
}

/// What the engine hands an agent for one invocation.
#[derive(Clone, Default)]
pub struct AgentTask {
    pub task: String,
    /// Rendered context or pull-mode hint; `None` for the first step.
    pub context: Option<String>,
    /// Run-scoped tools added on top of the agent's own.
    pub extra_tools: Vec<Arc<dyn Tool>>,
    /// Names of the agents whose outputs were in scope.
    pub available_context: Vec<String>,
}

impl AgentTask {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.extra_tools.extend(tools);
        self
    }
}

/// One tool invocation made by an agent.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub arguments: String,
    pub result: String,
    pub is_error: bool,
    pub elapsed_ms: u64,
}

/// Outcome of one agent invocation.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub agent: String,
    pub task: String,
    /// Response with the summary section removed.
    pub output: String,
    pub summary: String,
    pub model: String,
    pub elapsed_ms: u64,
    pub usage: TokenUsage,
    /// USD, from the model's configured pricing.
    pub cost: f64,
    pub llm_calls: usize,
    pub tool_calls: Vec<ToolCallRecord>,
    pub available_context: Vec<String>,
}

impl AgentResult {
    /// Agents whose full output was requested with `get_context`, in first
    /// request order.
    pub fn pulled_context(&self) -> Vec<String> {
        let mut pulled: Vec<String> = Vec::new();
        for call in self.tool_calls.iter().filter(|c| c.tool == "get_context") {
            let name = serde_json::from_str::<serde_json::Value>(&call.arguments)
                .ok()
                .and_then(|v| v.get("agent_name").and_then(|n| n.as_str()).map(String::from));
            if let Some(name) = name {
                if !pulled.contains(&name) {
                    pulled.push(name);
                }
            }
        }
        pulled
    }
}

fn build_system_prompt(instructions: &str, context: Option<&str>, structured: bool) -> String {
    let mut prompt = instructions.to_string();
    if structured {
        prompt.push_str("\n\n");
        prompt.push_str(SUMMARY_INSTRUCTION);
    }
    if let Some(context) = context.filter(|c| !c.is_empty()) {
        prompt.push_str("\n\n# Context from prior agents\n\n");
        prompt.push_str(context);
    }
    prompt
}

/// Runs one agent's tool-calling loop against the model.
pub struct AgentRunner {
    client: Arc<dyn ModelClient>,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
}

impl AgentRunner {
    pub fn new(
        client: Arc<dyn ModelClient>,
        event_bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            event_bus,
            cancel,
        }
    }

    /// Run `agent` to completion.
    ///
    /// Failures come back scoped to the agent via [`SwarmError::Agent`].
    pub async fn run(
        &self,
        agent: &Agent,
        input: AgentTask,
        settings: &RunSettings,
    ) -> Result<AgentResult> {
        let name = agent.name().to_string();
        self.event_bus.publish(SwarmEvent::AgentStarted {
            agent: name.clone(),
            task: input.task.clone(),
        });
        info!(agent = %name, model = %settings.model, "Agent started");

        match self.run_loop(agent, input, settings).await {
            Ok(result) => {
                info!(
                    agent = %name,
                    elapsed_ms = result.elapsed_ms,
                    llm_calls = result.llm_calls,
                    tool_calls = result.tool_calls.len(),
                    total_tokens = result.usage.total_tokens,
                    cost = result.cost,
                    "Agent complete"
                );
                self.event_bus.publish(SwarmEvent::AgentComplete {
                    agent: name,
                    elapsed_ms: result.elapsed_ms,
                    cost: result.cost,
                });
                Ok(result)
            }
            Err(e) => {
                error!(agent = %name, error = %e, "Agent failed");
                self.event_bus.publish(SwarmEvent::AgentFailed {
                    agent: name.clone(),
                    error: e.to_string(),
                });
                Err(e.for_agent(name))
            }
        }
    }

    async fn run_loop(
        &self,
        agent: &Agent,
        input: AgentTask,
        settings: &RunSettings,
    ) -> Result<AgentResult> {
        let start = Instant::now();
        let name = agent.name();

        let registry = agent.tools().with_extra(&input.extra_tools)?;
        let tool_defs = registry.definitions();
        let system_prompt = build_system_prompt(
            agent.instructions(),
            input.context.as_deref(),
            settings.structured_output,
        );

        let mut messages = vec![ChatMessage::user(input.task.clone())];
        let mut usage = TokenUsage::default();
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut llm_calls = 0usize;

        for turn in 0..settings.max_turns {
            if self.cancel.is_cancelled() {
                return Err(SwarmError::Cancelled);
            }

            debug!(agent = %name, turn, "Starting agent turn");

            let request = ModelRequest {
                system_prompt: system_prompt.clone(),
                messages: messages.clone(),
                tools: tool_defs.clone(),
                model: settings.model.clone(),
                timeout: Some(settings.timeout),
                max_retries: Some(settings.max_retries),
            };

            self.event_bus.publish(SwarmEvent::ModelCallStarted {
                agent: name.to_string(),
                call_index: llm_calls,
            });
            let call_start = Instant::now();

            let response = tokio::select! {
                result = self.client.complete(request) => result?,
                _ = self.cancel.cancelled() => return Err(SwarmError::Cancelled),
            };

            usage += response.usage;
            self.event_bus.publish(SwarmEvent::ModelCallComplete {
                agent: name.to_string(),
                call_index: llm_calls,
                stop_reason: response.stop_reason.clone(),
                elapsed_ms: call_start.elapsed().as_millis() as u64,
                usage: response.usage,
            });
            llm_calls += 1;

            if response.tool_calls.is_empty() {
                if response.stop_reason == StopReason::MaxTokens {
                    warn!(agent = %name, "Model hit max tokens");
                }
                let raw = response.text.unwrap_or_default();
                let StructuredOutput { summary, body } = if settings.structured_output {
                    extract_summary(&raw)
                } else {
                    let text = raw.trim().to_string();
                    StructuredOutput {
                        summary: text.clone(),
                        body: text,
                    }
                };

                return Ok(AgentResult {
                    agent: name.to_string(),
                    task: input.task,
                    output: body,
                    summary,
                    model: settings.model.clone(),
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    usage,
                    cost: settings.pricing.map(|p| p.cost(&usage)).unwrap_or(0.0),
                    llm_calls,
                    tool_calls: records,
                    available_context: input.available_context,
                });
            }

            let calls = response.tool_calls;
            messages.push(ChatMessage::assistant_tool_calls(response.text, &calls));

            // Publish all ToolStarted events first so subscribers see them in call order
            for call in &calls {
                self.event_bus.publish(SwarmEvent::ToolStarted {
                    agent: name.to_string(),
                    tool: call.name.clone(),
                    arguments: call.arguments.clone(),
                });
            }

            let outcomes: Vec<(ToolResult, u64)> = if settings.parallel_tools && calls.len() > 1 {
                let futs: Vec<_> = calls
                    .iter()
                    .map(|call| timed_invoke(&registry, call))
                    .collect();
                futures::future::join_all(futs).await
            } else {
                let mut outcomes = Vec::with_capacity(calls.len());
                for call in &calls {
                    outcomes.push(timed_invoke(&registry, call).await);
                }
                outcomes
            };

            for (call, (result, elapsed_ms)) in calls.iter().zip(outcomes) {
                if result.is_error {
                    warn!(agent = %name, tool = %call.name, error = %result.content, "Tool call returned an error");
                }
                self.event_bus.publish(SwarmEvent::ToolComplete {
                    agent: name.to_string(),
                    tool: call.name.clone(),
                    is_error: result.is_error,
                    elapsed_ms,
                });
                messages.push(ChatMessage::tool_result(
                    call.id.clone(),
                    result.content.clone(),
                    result.is_error,
                ));
                records.push(ToolCallRecord {
                    tool: call.name.clone(),
                    arguments: call.arguments.clone(),
                    result: result.content,
                    is_error: result.is_error,
                    elapsed_ms,
                });
            }
        }

        warn!(agent = %name, max_turns = settings.max_turns, "Agent exceeded max turns");
        Err(SwarmError::MaxTurnsExceeded(settings.max_turns))
    }
}

async fn timed_invoke(registry: &ToolRegistry, call: &ToolCallRequest) -> (ToolResult, u64) {
    let start = Instant::now();
    let result = registry.invoke(&call.name, &call.arguments).await;
    (result, start.elapsed().as_millis() as u64)
}
