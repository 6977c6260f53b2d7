use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::{try_join_all, BoxFuture};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use swarmflow_core::config::{AppConfig, ContextMode, EngineConfig, ModelPricing};
use swarmflow_core::context::{ContextEntry, SharedContext};
use swarmflow_core::error::{Result, SwarmError};
use swarmflow_core::event::EventBus;
use swarmflow_core::traits::ModelClient;
use swarmflow_core::types::{SwarmEvent, TokenUsage};
use swarmflow_tools::{context_tools, expand_tool, ContextHandle};

use crate::agent::Agent;
use crate::flow::{Flow, Step};
use crate::result::RunResult;
use crate::runner::{AgentResult, AgentRunner, AgentTask, RunSettings};

/// Executes a [`Flow`] against a model client.
///
/// Each call to [`Swarm::run`] starts from an empty context; nothing carries
/// over between runs.
pub struct Swarm {
    flow: Flow,
    client: Arc<dyn ModelClient>,
    config: EngineConfig,
    default_model: String,
    pricing: BTreeMap<String, ModelPricing>,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
}

impl Swarm {
    pub fn new(flow: Flow, client: Arc<dyn ModelClient>) -> Self {
        Self {
            flow,
            client,
            config: EngineConfig::default(),
            default_model: String::new(),
            pricing: BTreeMap::new(),
            event_bus: Arc::new(EventBus::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Build agents and flow from a loaded config.
    pub fn from_config(config: &AppConfig, client: Arc<dyn ModelClient>) -> Result<Self> {
        let agents: Vec<Agent> = config.agents.iter().map(Agent::from_config).collect();
        let text = config
            .flow
            .as_deref()
            .ok_or_else(|| SwarmError::Construction("no flow configured".into()))?;
        let flow = Flow::parse(text, &agents)?;

        let mut swarm = Self::new(flow, client)
            .with_config(config.engine.clone())
            .default_model(config.model.model_id.clone());
        swarm.pricing = config.model.pricing.clone();
        Ok(swarm)
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn context_mode(mut self, mode: ContextMode) -> Self {
        self.config.context_mode = mode;
        self
    }

    /// Model used by agents that do not name one.
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Token prices for `model`, used to fill in each agent's cost.
    pub fn with_pricing(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.pricing.insert(model.into(), pricing);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// Token that aborts in-flight and future runs when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the flow on `task`.
    ///
    /// Steps run in declared order. A parallel group runs its branches
    /// concurrently on a snapshot taken before the group; results are
    /// committed in declared branch order once every branch has finished.
    /// The first agent failure aborts the run and cancels sibling branches.
    pub async fn run(&self, task: &str) -> Result<RunResult> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();

        info!(
            run_id = %run_id,
            steps = self.flow.len(),
            mode = %self.config.context_mode,
            "Run started"
        );
        self.event_bus.publish(SwarmEvent::RunStarted {
            task: task.to_string(),
            step_count: self.flow.len(),
        });

        let runner = AgentRunner::new(
            self.client.clone(),
            self.event_bus.clone(),
            self.cancel.clone(),
        );
        let mut context = SharedContext::new();
        // Agents of the step just committed; their outputs render in full
        let mut recent: Vec<String> = Vec::new();
        let mut history: Vec<AgentResult> = Vec::new();

        for (index, step) in self.flow.steps().iter().enumerate() {
            self.event_bus.publish(SwarmEvent::StepStarted {
                index,
                agents: step_agents(step),
                parallel: matches!(step, Step::Group(_)),
            });

            let results = self
                .run_step(&runner, step, task, index, &mut context, &mut recent)
                .await?;
            history.extend(results);

            self.event_bus.publish(SwarmEvent::StepComplete { index });
        }

        let usage: TokenUsage = history.iter().map(|r| r.usage).sum();
        let total_cost: f64 = history.iter().map(|r| r.cost).sum();
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let output = history.last().map(|r| r.output.clone()).unwrap_or_default();

        info!(
            run_id = %run_id,
            elapsed_ms,
            agents = history.len(),
            total_tokens = usage.total_tokens,
            total_cost,
            "Run complete"
        );
        self.event_bus.publish(SwarmEvent::RunComplete {
            elapsed_ms,
            agent_count: history.len(),
            usage,
            total_cost,
        });

        Ok(RunResult {
            run_id,
            started_at,
            task: task.to_string(),
            output,
            context,
            history,
            elapsed_ms,
            usage,
            total_cost,
        })
    }

    /// Run one step and commit its results to `context`.
    ///
    /// On return `recent` names the agents whose outputs the next step sees
    /// in full: the agent itself, or the last agent of every branch.
    async fn run_step(
        &self,
        runner: &AgentRunner,
        step: &Step,
        task: &str,
        index: usize,
        context: &mut SharedContext,
        recent: &mut Vec<String>,
    ) -> Result<Vec<AgentResult>> {
        match step {
            Step::Single(agent) => {
                let result = self
                    .run_agent(runner, agent, task, &*context, recent.as_slice())
                    .await?;
                context.set(entry_for(&result, index));
                *recent = vec![result.agent.clone()];
                Ok(vec![result])
            }
            Step::Group(branches) => {
                debug!(step = index, branches = branches.len(), "Running parallel group");
                let snapshot = context.clone();
                let predecessors = recent.clone();
                let futs = branches.iter().map(|branch| {
                    self.run_branch(
                        runner,
                        branch.steps(),
                        task,
                        index,
                        snapshot.clone(),
                        predecessors.clone(),
                    )
                });

                // Fan-in: nothing is committed until every branch succeeded
                let mut results = Vec::new();
                let mut tails = Vec::new();
                for (branch_results, tail) in try_join_all(futs).await? {
                    for result in branch_results {
                        context.set(entry_for(&result, index));
                        results.push(result);
                    }
                    tails.extend(tail);
                }
                *recent = tails;
                Ok(results)
            }
        }
    }

    /// Run one branch sub-chain on its own overlay of the group snapshot.
    ///
    /// Returns the branch's results and the agents of its last step.
    fn run_branch<'a>(
        &'a self,
        runner: &'a AgentRunner,
        steps: &'a [Step],
        task: &'a str,
        index: usize,
        mut overlay: SharedContext,
        mut recent: Vec<String>,
    ) -> BoxFuture<'a, Result<(Vec<AgentResult>, Vec<String>)>> {
        Box::pin(async move {
            let mut results = Vec::new();
            for step in steps {
                let step_results = self
                    .run_step(runner, step, task, index, &mut overlay, &mut recent)
                    .await?;
                results.extend(step_results);
            }
            Ok((results, recent))
        })
    }

    async fn run_agent(
        &self,
        runner: &AgentRunner,
        agent: &Agent,
        task: &str,
        context: &SharedContext,
        recent: &[String],
    ) -> Result<AgentResult> {
        let settings = RunSettings::resolve(&self.config, &self.default_model, agent);
        let pricing = self.pricing.get(&settings.model).copied();
        let settings = settings.with_pricing(pricing);
        let mut input = AgentTask::new(task);

        if !context.is_empty() {
            input.available_context = context.names().into_iter().map(String::from).collect();
            let handle = ContextHandle::new(Arc::new(context.clone()));
            input = match self.config.context_mode {
                ContextMode::Push => {
                    let input = input.with_context(context.render(recent));
                    if context.has_summarized(recent) {
                        input.with_tools(vec![expand_tool(handle)])
                    } else {
                        input
                    }
                }
                ContextMode::Pull => input
                    .with_context(context.hint())
                    .with_tools(context_tools(handle)),
            };
        }

        runner.run(agent, input, &settings).await
    }
}

fn entry_for(result: &AgentResult, step: usize) -> ContextEntry {
    ContextEntry::new(result.agent.clone(), result.output.clone())
        .with_summary(result.summary.clone())
        .at_step(step)
}

fn step_agents(step: &Step) -> Vec<String> {
    match step {
        Step::Single(agent) => vec![agent.name().to_string()],
        Step::Group(branches) => branches
            .iter()
            .flat_map(|b| b.steps().iter().flat_map(step_agents))
            .collect(),
    }
}
