use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use swarmflow_core::config::AppConfig;
use swarmflow_core::types::SwarmEvent;
use swarmflow_engine::{Agent, Flow, Swarm};

#[derive(Parser)]
#[command(name = "swarmflow", version, about = "Run LLM agents as sequential and parallel flows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "swarmflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured flow on a task
    Run {
        /// The task; read from stdin when omitted
        #[arg(trailing_var_arg = true)]
        task: Vec<String>,
        /// Print the full result as JSON instead of the final output
        #[arg(long)]
        json: bool,
        /// Do not print the usage report
        #[arg(long)]
        quiet: bool,
    },
    /// Parse the configured flow and print it
    Validate,
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("swarmflow=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Validate => {
            let agents: Vec<Agent> = config.agents.iter().map(Agent::from_config).collect();
            let text = config
                .flow
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("no flow configured in {}", cli.config.display()))?;
            let flow = Flow::parse(text, &agents)?;
            println!("{}", flow);
            println!(
                "{} steps, {} agents, context mode: {}",
                flow.len(),
                flow.agents().len(),
                config.engine.context_mode
            );
        }
        Commands::Run { task, json, quiet } => {
            let mut text = task.join(" ");
            if text.trim().is_empty() {
                text = io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            if text.trim().is_empty() {
                anyhow::bail!("no task given");
            }

            let client = swarmflow_llm::create_client(&config.model)?;
            let swarm = Swarm::from_config(&config, client)?;
            info!(flow = %swarm.flow(), "Flow loaded");

            // Progress goes to stderr; stdout is reserved for the result
            let printer = tokio::spawn(print_progress(swarm.event_bus().subscribe(), io::stderr()));

            let cancel = swarm.cancel_token();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                warn!("Cancelling run...");
                cancel.cancel();
            });

            let result = match swarm.run(&text).await {
                Ok(result) => {
                    // The printer stops by itself after RunComplete
                    printer.await.ok();
                    result
                }
                Err(e) => {
                    printer.abort();
                    return Err(e.into());
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.output);
                if !quiet {
                    eprintln!("\n{}", result.summary());
                }
            }
        }
    }

    Ok(())
}

/// Write one progress line per agent event until the run completes.
async fn print_progress<W: Write>(mut rx: broadcast::Receiver<SwarmEvent>, mut out: W) -> W {
    while let Ok(event) = rx.recv().await {
        let line = match event {
            SwarmEvent::AgentStarted { agent, .. } => format!("[{}] started", agent),
            SwarmEvent::ToolStarted { agent, tool, .. } => format!("[{}] tool: {}", agent, tool),
            SwarmEvent::AgentComplete {
                agent,
                elapsed_ms,
                cost,
            } => {
                let cost = if cost > 0.0 {
                    format!(" ${:.4}", cost)
                } else {
                    String::new()
                };
                format!("[{}] done in {:.1}s{}", agent, elapsed_ms as f64 / 1000.0, cost)
            }
            SwarmEvent::AgentFailed { agent, error } => format!("[{}] FAILED: {}", agent, error),
            SwarmEvent::RunComplete { .. } => break,
            _ => continue,
        };
        if writeln!(out, "{}", line).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmflow_core::event::EventBus;
    use swarmflow_core::types::TokenUsage;

    #[tokio::test]
    async fn test_progress_drains_until_run_complete() {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        bus.publish(SwarmEvent::AgentStarted {
            agent: "writer".into(),
            task: "t".into(),
        });
        bus.publish(SwarmEvent::AgentComplete {
            agent: "writer".into(),
            elapsed_ms: 1500,
            cost: 0.0892,
        });
        bus.publish(SwarmEvent::RunComplete {
            elapsed_ms: 1500,
            agent_count: 1,
            usage: TokenUsage::default(),
            total_cost: 0.0892,
        });

        let out = print_progress(rx, Vec::new()).await;
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "[writer] started\n[writer] done in 1.5s $0.0892\n");
    }
}
