use chrono::{DateTime, Utc};
use serde::Serialize;

use swarmflow_core::context::SharedContext;
use swarmflow_core::types::TokenUsage;

use crate::runner::AgentResult;

/// Outcome of one [`Swarm::run`](crate::Swarm::run).
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub task: String,
    /// Output of the last agent in history: the final step, or the last agent
    /// of the last declared branch when the flow ends in a group.
    pub output: String,
    pub context: SharedContext,
    /// Agent results in declared step and branch order.
    pub history: Vec<AgentResult>,
    pub elapsed_ms: u64,
    pub usage: TokenUsage,
    /// Sum of the per-agent costs, in USD.
    pub total_cost: f64,
}

const HEADERS: [&str; 7] = ["Agent", "Calls", "Tools", "Prompt", "Completion", "Total", "Time"];

impl RunResult {
    pub fn agent(&self, name: &str) -> Option<&AgentResult> {
        self.history.iter().find(|r| r.agent == name)
    }

    /// Per-agent token usage table with a `TOTAL` row. A `Cost` column is
    /// added when any agent has a non-zero cost. Empty for an empty history.
    pub fn token_usage_table(&self) -> String {
        if self.history.is_empty() {
            return String::new();
        }
        let with_cost = self.history.iter().any(|r| r.cost > 0.0);

        let mut rows: Vec<Vec<String>> = self
            .history
            .iter()
            .map(|r| {
                let mut row = vec![
                    r.agent.clone(),
                    r.llm_calls.to_string(),
                    r.tool_calls.len().to_string(),
                    thousands(r.usage.prompt_tokens),
                    thousands(r.usage.completion_tokens),
                    thousands(r.usage.total_tokens),
                    seconds(r.elapsed_ms),
                ];
                if with_cost {
                    row.push(dollars(r.cost));
                }
                row
            })
            .collect();
        let mut total = vec![
            "TOTAL".to_string(),
            self.history.iter().map(|r| r.llm_calls).sum::<usize>().to_string(),
            self.history.iter().map(|r| r.tool_calls.len()).sum::<usize>().to_string(),
            thousands(self.usage.prompt_tokens),
            thousands(self.usage.completion_tokens),
            thousands(self.usage.total_tokens),
            seconds(self.elapsed_ms),
        ];

        let mut header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        if with_cost {
            header.push("Cost".to_string());
            total.push(dollars(self.total_cost));
        }

        let mut widths = vec![0usize; header.len()];
        for row in std::iter::once(&header).chain(rows.iter()).chain(std::iter::once(&total)) {
            for (w, cell) in widths.iter_mut().zip(row.iter()) {
                *w = (*w).max(cell.chars().count());
            }
        }
        let rule = "-".repeat(widths.iter().sum::<usize>() + 2 * (widths.len() - 1));

        let mut lines = vec![format_row(&header, &widths), rule.clone()];
        lines.extend(rows.drain(..).map(|row| format_row(&row, &widths)));
        lines.push(rule);
        lines.push(format_row(&total, &widths));
        lines.join("\n")
    }

    /// Which prior outputs each agent fetched with `get_context`.
    ///
    /// One line per agent that had prior outputs in scope and pulled at
    /// least one of them. Empty when nobody pulled.
    pub fn context_pull_report(&self) -> String {
        let mut lines = Vec::new();
        for result in &self.history {
            let available = &result.available_context;
            if available.is_empty() {
                continue;
            }
            let pulled: Vec<String> = result
                .pulled_context()
                .into_iter()
                .filter(|name| available.contains(name))
                .collect();
            if pulled.is_empty() {
                continue;
            }

            let n = available.len();
            if pulled.len() == n {
                lines.push(format!("{}: PULLED ALL ({}/{})", result.agent, n, n));
            } else {
                let skipped: Vec<&str> = available
                    .iter()
                    .filter(|name| !pulled.contains(name))
                    .map(String::as_str)
                    .collect();
                lines.push(format!(
                    "{}: SELECTIVE ({}/{}, skipped: {})",
                    result.agent,
                    pulled.len(),
                    n,
                    skipped.join(", ")
                ));
            }
        }
        lines.join("\n")
    }

    /// Usage table and, when any agent pulled context, the pull report.
    pub fn summary(&self) -> String {
        if self.history.is_empty() {
            return String::new();
        }
        let mut out = format!("Token Usage\n{}", self.token_usage_table());
        let pulls = self.context_pull_report();
        if !pulls.is_empty() {
            out.push_str("\n\nContext Pull Analysis\n");
            out.push_str(&pulls);
        }
        out
    }
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths.iter())
        .enumerate()
        .map(|(i, (cell, &w))| {
            if i == 0 {
                format!("{:<w$}", cell, w = w)
            } else {
                format!("{:>w$}", cell, w = w)
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}

fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn seconds(ms: u64) -> String {
    format!("{:.1}s", ms as f64 / 1000.0)
}

fn dollars(cost: f64) -> String {
    format!("${:.4}", cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ToolCallRecord;

    fn agent_result(name: &str, tokens: u64, available: &[&str], pulls: &[&str]) -> AgentResult {
        costed_result(name, tokens, 0.0, available, pulls)
    }

    fn costed_result(
        name: &str,
        tokens: u64,
        cost: f64,
        available: &[&str],
        pulls: &[&str],
    ) -> AgentResult {
        AgentResult {
            agent: name.to_string(),
            task: "test task".into(),
            output: format!("output from {}", name),
            summary: format!("output from {}", name),
            model: "test-model".into(),
            elapsed_ms: 1000,
            usage: TokenUsage::new(tokens / 2, tokens - tokens / 2),
            cost,
            llm_calls: 1,
            tool_calls: pulls
                .iter()
                .map(|p| ToolCallRecord {
                    tool: "get_context".into(),
                    arguments: format!(r#"{{"agent_name":"{}"}}"#, p),
                    result: "...".into(),
                    is_error: false,
                    elapsed_ms: 1,
                })
                .collect(),
            available_context: available.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn run_result(history: Vec<AgentResult>) -> RunResult {
        let usage = history.iter().map(|r| r.usage).sum();
        let total_cost = history.iter().map(|r| r.cost).sum();
        RunResult {
            run_id: "run".into(),
            started_at: Utc::now(),
            task: "test task".into(),
            output: history.last().map(|r| r.output.clone()).unwrap_or_default(),
            context: SharedContext::new(),
            history,
            elapsed_ms: 8000,
            usage,
            total_cost,
        }
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_token_usage_table() {
        let result = run_result(vec![
            agent_result("researcher", 1000, &[], &[]),
            agent_result("very_long_agent_name", 2000, &["researcher"], &[]),
        ]);
        let table = result.token_usage_table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("Agent"));
        assert!(lines[5].starts_with("TOTAL"));
        assert!(table.contains("1,000"));
        assert!(table.contains("2,000"));
        assert!(table.contains("3,000"));

        let width = lines[0].chars().count();
        assert!(lines.iter().all(|l| l.chars().count() == width));
        assert!(!table.contains("Cost"));
        assert!(!table.contains('$'));
    }

    #[test]
    fn test_token_usage_table_with_cost() {
        let result = run_result(vec![
            costed_result("fusion_physicist", 4727, 0.0892, &[], &[]),
            costed_result("grid_engineer", 3891, 0.0734, &["fusion_physicist"], &[]),
        ]);
        assert!((result.total_cost - 0.1626).abs() < 1e-9);

        let table = result.token_usage_table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].ends_with("Cost"));
        assert!(table.contains("$0.0892"));
        assert!(table.contains("$0.0734"));
        assert!(lines[5].ends_with("$0.1626"));

        let width = lines[0].chars().count();
        assert!(lines.iter().all(|l| l.chars().count() == width));
    }

    #[test]
    fn test_cost_column_rounds_to_four_places() {
        let result = run_result(vec![
            costed_result("agent_a", 500, 0.0001, &[], &[]),
            costed_result("agent_b", 1500, 1.2345, &[], &[]),
        ]);
        let table = result.token_usage_table();
        assert!(table.contains("$0.0001"));
        assert!(table.contains("$1.2345"));
        assert!(table.contains("$1.2346"));
    }

    #[test]
    fn test_empty_history() {
        let result = run_result(vec![]);
        assert_eq!(result.token_usage_table(), "");
        assert_eq!(result.context_pull_report(), "");
        assert_eq!(result.summary(), "");
    }

    #[test]
    fn test_pull_report_selective_and_all() {
        let result = run_result(vec![
            agent_result("a", 100, &[], &[]),
            agent_result("b", 100, &["a"], &[]),
            agent_result("c", 100, &["a", "b"], &[]),
            agent_result("d", 100, &["a", "b", "c"], &["a", "b"]),
            agent_result("e", 100, &["a", "b", "c", "d"], &["a", "b", "c", "d"]),
        ]);
        let report = result.context_pull_report();
        assert_eq!(
            report,
            "d: SELECTIVE (2/3, skipped: c)\ne: PULLED ALL (4/4)"
        );
    }

    #[test]
    fn test_pull_report_ignores_agents_without_prior_context() {
        let result = run_result(vec![
            agent_result("a", 100, &[], &["ghost"]),
            agent_result("b", 100, &["a"], &[]),
        ]);
        assert_eq!(result.context_pull_report(), "");
    }

    #[test]
    fn test_summary_sections() {
        let with_pulls = run_result(vec![
            agent_result("a", 100, &[], &[]),
            agent_result("b", 100, &["a"], &["a"]),
        ]);
        let text = with_pulls.summary();
        assert!(text.starts_with("Token Usage\n"));
        assert!(text.contains("Context Pull Analysis\nb: PULLED ALL (1/1)"));

        let without = run_result(vec![
            agent_result("a", 100, &[], &[]),
            agent_result("b", 100, &["a"], &[]),
        ]);
        assert!(without.summary().contains("Token Usage"));
        assert!(!without.summary().contains("Context Pull Analysis"));
    }

    #[test]
    fn test_serializes_to_json() {
        let result = run_result(vec![agent_result("a", 10, &[], &[])]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["output"], "output from a");
        assert_eq!(json["history"][0]["usage"]["total_tokens"], 10);
    }
}
