//! Flow composition.
//!
//! A [`Flow`] is an immutable, validated sequence of [`Step`]s. A step is a
//! single agent or a parallel group of branches; each branch is its own
//! sub-chain of steps.
//!
//! Flows are built three ways:
//!
//! - explicitly, with [`sequential`] and [`parallel`]
//! - with operators on agents, then [`FlowExpr::build`]
//! - from text, with [`Flow::parse`]
//!
//! # Operators
//!
//! `>>` chains and `|` runs side by side. Rust gives `>>` a higher precedence
//! than `|`, so
//!
//! ```text
//! a >> b | c >> d      ==  (a >> b) | (c >> d)     one group, two branches
//! a >> (b | c) >> d    ==  a >> [b, c] >> d
//! ```
//!
//! Embedding a group inside a longer chain needs parentheses. Nested groups
//! directly inside a group are flattened: `(a | b) | c` is one group of three.
//!
//! Operators only build a [`FlowExpr`]; validation (at least two branches per
//! group, unique agent names, no empty chains) happens in `build`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{BitOr, Shr};
use std::sync::Arc;

use swarmflow_core::error::{Result, SwarmError};

use crate::agent::Agent;

/// One unit of a flow.
#[derive(Debug, Clone)]
pub enum Step {
    Single(Arc<Agent>),
    /// Branches run concurrently on the same context snapshot.
    Group(Vec<Branch>),
}

/// A sub-chain inside a parallel group.
#[derive(Debug, Clone)]
pub struct Branch {
    steps: Vec<Step>,
}

impl Branch {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// A validated execution graph.
#[derive(Debug, Clone)]
pub struct Flow {
    steps: Vec<Step>,
}

/// An unvalidated flow under composition.
#[derive(Debug, Clone)]
pub enum FlowExpr {
    Agent(Arc<Agent>),
    Seq(Vec<FlowExpr>),
    Par(Vec<FlowExpr>),
}

impl FlowExpr {
    fn then(self, next: FlowExpr) -> FlowExpr {
        let mut items = match self {
            FlowExpr::Seq(items) => items,
            other => vec![other],
        };
        match next {
            FlowExpr::Seq(more) => items.extend(more),
            other => items.push(other),
        }
        FlowExpr::Seq(items)
    }

    fn alongside(self, other: FlowExpr) -> FlowExpr {
        let mut items = match self {
            FlowExpr::Par(items) => items,
            single => vec![single],
        };
        match other {
            FlowExpr::Par(more) => items.extend(more),
            single => items.push(single),
        }
        FlowExpr::Par(items)
    }

    /// Validate and freeze.
    pub fn build(self) -> Result<Flow> {
        Flow::from_steps(lower(self)?)
    }
}

fn lower(expr: FlowExpr) -> Result<Vec<Step>> {
    match expr {
        FlowExpr::Agent(agent) => Ok(vec![Step::Single(agent)]),
        FlowExpr::Seq(items) => {
            if items.is_empty() {
                return Err(SwarmError::Construction(
                    "sequential() requires at least one step".into(),
                ));
            }
            let mut steps = Vec::with_capacity(items.len());
            for item in items {
                steps.extend(lower(item)?);
            }
            Ok(steps)
        }
        FlowExpr::Par(items) => {
            let items = flatten_par(items);
            if items.len() < 2 {
                return Err(SwarmError::Construction(format!(
                    "parallel() requires at least 2 branches, got {}",
                    items.len()
                )));
            }
            let branches = items
                .into_iter()
                .map(|item| lower(item).map(|steps| Branch { steps }))
                .collect::<Result<Vec<_>>>()?;
            Ok(vec![Step::Group(branches)])
        }
    }
}

fn flatten_par(items: Vec<FlowExpr>) -> Vec<FlowExpr> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match collapse(item) {
            FlowExpr::Par(inner) => out.extend(flatten_par(inner)),
            other => out.push(other),
        }
    }
    out
}

/// Unwrap single-element chains so `parallel` sees through them.
fn collapse(expr: FlowExpr) -> FlowExpr {
    match expr {
        FlowExpr::Seq(mut items) if items.len() == 1 => collapse(items.remove(0)),
        other => other,
    }
}

fn step_expr(step: Step) -> FlowExpr {
    match step {
        Step::Single(agent) => FlowExpr::Agent(agent),
        Step::Group(branches) => FlowExpr::Par(
            branches
                .into_iter()
                .map(|b| FlowExpr::Seq(b.steps.into_iter().map(step_expr).collect()))
                .collect(),
        ),
    }
}

impl From<Agent> for FlowExpr {
    fn from(agent: Agent) -> Self {
        FlowExpr::Agent(Arc::new(agent))
    }
}

impl From<&Agent> for FlowExpr {
    fn from(agent: &Agent) -> Self {
        FlowExpr::Agent(Arc::new(agent.clone()))
    }
}

impl From<Arc<Agent>> for FlowExpr {
    fn from(agent: Arc<Agent>) -> Self {
        FlowExpr::Agent(agent)
    }
}

impl From<&Arc<Agent>> for FlowExpr {
    fn from(agent: &Arc<Agent>) -> Self {
        FlowExpr::Agent(Arc::clone(agent))
    }
}

impl From<Flow> for FlowExpr {
    fn from(flow: Flow) -> Self {
        FlowExpr::Seq(flow.steps.into_iter().map(step_expr).collect())
    }
}

impl From<&Flow> for FlowExpr {
    fn from(flow: &Flow) -> Self {
        FlowExpr::from(flow.clone())
    }
}

macro_rules! flow_operators {
    ($($lhs:ty),+) => {$(
        impl<R: Into<FlowExpr>> Shr<R> for $lhs {
            type Output = FlowExpr;

            fn shr(self, rhs: R) -> FlowExpr {
                FlowExpr::from(self).then(rhs.into())
            }
        }

        impl<R: Into<FlowExpr>> BitOr<R> for $lhs {
            type Output = FlowExpr;

            fn bitor(self, rhs: R) -> FlowExpr {
                FlowExpr::from(self).alongside(rhs.into())
            }
        }
    )+};
}

flow_operators!(Agent, FlowExpr, Flow);

impl<'a, R: Into<FlowExpr>> Shr<R> for &'a Agent {
    type Output = FlowExpr;

    fn shr(self, rhs: R) -> FlowExpr {
        FlowExpr::from(self).then(rhs.into())
    }
}

impl<'a, R: Into<FlowExpr>> BitOr<R> for &'a Agent {
    type Output = FlowExpr;

    fn bitor(self, rhs: R) -> FlowExpr {
        FlowExpr::from(self).alongside(rhs.into())
    }
}

/// Chain items one after another.
pub fn sequential<I, T>(items: I) -> Result<Flow>
where
    I: IntoIterator<Item = T>,
    T: Into<FlowExpr>,
{
    FlowExpr::Seq(items.into_iter().map(Into::into).collect()).build()
}

/// Run items side by side as one group. Each item becomes one branch.
pub fn parallel<I, T>(items: I) -> Result<Flow>
where
    I: IntoIterator<Item = T>,
    T: Into<FlowExpr>,
{
    FlowExpr::Par(items.into_iter().map(Into::into).collect()).build()
}

impl Flow {
    fn from_steps(steps: Vec<Step>) -> Result<Self> {
        if steps.is_empty() {
            return Err(SwarmError::Construction("flow has no steps".into()));
        }
        let flow = Self { steps };

        let mut seen = HashSet::new();
        for agent in flow.agents() {
            if !seen.insert(agent.name().to_string()) {
                return Err(SwarmError::Construction(format!(
                    "duplicate agent name '{}'",
                    agent.name()
                )));
            }
        }
        Ok(flow)
    }

    /// Parse text notation against a set of agents.
    ///
    /// `a >> [b, c] >> d` runs `a`, then `b` and `c` concurrently, then `d`.
    /// A group member may itself be a chain: `[b >> c, d]`.
    pub fn parse(text: &str, agents: &[Agent]) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(SwarmError::Construction("flow string cannot be empty".into()));
        }

        let mut by_name: HashMap<&str, Arc<Agent>> = HashMap::with_capacity(agents.len());
        for agent in agents {
            if by_name.insert(agent.name(), Arc::new(agent.clone())).is_some() {
                return Err(SwarmError::Construction(format!(
                    "agent '{}' is defined more than once",
                    agent.name()
                )));
            }
        }
        let resolve = |name: &str| -> Result<Step> {
            match by_name.get(name) {
                Some(agent) => Ok(Step::Single(Arc::clone(agent))),
                None => {
                    let mut available: Vec<&str> = by_name.keys().copied().collect();
                    available.sort_unstable();
                    Err(SwarmError::Construction(format!(
                        "flow references unknown agent '{}'. Available agents: {}",
                        name,
                        available.join(", ")
                    )))
                }
            }
        };

        let mut steps = Vec::new();
        for token in split_top_level(text) {
            let token = token.trim();
            if token.is_empty() {
                return Err(empty_step());
            }

            match token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
                Some(inner) => {
                    if inner.contains('[') || inner.contains(']') {
                        return Err(malformed(token));
                    }
                    let members: Vec<&str> = inner
                        .split(',')
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .collect();
                    if members.is_empty() {
                        return Err(SwarmError::Construction(
                            "flow contains an empty parallel group '[]'".into(),
                        ));
                    }
                    if members.len() < 2 {
                        return Err(SwarmError::Construction(format!(
                            "parallel group '{}' needs at least 2 members",
                            token
                        )));
                    }

                    let mut branches = Vec::with_capacity(members.len());
                    for member in members {
                        let mut chain = Vec::new();
                        for name in member.split(">>").map(str::trim) {
                            if name.is_empty() {
                                return Err(empty_step());
                            }
                            chain.push(resolve(name)?);
                        }
                        branches.push(Branch { steps: chain });
                    }
                    steps.push(Step::Group(branches));
                }
                None => {
                    if token.contains('[') || token.contains(']') {
                        return Err(malformed(token));
                    }
                    steps.push(resolve(token)?);
                }
            }
        }

        Self::from_steps(steps)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of top-level steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All agents in step order, branches in declared order.
    pub fn agents(&self) -> Vec<Arc<Agent>> {
        let mut out = Vec::new();
        collect_agents(&self.steps, &mut out);
        out
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents().iter().map(|a| a.name().to_string()).collect()
    }
}

fn collect_agents(steps: &[Step], out: &mut Vec<Arc<Agent>>) {
    for step in steps {
        match step {
            Step::Single(agent) => out.push(Arc::clone(agent)),
            Step::Group(branches) => {
                for branch in branches {
                    collect_agents(&branch.steps, out);
                }
            }
        }
    }
}

/// Split on `>>` outside brackets.
fn split_top_level(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            b'>' if depth == 0 && bytes.get(i + 1) == Some(&b'>') => {
                parts.push(&text[start..i]);
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

fn empty_step() -> SwarmError {
    SwarmError::Construction("flow contains an empty step (consecutive '>>')".into())
}

fn malformed(token: &str) -> SwarmError {
    SwarmError::Construction(format!("malformed parallel group in flow: '{}'", token))
}

fn fmt_steps(steps: &[Step], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, step) in steps.iter().enumerate() {
        if i > 0 {
            f.write_str(" >> ")?;
        }
        match step {
            Step::Single(agent) => f.write_str(agent.name())?,
            Step::Group(branches) => {
                f.write_str("[")?;
                for (j, branch) in branches.iter().enumerate() {
                    if j > 0 {
                        f.write_str(", ")?;
                    }
                    fmt_steps(&branch.steps, f)?;
                }
                f.write_str("]")?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_steps(&self.steps, f)
    }
}
