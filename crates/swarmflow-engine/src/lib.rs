pub mod agent;
pub mod engine;
pub mod flow;
pub mod result;
pub mod runner;

pub use agent::Agent;
pub use engine::Swarm;
pub use flow::{parallel, sequential, Branch, Flow, FlowExpr, Step};
pub use result::RunResult;
pub use runner::{AgentResult, AgentRunner, AgentTask, RunSettings, ToolCallRecord};
