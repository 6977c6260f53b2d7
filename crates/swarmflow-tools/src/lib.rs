pub mod bridge;
pub mod builtin;
pub mod registry;

pub use bridge::{function_to_schema, DeclaredParam, FunctionTool, Signature, ToolArgs};
pub use builtin::{context_tools, expand_tool, is_reserved_tool_name, ContextHandle};
pub use registry::ToolRegistry;
