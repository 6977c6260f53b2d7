pub mod context;

pub use context::{context_tools, expand_tool, is_reserved_tool_name, ContextHandle, RESERVED_TOOL_NAMES};
