pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod schema;
pub mod summary;
pub mod traits;
pub mod types;

pub use config::{AppConfig, ContextMode};
pub use context::{ContextEntry, SearchHit, SharedContext};
pub use error::{Result, SwarmError};
pub use event::EventBus;
pub use schema::{ParamType, SchemaType, ToolParam, ToolSchema};
pub use summary::{extract_summary, StructuredOutput};
pub use traits::{ModelClient, Tool};
pub use types::*;
