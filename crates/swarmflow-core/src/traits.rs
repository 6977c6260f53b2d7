use futures::future::BoxFuture;

use crate::error::Result;
use crate::schema::ToolSchema;
use crate::types::{ModelRequest, ModelResponse};

/// Model endpoint: one request, one complete response.
///
/// Timeouts and retries carried on the request are the implementation's
/// responsibility; the engine never retries a call itself.
pub trait ModelClient: Send + Sync + 'static {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>>;
}

/// A callable the model can invoke by name.
pub trait Tool: Send + Sync + 'static {
    /// Declarative schema offered to the model.
    fn schema(&self) -> &ToolSchema;

    /// Tool name (used in model tool calls).
    fn name(&self) -> &str {
        &self.schema().name
    }

    /// Run the tool with named arguments, returning its textual result.
    fn execute(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> BoxFuture<'_, Result<String>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}
