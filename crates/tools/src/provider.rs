//! Tools advertised by an external [`ToolProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use stepwise_core::error::ToolError;
use stepwise_core::message::Message;
use stepwise_core::tool::{Tool, ToolDefinition, ToolInvocation, ToolOutput, ToolProvider};
use tracing::debug;

/// One provider tool. Invocation forwards to the provider by name.
pub struct ProviderTool {
    provider: Arc<dyn ToolProvider>,
    definition: ToolDefinition,
}

impl ProviderTool {
    pub fn new(provider: Arc<dyn ToolProvider>, definition: ToolDefinition) -> Self {
        Self { provider, definition }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

#[async_trait]
impl Tool for ProviderTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.definition.parameters.clone()
    }

    async fn invoke(&self, call: &ToolInvocation, _context: &[Message]) -> Result<ToolOutput, ToolError> {
        debug!(provider = %self.provider.name(), tool = %self.definition.name, "forwarding tool call");
        self.provider.invoke(&self.definition.name, call.arguments.clone()).await
    }

    fn to_definition(&self) -> ToolDefinition {
        self.definition.clone()
    }
}

/// Wrap every tool `provider` lists.
pub async fn provider_tools(provider: Arc<dyn ToolProvider>) -> Result<Vec<Arc<dyn Tool>>, ToolError> {
    let definitions = provider.list_tools().await?;
    Ok(definitions
        .into_iter()
        .map(|definition| Arc::new(ProviderTool::new(provider.clone(), definition)) as Arc<dyn Tool>)
        .collect())
}
