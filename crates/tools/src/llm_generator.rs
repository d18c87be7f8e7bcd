//! Text generation tool backed by the language model.
//!
//! Writing, summarizing and translating steps route here. Earlier step
//! results chosen for the step arrive as context messages ahead of the task.

use std::sync::Arc;

use async_trait::async_trait;
use stepwise_core::error::ToolError;
use stepwise_core::message::Message;
use stepwise_core::provider::TextGenerator;
use stepwise_core::tool::{Tool, ToolInvocation, ToolOutput};
use tracing::debug;

pub struct LlmGeneratorTool {
    generator: Arc<dyn TextGenerator>,
}

impl LlmGeneratorTool {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Tool for LlmGeneratorTool {
    fn name(&self) -> &str {
        "llm_generator"
    }

    fn description(&self) -> &str {
        "Use the language model to write natural language: generate, summarize, rewrite \
         or translate text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "What to write"
                }
            },
            "required": ["task"]
        })
    }

    fn needs_context(&self) -> bool {
        true
    }

    async fn invoke(&self, call: &ToolInvocation, context: &[Message]) -> Result<ToolOutput, ToolError> {
        let Some(task) = call.arguments["task"].as_str() else {
            return Ok(ToolOutput::error("Missing required argument: task"));
        };

        let mut messages = context.to_vec();
        messages.push(Message::user(task));
        debug!(model = %self.generator.model(), context = context.len(), "generating text");

        let text = self
            .generator
            .generate(messages)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(ToolOutput::text(text))
    }
}
