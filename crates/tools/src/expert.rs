//! Specialist writers: the language model under a fixed system prompt.
//!
//! `code_expert` answers with source code only, `writing_expert` with
//! finished prose. Both see the earlier results chosen for the step as
//! context, between their system prompt and the task.

use std::sync::Arc;

use async_trait::async_trait;
use stepwise_core::error::ToolError;
use stepwise_core::message::Message;
use stepwise_core::provider::TextGenerator;
use stepwise_core::tool::{Tool, ToolInvocation, ToolOutput};
use tracing::debug;

const CODE_PROMPT: &str = "\
You are a code expert tool built on a general-purpose language model.
Your only job is to produce correct, high-quality source code.

Output rules:
- Output only code. No explanations, markdown or code fences.
- Do not restate the problem or describe your reasoning.

Behaviour:
- Assume the input gives enough context. Where details are missing, make reasonable \
engineering assumptions and encode them in the code.
- Prefer clear structure, idiomatic style and explicit error handling.
- Use the language the task asks for. Default to TypeScript.
- If the request is not a programming task, output nothing.";

const WRITING_PROMPT: &str = "\
You are a professional writing expert tool built on a general-purpose language model.
Your only job is to produce high-quality written content: clear structure, the right \
tone for the audience, and consistent style.

Rules:
- Match the genre (email, article, report, proposal, copy, fiction) and the tone the \
task implies.
- When rewriting, keep the original meaning unless asked to change it.
- Do not write source code unless the task explicitly asks for a snippet.
- If the request is mainly a programming task, answer only: \
\"This request is outside the scope of the writing expert tool.\"
- Output only the finished text, with no analysis or commentary.";

pub struct ExpertTool {
    name: &'static str,
    description: &'static str,
    system_prompt: &'static str,
    generator: Arc<dyn TextGenerator>,
}

impl ExpertTool {
    pub fn code(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            name: "code_expert",
            description: "A software engineering specialist: implements, debugs and refactors \
                          code and sketches system designs. Not for prose or copywriting.",
            system_prompt: CODE_PROMPT,
            generator,
        }
    }

    pub fn writing(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            name: "writing_expert",
            description: "A writing specialist for emails, articles, reports, copy and \
                          polishing existing text. Not for programming or technical design.",
            system_prompt: WRITING_PROMPT,
            generator,
        }
    }
}

#[async_trait]
impl Tool for ExpertTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task description"
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

        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(Message::system(self.system_prompt));
        messages.extend_from_slice(context);
        messages.push(Message::user(task));
        debug!(tool = self.name, model = %self.generator.model(), context = context.len(), "expert request");

        let text = self
            .generator
            .generate(messages)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(ToolOutput::text(text))
    }
}
