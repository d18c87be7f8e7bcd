//! Per-step tool call protocol.
//!
//! For one step and its tool: announce intent, optionally gather earlier
//! results as context, let the model decide whether and how to call the tool,
//! run it, and reduce the output to exactly one text or image item.

use std::sync::Arc;

use stepwise_core::error::Error;
use stepwise_core::message::Message;
use stepwise_core::plan::{Plan, Status, Step, Task};
use stepwise_core::storage::StorageBackend;
use stepwise_core::tool::{Tool, ToolContent, ToolDefinition, ToolInvocation, ToolOutput, ToolResult};
use tracing::{debug, warn};

use crate::channel::TaskContext;
use crate::model::LanguageModel;

/// What running one step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub result: ToolResult,
    pub should_act: bool,
    pub input: Option<ToolInvocation>,
    pub tool: Option<ToolDefinition>,
}

impl StepOutcome {
    pub fn failed(message: impl Into<String>, tool: Option<ToolDefinition>) -> Self {
        Self {
            result: ToolResult::error(message),
            should_act: false,
            input: None,
            tool,
        }
    }
}

/// Runs the tool call protocol against the tool model.
#[derive(Clone)]
pub struct ToolCaller {
    model: LanguageModel,
    storage: Arc<dyn StorageBackend>,
    context_budget: usize,
}

impl ToolCaller {
    pub fn new(model: LanguageModel, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            model,
            storage,
            context_budget: 1200,
        }
    }

    /// Maximum characters of one earlier result pulled into context.
    pub fn with_context_budget(mut self, budget: usize) -> Self {
        self.context_budget = budget;
        self
    }

    pub fn model(&self) -> &LanguageModel {
        &self.model
    }

    pub async fn run(
        &self,
        ctx: &mut TaskContext,
        tool: &dyn Tool,
        step: &Step,
        task: &Task,
        plan: &Plan,
    ) -> Result<StepOutcome, Error> {
        let definition = tool.to_definition();
        ctx.tool_use(task, step, None, None).await?;

        let context = if tool.needs_context() {
            self.build_context(step, plan, &definition).await?
        } else {
            Vec::new()
        };

        let call = self.model.tool_call(step, &definition, &context).await?;
        let should_act = call.is_some();
        let input = call.as_ref().map(serde_json::to_value).transpose()?;
        debug!(tool = %definition.name, step_uuid = %step.step_uuid, should_act, context = context.len(), "tool call decision");
        ctx.tool_use(task, step, input, Some(should_act)).await?;

        let result = match &call {
            Some(call) => {
                let output = match tool.invoke(call, &context).await {
                    Ok(output) => output,
                    Err(e) => ToolOutput::error(format!("tool execution error: {e}")),
                };
                let result = sanitize(&definition.name, output);
                ctx.tool_result(task, step, &result).await?;
                result
            }
            None => ToolResult::text(format!(
                "{}: toolCall success, No action needed. task: {}",
                definition.name, step.step_goal
            )),
        };

        Ok(StepOutcome {
            result,
            should_act,
            input: call,
            tool: Some(definition),
        })
    }

    /// Earlier results the model asks for, as assistant messages.
    async fn build_context(&self, step: &Step, plan: &Plan, tool: &ToolDefinition) -> Result<Vec<Message>, Error> {
        let history = history_digest(plan);
        if history.is_empty() {
            return Ok(Vec::new());
        }

        let decision = self.model.tool_context(step, tool, &history).await?;
        if !decision.use_context || decision.references.is_empty() {
            return Ok(Vec::new());
        }

        let mut messages = Vec::new();
        for reference in &decision.references {
            let record = match self.storage.get_tool_result(reference).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(step_uuid = %reference, error = %e, "could not load earlier result");
                    continue;
                }
            };
            let Some(source) = record.tool.as_ref().filter(|_| !record.is_error) else {
                continue;
            };
            messages.push(Message::assistant(format!(
                "Observation:\n*{}* finished with the following result (for the current reasoning):\n{}\n",
                source.name,
                truncate(&record.result, self.context_budget)
            )));
        }
        Ok(messages)
    }
}

/// Goals and step ids of completed tasks.
fn history_digest(plan: &Plan) -> String {
    plan.tasks
        .iter()
        .filter(|t| t.status == Status::Done)
        .map(|task| {
            let steps = task
                .steps
                .iter()
                .map(|s| {
                    format!(
                        "- step: {}\n- step_id: {}\n- result_summary_hint: {}",
                        s.step_goal, s.step_uuid, s.result_summary_hint
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!("- task: {}\n{steps}", task.task_goal)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Reduce raw tool output to exactly one text or image item.
pub fn sanitize(tool: &str, output: ToolOutput) -> ToolResult {
    let invalid = |reason: &str| ToolResult::error(format!("Invalid tool result from {tool}: {reason}"));

    let Some(mut content) = output.content else {
        return invalid("missing content array");
    };
    if content.len() > 1 {
        return invalid("Multi-result tools are not supported.");
    }
    let Some(item) = content.pop() else {
        return invalid("empty content array");
    };
    match item {
        ToolContent::Text { .. } | ToolContent::Image { .. } => ToolResult {
            content: vec![item],
            is_error: output.is_error,
        },
        other => invalid(&format!("unsupported content type {}", content_type(&other))),
    }
}

fn content_type(item: &ToolContent) -> &'static str {
    match item {
        ToolContent::Text { .. } => "text",
        ToolContent::Image { .. } => "image",
        ToolContent::Audio { .. } => "audio",
        ToolContent::Resource { .. } => "resource",
        ToolContent::ResourceLink { .. } => "resource_link",
    }
}
