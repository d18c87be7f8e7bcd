//! The tool registry and dispatcher.
//!
//! Holds an ordered list of tools, each enabled or disabled for the planner,
//! and routes a plan step to its tool through the [`ToolCaller`] protocol.
//! Whatever goes wrong inside a tool comes back as an error result; only a
//! closed or cancelled output channel escapes.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use futures::FutureExt;
use stepwise_core::error::{AgentError, Error, ToolError};
use stepwise_core::plan::{Plan, Status, Step, Task};
use stepwise_core::tool::{Tool, ToolDefinition, ToolProvider};
use tracing::{info, warn};

use crate::channel::TaskContext;
use crate::prompt;
use crate::tool_call::{StepOutcome, ToolCaller};

struct ToolEntry {
    tool: Arc<dyn Tool>,
    enabled: bool,
    /// Name of the provider the tool came from, if any.
    provider: Option<String>,
}

/// Registry of tools available to plan steps.
#[derive(Default)]
pub struct ToolActor {
    entries: RwLock<Vec<ToolEntry>>,
}

impl ToolActor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        let actor = Self::new();
        actor.add_tools(tools);
        actor
    }

    /// Register a tool. Replaces any tool with the same name in place.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.insert(tool, None);
    }

    pub fn add_tools(&self, tools: Vec<Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    /// Register every tool an external provider advertises.
    pub async fn add_provider(&self, provider: Arc<dyn ToolProvider>) -> Result<usize, ToolError> {
        let name = provider.name().to_string();
        let tools = stepwise_tools::provider_tools(provider).await?;
        let count = tools.len();
        for tool in tools {
            self.insert(tool, Some(name.clone()));
        }
        info!(provider = %name, tools = count, "tool provider added");
        Ok(count)
    }

    /// Drop every tool that came from `provider`. Returns how many went.
    pub fn remove_provider(&self, provider: &str) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|e| e.provider.as_deref() != Some(provider));
        before - entries.len()
    }

    pub fn remove_tool(&self, name: &str) -> bool {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|e| e.tool.name() != name);
        before != entries.len()
    }

    /// Advertise a tool to the planner again.
    pub fn enable(&self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    /// Stop advertising a tool. It stays registered and callable.
    pub fn disable(&self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    /// Names and descriptions of enabled tools, formatted for prompts.
    pub fn list_descriptions(&self) -> String {
        let entries = self.read();
        prompt::tool_descriptions(
            entries
                .iter()
                .filter(|e| e.enabled)
                .map(|e| (e.tool.name(), e.tool.description())),
        )
    }

    /// Definitions of enabled tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.read()
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.tool.to_definition())
            .collect()
    }

    /// All registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.read().iter().map(|e| e.tool.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.read()
            .iter()
            .find(|e| e.tool.name() == name)
            .map(|e| Arc::clone(&e.tool))
    }

    /// Run `step` through its tool and mark it `done` or `error`.
    ///
    /// This is the only place a step leaves `pending`.
    pub async fn execute(
        &self,
        ctx: &mut TaskContext,
        caller: &ToolCaller,
        step: &mut Step,
        task: &Task,
        plan: &Plan,
    ) -> Result<StepOutcome, AgentError> {
        let started = Instant::now();
        let outcome = match self.get(&step.tool_name) {
            None => StepOutcome::failed(ToolError::NotFound(step.tool_name.clone()).to_string(), None),
            Some(tool) => {
                let run = AssertUnwindSafe(caller.run(ctx, tool.as_ref(), step, task, plan))
                    .catch_unwind()
                    .await;
                match run {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(Error::Agent(e @ (AgentError::Cancelled | AgentError::StreamClosed)))) => {
                        return Err(e);
                    }
                    Ok(Err(e)) => {
                        StepOutcome::failed(format!("tool execution error: {e}"), Some(tool.to_definition()))
                    }
                    Err(panic) => StepOutcome::failed(
                        format!("tool execution error: {}", panic_message(panic.as_ref())),
                        Some(tool.to_definition()),
                    ),
                }
            }
        };

        step.status = if outcome.result.is_error {
            Status::Error
        } else {
            Status::Done
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if outcome.result.is_error {
            warn!(tool = %step.tool_name, step_uuid = %step.step_uuid, duration_ms, "step failed");
        } else {
            info!(tool = %step.tool_name, step_uuid = %step.step_uuid, duration_ms, should_act = outcome.should_act, "step done");
        }
        Ok(outcome)
    }

    fn insert(&self, tool: Arc<dyn Tool>, provider: Option<String>) {
        let mut entries = self.write();
        let entry = ToolEntry {
            tool,
            enabled: true,
            provider,
        };
        match entries.iter_mut().find(|e| e.tool.name() == entry.tool.name()) {
            Some(slot) => *slot = entry,
            None => entries.push(entry),
        }
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.write().iter_mut().find(|e| e.tool.name() == name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ToolEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ToolEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}
