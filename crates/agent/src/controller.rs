//! The main loop of a run.
//!
//! Each iteration reads a context snapshot, asks the policy for the next
//! phase, announces it, transitions, and runs the phase's handler. Planning
//! and rethinking share one pipeline: prompt, streamed completion, tag
//! parsing, JSON extraction. The loop ends in `Done` or `Error`, after which
//! the answer (or the error message) goes out as a final text block.

use std::sync::Arc;

use stepwise_core::error::{AgentError, Error};
use stepwise_core::message::Message;
use stepwise_core::plan::{Plan, Status, Task};
use stepwise_core::protocol::StopReason;
use stepwise_core::state::{AgentState, ContextUpdate, StateContext};
use stepwise_core::storage::{FileMeta, StorageBackend};
use tracing::{debug, info, trace, warn};

use crate::channel::TaskContext;
use crate::model::{LanguageModel, extract_json};
use crate::parse::{Segment, SegmentKind, TagStreamParser};
use crate::persist::persist_result;
use crate::policy::{Action, Policy};
use crate::prompt;
use crate::service::TaskRequest;
use crate::session;
use crate::state_machine::StateMachine;
use crate::tool_actor::ToolActor;
use crate::tool_call::ToolCaller;

const FALLBACK_ANSWER: &str = "Task completed";
const FALLBACK_ERROR: &str = "agent task failed";

/// Shared components a controller runs against.
#[derive(Clone)]
pub struct Engine {
    pub tools: Arc<ToolActor>,
    pub policy: Arc<dyn Policy>,
    pub planner: LanguageModel,
    pub caller: ToolCaller,
    pub storage: Arc<dyn StorageBackend>,
}

/// Runs one request. Create one per request; it is consumed by `execute`.
pub struct AgentController {
    engine: Engine,
    machine: StateMachine,
    ctx: TaskContext,
    request: TaskRequest,
}

/// Sections collected from one planning or rethinking completion.
#[derive(Debug, Default)]
struct Sections {
    thinking: String,
    plan: String,
    status: String,
    final_text: String,
}

impl AgentController {
    pub fn new(engine: Engine, ctx: TaskContext, request: TaskRequest) -> Self {
        Self {
            engine,
            machine: StateMachine::default(),
            ctx,
            request,
        }
    }

    /// Mutable access to the state machine, to register listeners.
    pub fn state_machine(&mut self) -> &mut StateMachine {
        &mut self.machine
    }

    /// Run to completion and return the final context.
    pub async fn execute(mut self) -> StateContext {
        self.machine.reset(&self.request.input);
        info!(message_id = %self.ctx.message_id(), "task started");

        if let Err(e) = self.run().await {
            info!(error = %e, "task stopped");
            self.machine
                .transition(AgentState::Error, Some(ContextUpdate::new().error(e)));
            self.ctx.abort();
            return self.machine.context();
        }

        let context = self.machine.context();
        let (answer, stop_reason) = if context.state == AgentState::Error {
            let message = context
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| FALLBACK_ERROR.to_string());
            (message, StopReason::Error)
        } else {
            let answer = context
                .final_answer
                .clone()
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| FALLBACK_ANSWER.to_string());
            (answer, StopReason::Success)
        };

        if let Err(e) = self.finish(&answer, stop_reason, &context).await {
            warn!(error = %e, "could not deliver final answer");
        }
        info!(state = %context.state, rethink_rounds = context.rethink_rounds, "task finished");
        context
    }

    async fn run(&mut self) -> Result<(), AgentError> {
        self.ctx.start().await?;
        loop {
            if self.ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let context = self.machine.context();
            let decision = self.engine.policy.decide(&context);
            debug!(state = %context.state, next = %decision.next_state, action = ?decision.action, "policy decision");

            self.ctx.status(decision.next_state).await?;
            let update = decision.error.map(|e| ContextUpdate::new().error(e));
            self.machine.transition(decision.next_state, update);

            let handled = match decision.action {
                Some(Action::Plan) => self.handle_planning().await,
                Some(Action::ExecuteStep) => self.handle_execution().await,
                Some(Action::Rethink) => self.handle_rethinking().await,
                None => Ok(()),
            };

            if let Err(e) = handled {
                match AgentError::from(e) {
                    e @ (AgentError::Cancelled | AgentError::StreamClosed) => return Err(e),
                    e => {
                        warn!(error = %e, "run failed");
                        self.ctx.status(AgentState::Error).await?;
                        self.machine
                            .transition(AgentState::Error, Some(ContextUpdate::new().error(e)));
                    }
                }
            }

            if self.machine.state().is_terminal() {
                return Ok(());
            }
        }
    }

    async fn finish(&mut self, answer: &str, stop_reason: StopReason, context: &StateContext) -> Result<(), AgentError> {
        self.ctx.text(answer).await?;
        self.ctx.close_block().await?;

        if let Some(session_id) = &self.request.session_id {
            let saved = session::save_history(
                self.engine.storage.as_ref(),
                session_id,
                self.ctx.parent(),
                self.ctx.message_id(),
                context,
            )
            .await;
            if let Err(e) = saved {
                warn!(session_id = %session_id, error = %e, "could not save session history");
            }
        }

        self.ctx.finish(stop_reason).await
    }

    async fn handle_planning(&mut self) -> Result<(), Error> {
        let context = self.machine.context();
        let tools = self.engine.tools.list_descriptions();
        let messages = vec![
            Message::system(prompt::PLAN_SYSTEM),
            Message::user(prompt::plan_user(&context.user_input, &tools)),
        ];

        let sections = self.generate(messages).await?;
        self.record_thinking(&sections.thinking);

        if sections.plan.trim().is_empty() {
            self.machine
                .update(ContextUpdate::new().error(AgentError::EmptyPlan("Failed to generate plan".into())));
            return Ok(());
        }

        let mut plan = parse_plan(&sections.plan)?;
        if plan.is_empty() {
            self.machine
                .update(ContextUpdate::new().error(AgentError::EmptyPlan("plan contains no tasks".into())));
            return Ok(());
        }
        plan.attach_identities();
        info!(tasks = plan.tasks.len(), "plan ready");

        let first = plan.next_pending_task().cloned();
        self.machine
            .update(ContextUpdate::new().plan(plan).current_task(first));
        Ok(())
    }

    async fn handle_execution(&mut self) -> Result<(), Error> {
        let context = self.machine.context();
        let (Some(mut plan), Some(mut task)) = (context.plan, context.current_task) else {
            self.machine
                .update(ContextUpdate::new().error(AgentError::EmptyPlan("No plan or task to execute".into())));
            return Ok(());
        };
        let Some(index) = task.steps.iter().position(|s| s.status.is_pending()) else {
            // nothing to run, e.g. a task planned without steps
            self.ctx.task_start(&task).await?;
            self.settle(&mut task).await?;
            plan.replace_task(task.clone());
            self.machine
                .update(ContextUpdate::new().plan(plan).current_task(Some(task)));
            return Ok(());
        };
        if index == 0 {
            self.ctx.task_start(&task).await?;
        }

        let mut step = task.steps[index].clone();
        let model = self.engine.caller.model();
        model.reload().await?;
        let executed = self
            .engine
            .tools
            .execute(&mut self.ctx, &self.engine.caller, &mut step, &task, &plan)
            .await;
        let unloaded = model.unload().await;
        let outcome = executed?;
        unloaded?;

        persist_result(self.engine.storage.as_ref(), &outcome, &step, &task.task_uuid).await?;
        task.steps[index] = step.clone();
        if !task.has_pending_step() {
            self.settle(&mut task).await?;
        }

        plan.replace_task(task.clone());
        self.machine.update(
            ContextUpdate::new()
                .plan(plan)
                .current_task(Some(task))
                .current_step(Some(step)),
        );
        Ok(())
    }

    /// Fold step statuses into the task status and close its block.
    async fn settle(&mut self, task: &mut Task) -> Result<(), Error> {
        let status = task.settled_status().unwrap_or(Status::Error);
        task.status = status;
        info!(task_uuid = %task.task_uuid, %status, "task settled");
        self.ctx.task_status(task).await?;
        self.ctx.close_block().await?;
        Ok(())
    }

    async fn handle_rethinking(&mut self) -> Result<(), Error> {
        let context = self.machine.context();
        let (Some(plan), Some(task)) = (context.plan, context.current_task) else {
            return Ok(());
        };

        let memo = self.tool_memo(&task).await;
        let messages = vec![
            Message::system(prompt::RETHINK_SYSTEM),
            Message::user(prompt::rethink_user(
                &context.user_input,
                &serde_json::to_string_pretty(&task)?,
                &memo,
                &serde_json::to_string_pretty(&plan)?,
            )),
        ];

        let sections = self.generate(messages).await?;
        self.record_thinking(&sections.thinking);
        let rounds = context.rethink_rounds + 1;

        match sections.status.trim() {
            "done" => {
                let answer = sections.final_text.trim();
                let answer = if answer.is_empty() { FALLBACK_ANSWER } else { answer };
                let attachments = self.resolve_attachments(answer).await;
                debug!(attachments = attachments.len(), "final answer ready");
                self.machine.update(
                    ContextUpdate::new()
                        .final_answer(answer)
                        .final_attachments(attachments),
                );
            }
            "changed" => {
                let incoming = parse_plan(&sections.plan)?;
                let merged = plan.reconcile(incoming);
                let next = merged.next_pending_task().cloned();
                info!(tasks = merged.tasks.len(), rounds, "plan revised");
                self.machine.update(
                    ContextUpdate::new()
                        .plan(merged)
                        .current_task(next)
                        .rethink_rounds(rounds),
                );
            }
            "continue" => {
                let next = plan.next_pending_task().cloned();
                self.machine
                    .update(ContextUpdate::new().current_task(next).rethink_rounds(rounds));
            }
            other => {
                return Err(AgentError::MalformedResponse(format!("unknown rethink status: {other:?}")).into());
            }
        }
        Ok(())
    }

    /// Stream a planner completion through the tag parser. Thinking goes
    /// out as it arrives; structured sections are collected.
    async fn generate(&mut self, messages: Vec<Message>) -> Result<Sections, Error> {
        let planner = self.engine.planner.clone();
        planner.reload().await?;
        let mut stream = planner.ask_stream(messages).await?;
        let cancel = self.ctx.cancellation_token();
        let mut parser = TagStreamParser::new();
        let mut sections = Sections::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled.into()),
                next = stream.next() => next,
            };
            let Some(delta) = next else { break };
            for segment in parser.push(&delta?) {
                self.route(segment, &mut sections).await?;
            }
        }
        for segment in parser.finish() {
            self.route(segment, &mut sections).await?;
        }
        drop(stream);

        self.ctx.close_block().await?;
        planner.unload().await?;
        debug!(
            thinking = sections.thinking.len(),
            plan = sections.plan.len(),
            status = %sections.status.trim(),
            "completion parsed"
        );
        Ok(sections)
    }

    async fn route(&mut self, segment: Segment, sections: &mut Sections) -> Result<(), AgentError> {
        let target = match segment.kind {
            SegmentKind::Thinking => {
                self.ctx.thinking(&segment.text).await?;
                sections.thinking.push_str(&segment.text);
                return Ok(());
            }
            SegmentKind::Content => {
                trace!(text = %segment.text, "untagged output ignored");
                return Ok(());
            }
            SegmentKind::Plan => &mut sections.plan,
            SegmentKind::Status => &mut sections.status,
            SegmentKind::Final => &mut sections.final_text,
        };
        target.push_str(&segment.text);
        // thinking is over once structured output starts
        self.ctx.close_block().await
    }

    fn record_thinking(&mut self, thinking: &str) {
        if thinking.is_empty() {
            return;
        }
        let mut all = self.machine.context().thinking;
        all.push_str(thinking);
        self.machine.update(ContextUpdate::new().thinking(all));
    }

    /// Digest of the current task's persisted results for the rethink prompt.
    async fn tool_memo(&self, task: &Task) -> String {
        let mut memo = String::new();
        for step in &task.steps {
            let record = match self.engine.storage.get_tool_result(&step.step_uuid).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(step_uuid = %step.step_uuid, error = %e, "could not load tool result");
                    continue;
                }
            };
            memo.push_str(&format!(
                "- step_id: {}\n- step_goal: {}\n- result:\n{}\n- file_id: {}\n\n",
                record.id,
                record.step_goal,
                record.result,
                record.file_id.as_deref().unwrap_or("none"),
            ));
        }
        if memo.is_empty() {
            "No tool result memory".to_string()
        } else {
            memo
        }
    }

    async fn resolve_attachments(&self, answer: &str) -> Vec<FileMeta> {
        let mut attachments = Vec::new();
        for id in file_ids(answer) {
            match self.engine.storage.get_file(&id).await {
                Ok(Some(file)) => attachments.push(file.meta()),
                Ok(None) => debug!(file_id = %id, "final answer references unknown file"),
                Err(e) => warn!(file_id = %id, error = %e, "could not load attachment"),
            }
        }
        attachments
    }
}

fn parse_plan(text: &str) -> Result<Plan, AgentError> {
    serde_json::from_str(extract_json(text))
        .map_err(|e| AgentError::MalformedResponse(format!("plan is not valid JSON: {e}")))
}

/// Ids inside `<file>...</file>` markers, comma lists split, first occurrence kept.
fn file_ids(text: &str) -> Vec<String> {
    const OPEN: &str = "<file>";
    const CLOSE: &str = "</file>";

    let mut ids: Vec<String> = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else { break };
        for id in after[..end].split(',').map(str::trim).filter(|id| !id.is_empty()) {
            if !ids.iter().any(|known| known == id) {
                ids.push(id.to_string());
            }
        }
        rest = &after[end + CLOSE.len()..];
    }
    ids
}
