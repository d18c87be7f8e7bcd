//! Agent phases and the execution record of a single run.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::plan::{Plan, Step, Task};
use crate::storage::FileMeta;

/// Phase of an agent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    #[default]
    Idle,
    Planning,
    Executing,
    Rethinking,
    Done,
    Error,
}

impl AgentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Done | AgentState::Error)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentState::Idle => "idle",
            AgentState::Planning => "planning",
            AgentState::Executing => "executing",
            AgentState::Rethinking => "rethinking",
            AgentState::Done => "done",
            AgentState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Everything a run knows about itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateContext {
    pub state: AgentState,
    pub plan: Option<Plan>,
    pub current_task: Option<Task>,
    pub current_step: Option<Step>,
    pub user_input: String,
    pub rethink_rounds: u32,
    pub error: Option<AgentError>,
    pub final_answer: Option<String>,
    pub final_attachments: Vec<FileMeta>,
    /// Reasoning text captured from plan and rethink phases.
    pub thinking: String,
}

impl StateContext {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            ..Default::default()
        }
    }

    /// Return a copy with the fields set in `update` overwritten.
    pub fn merged(&self, update: ContextUpdate) -> Self {
        let mut next = self.clone();
        if let Some(plan) = update.plan {
            next.plan = Some(plan);
        }
        if let Some(task) = update.current_task {
            next.current_task = task;
        }
        if let Some(step) = update.current_step {
            next.current_step = step;
        }
        if let Some(rounds) = update.rethink_rounds {
            next.rethink_rounds = rounds;
        }
        if let Some(error) = update.error {
            next.error = Some(error);
        }
        if let Some(answer) = update.final_answer {
            next.final_answer = Some(answer);
        }
        if let Some(attachments) = update.final_attachments {
            next.final_attachments = attachments;
        }
        if let Some(thinking) = update.thinking {
            next.thinking = thinking;
        }
        next
    }
}

/// A partial update to a [`StateContext`]. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    plan: Option<Plan>,
    current_task: Option<Option<Task>>,
    current_step: Option<Option<Step>>,
    rethink_rounds: Option<u32>,
    error: Option<AgentError>,
    final_answer: Option<String>,
    final_attachments: Option<Vec<FileMeta>>,
    thinking: Option<String>,
}

impl ContextUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(mut self, plan: Plan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn current_task(mut self, task: Option<Task>) -> Self {
        self.current_task = Some(task);
        self
    }

    pub fn current_step(mut self, step: Option<Step>) -> Self {
        self.current_step = Some(step);
        self
    }

    pub fn rethink_rounds(mut self, rounds: u32) -> Self {
        self.rethink_rounds = Some(rounds);
        self
    }

    pub fn error(mut self, error: AgentError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn final_answer(mut self, answer: impl Into<String>) -> Self {
        self.final_answer = Some(answer.into());
        self
    }

    pub fn final_attachments(mut self, attachments: Vec<FileMeta>) -> Self {
        self.final_attachments = Some(attachments);
        self
    }

    pub fn thinking(mut self, thinking: impl Into<String>) -> Self {
        self.thinking = Some(thinking.into());
        self
    }
}
