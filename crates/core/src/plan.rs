//! Plan / Task / Step model.
//!
//! The planner emits a plan as JSON; identities (`task_uuid`, `step_uuid`,
//! `result_file_id`) are owned by the agent and attached right after parsing.
//! Replanning rounds merge the model's revised tail with the work already done.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Execution status shared by tasks and steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Done,
    Error,
}

impl Status {
    pub fn is_pending(self) -> bool {
        self == Status::Pending
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Done => "done",
            Status::Error => "error",
        };
        f.write_str(s)
    }
}

/// The smallest dispatchable unit, bound to exactly one tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub step_id: String,

    #[serde(default)]
    pub step_uuid: String,

    #[serde(default)]
    pub step_goal: String,

    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub tool_name: String,

    /// Planning prompts call this `result_file`.
    #[serde(default, alias = "result_file")]
    pub result_file_name: String,

    #[serde(default)]
    pub result_summary_hint: String,

    #[serde(default)]
    pub result_file_id: Option<String>,
}

/// A group of steps with no result dependency on each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub task_id: String,

    #[serde(default)]
    pub task_uuid: String,

    #[serde(default)]
    pub task_goal: String,

    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Task {
    /// First step still waiting to run.
    pub fn next_pending_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.status.is_pending())
    }

    pub fn has_pending_step(&self) -> bool {
        self.next_pending_step().is_some()
    }

    /// Aggregate status once every step has run: `error` if any step failed.
    /// Returns `None` while steps are still pending.
    pub fn settled_status(&self) -> Option<Status> {
        if self.has_pending_step() {
            return None;
        }
        if self.steps.iter().any(|s| s.status == Status::Error) {
            Some(Status::Error)
        } else {
            Some(Status::Done)
        }
    }
}

/// The full ordered list of tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn next_pending_task(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status.is_pending())
    }

    /// Replace the task with the same uuid. Returns false if none matched.
    pub fn replace_task(&mut self, task: Task) -> bool {
        match self.tasks.iter_mut().find(|t| t.task_uuid == task.task_uuid) {
            Some(slot) => {
                *slot = task;
                true
            }
            None => false,
        }
    }

    /// Assign identities to every task and step that lacks one.
    ///
    /// Anything that does not parse as a UUID counts as missing, so model
    /// placeholders such as `"uuid"` are replaced. Calling this again on the
    /// same plan changes nothing.
    pub fn attach_identities(&mut self) {
        for task in &mut self.tasks {
            if !is_identity(&task.task_uuid) {
                task.task_uuid = fresh_id();
                task.status = Status::Pending;
            }
            for step in &mut task.steps {
                if !is_identity(&step.step_uuid) {
                    step.step_uuid = fresh_id();
                    step.status = Status::Pending;
                }
                if !step.result_file_id.as_deref().is_some_and(is_identity) {
                    step.result_file_id = Some(fresh_id());
                }
            }
        }
    }

    /// Merge a revised plan into this one.
    ///
    /// Executed tasks (status not pending) are kept verbatim, in order, at the
    /// front. Incoming tasks follow. An incoming task that echoes an executed
    /// task's uuid is dropped, since the executed version is authoritative.
    /// Identities the model supplied are kept; only duplicates within the
    /// merged plan get fresh ones. Finally, identities are attached.
    pub fn reconcile(&self, incoming: Plan) -> Plan {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| !t.status.is_pending())
            .cloned()
            .collect();

        let executed: HashSet<String> = tasks.iter().map(|t| t.task_uuid.clone()).collect();
        let mut seen_tasks = executed.clone();
        let mut seen_steps: HashSet<String> = tasks
            .iter()
            .flat_map(|t| t.steps.iter().map(|s| s.step_uuid.clone()))
            .collect();

        for mut task in incoming.tasks {
            if is_identity(&task.task_uuid) && executed.contains(&task.task_uuid) {
                continue;
            }
            if is_identity(&task.task_uuid) && !seen_tasks.insert(task.task_uuid.clone()) {
                task.task_uuid = fresh_id();
                seen_tasks.insert(task.task_uuid.clone());
            }
            for step in &mut task.steps {
                if is_identity(&step.step_uuid) && !seen_steps.insert(step.step_uuid.clone()) {
                    step.step_uuid = fresh_id();
                    seen_steps.insert(step.step_uuid.clone());
                }
            }
            tasks.push(task);
        }

        let mut merged = Plan { tasks };
        merged.attach_identities();
        merged
    }
}

fn is_identity(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}
