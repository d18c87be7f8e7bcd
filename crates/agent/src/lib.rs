//! The plan, execute and rethink engine.
//!
//! A run moves through a small state machine:
//!
//! 1. **Plan**: the planner model writes a JSON plan of tasks and steps
//! 2. **Execute**: each step's tool is driven through the tool call protocol
//! 3. **Rethink**: after each task the planner reviews the results and
//!    either finishes, revises the plan, or continues with it
//!
//! A [`Policy`] picks the next phase from a context snapshot and the
//! [`AgentController`] carries it out. Everything the user sees goes out as
//! [`AgentChunk`](stepwise_core::AgentChunk)s on a [`TaskStream`].

pub mod channel;
pub mod controller;
pub mod model;
pub mod parse;
pub mod persist;
pub mod policy;
pub mod prompt;
pub mod service;
pub mod session;
pub mod state_machine;
pub mod tool_actor;
pub mod tool_call;

pub use channel::{TaskContext, TaskStream, channel};
pub use controller::{AgentController, Engine};
pub use model::{ContextDecision, LanguageModel, TextStream, strip_thinking};
pub use parse::{Segment, SegmentKind, TagStreamParser};
pub use policy::{Action, Decision, DefaultPolicy, Policy};
pub use service::{AgentService, AgentSettings, Models, TaskRequest};
pub use session::{HistoryContent, HistoryNode, HistoryResponse, HistoryStep, SessionSummary};
pub use state_machine::StateMachine;
pub use tool_actor::ToolActor;
pub use tool_call::{StepOutcome, ToolCaller};
