//! Owner of a run's [`StateContext`].
//!
//! A plain register with observers. It never checks whether a transition is
//! legal; that is the policy's job.

use std::collections::HashMap;

use stepwise_core::state::{AgentState, ContextUpdate, StateContext};
use tracing::debug;

pub type Listener = Box<dyn Fn(&StateContext) + Send + Sync>;

#[derive(Default)]
pub struct StateMachine {
    context: StateContext,
    listeners: HashMap<AgentState, Vec<Listener>>,
}

impl StateMachine {
    pub fn new(context: StateContext) -> Self {
        Self {
            context,
            listeners: HashMap::new(),
        }
    }

    pub fn state(&self) -> AgentState {
        self.context.state
    }

    /// A snapshot. Later updates do not show through it.
    pub fn context(&self) -> StateContext {
        self.context.clone()
    }

    pub fn update(&mut self, update: ContextUpdate) {
        self.context = self.context.merged(update);
    }

    /// Merge `update`, set `state`, then notify that state's listeners.
    pub fn transition(&mut self, state: AgentState, update: Option<ContextUpdate>) {
        if let Some(update) = update {
            self.update(update);
        }
        let from = self.context.state;
        self.context.state = state;
        debug!(%from, to = %state, "state transition");

        if let Some(listeners) = self.listeners.get(&state) {
            for listener in listeners {
                listener(&self.context);
            }
        }
    }

    /// Start over in `Idle` with a fresh context for `user_input`.
    pub fn reset(&mut self, user_input: &str) {
        self.context = StateContext::new(user_input);
    }

    /// Call `listener` every time the machine enters `state`.
    pub fn on(&mut self, state: AgentState, listener: impl Fn(&StateContext) + Send + Sync + 'static) {
        self.listeners.entry(state).or_default().push(Box::new(listener));
    }
}
