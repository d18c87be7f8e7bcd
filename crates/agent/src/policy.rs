//! Phase selection.
//!
//! A policy looks at a context snapshot and names the next phase and the
//! handler to run in it. It performs no I/O and keeps no state, so the same
//! snapshot always yields the same decision.

use stepwise_core::error::AgentError;
use stepwise_core::state::{AgentState, StateContext};

/// Handler the controller runs after transitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Plan,
    ExecuteStep,
    Rethink,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub next_state: AgentState,
    pub action: Option<Action>,
    /// Set when the decision is a failure the context does not record yet.
    pub error: Option<AgentError>,
}

impl Decision {
    fn go(next_state: AgentState, action: Action) -> Self {
        Self {
            next_state,
            action: Some(action),
            error: None,
        }
    }

    fn stay(next_state: AgentState) -> Self {
        Self {
            next_state,
            action: None,
            error: None,
        }
    }

    fn fail(error: Option<AgentError>) -> Self {
        Self {
            next_state: AgentState::Error,
            action: None,
            error,
        }
    }
}

pub trait Policy: Send + Sync {
    fn decide(&self, context: &StateContext) -> Decision;
}

/// The plan, execute and rethink table with a ceiling on rethink rounds.
#[derive(Debug, Clone)]
pub struct DefaultPolicy {
    max_rethink_rounds: u32,
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self { max_rethink_rounds: 10 }
    }
}

impl DefaultPolicy {
    pub fn new(max_rethink_rounds: u32) -> Self {
        Self { max_rethink_rounds }
    }

    pub fn max_rethink_rounds(&self) -> u32 {
        self.max_rethink_rounds
    }
}

impl Policy for DefaultPolicy {
    fn decide(&self, context: &StateContext) -> Decision {
        match context.state {
            AgentState::Idle => Decision::go(AgentState::Planning, Action::Plan),

            AgentState::Planning => {
                if context.error.is_some() {
                    return Decision::fail(None);
                }
                match &context.plan {
                    Some(plan) if !plan.is_empty() => Decision::go(AgentState::Executing, Action::ExecuteStep),
                    _ => Decision::fail(Some(AgentError::EmptyPlan("Failed to generate plan".into()))),
                }
            }

            AgentState::Executing => match &context.current_task {
                None if context.error.is_some() => Decision::fail(None),
                None => Decision::fail(Some(AgentError::EmptyPlan("No plan or task to execute".into()))),
                Some(task) if task.has_pending_step() => {
                    Decision::go(AgentState::Executing, Action::ExecuteStep)
                }
                Some(_) => Decision::go(AgentState::Rethinking, Action::Rethink),
            },

            AgentState::Rethinking => {
                if context.rethink_rounds >= self.max_rethink_rounds {
                    return Decision::fail(Some(AgentError::MaxRethinkReached {
                        rounds: self.max_rethink_rounds,
                    }));
                }
                if context.final_answer.is_some() {
                    return Decision::stay(AgentState::Done);
                }
                let pending = context
                    .plan
                    .as_ref()
                    .is_some_and(|plan| plan.next_pending_task().is_some());
                if pending {
                    Decision::go(AgentState::Executing, Action::ExecuteStep)
                } else {
                    // nothing left to run and no answer: finish with the fallback text
                    Decision::stay(AgentState::Done)
                }
            }

            state @ (AgentState::Done | AgentState::Error) => Decision::stay(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::plan::{Plan, Status, Step, Task};
    use stepwise_core::state::ContextUpdate;

    fn task(step_statuses: &[Status], status: Status) -> Task {
        Task {
            status,
            steps: step_statuses
                .iter()
                .map(|s| Step {
                    status: *s,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn in_state(state: AgentState) -> StateContext {
        StateContext {
            state,
            ..StateContext::new("goal")
        }
    }

    #[test]
    fn idle_always_plans() {
        let d = DefaultPolicy::default().decide(&in_state(AgentState::Idle));
        assert_eq!(d, Decision::go(AgentState::Planning, Action::Plan));
    }

    #[test]
    fn planning_rows() {
        let policy = DefaultPolicy::default();

        let d = policy.decide(&in_state(AgentState::Planning));
        assert_eq!(d.next_state, AgentState::Error);
        assert!(matches!(d.error, Some(AgentError::EmptyPlan(_))));

        let empty = in_state(AgentState::Planning).merged(ContextUpdate::new().plan(Plan::default()));
        assert_eq!(policy.decide(&empty).next_state, AgentState::Error);

        let plan = Plan {
            tasks: vec![task(&[Status::Pending], Status::Pending)],
        };
        let ok = in_state(AgentState::Planning).merged(ContextUpdate::new().plan(plan.clone()));
        assert_eq!(policy.decide(&ok), Decision::go(AgentState::Executing, Action::ExecuteStep));

        let errored = ok.merged(ContextUpdate::new().error(AgentError::EmptyPlan("x".into())));
        let d = policy.decide(&errored);
        assert_eq!(d.next_state, AgentState::Error);
        // the context already carries the reason
        assert!(d.error.is_none());
    }

    #[test]
    fn executing_rows() {
        let policy = DefaultPolicy::default();

        let d = policy.decide(&in_state(AgentState::Executing));
        assert_eq!(d.next_state, AgentState::Error);

        let pending = in_state(AgentState::Executing).merged(
            ContextUpdate::new().current_task(Some(task(&[Status::Done, Status::Pending], Status::Pending))),
        );
        assert_eq!(policy.decide(&pending), Decision::go(AgentState::Executing, Action::ExecuteStep));

        let finished = in_state(AgentState::Executing).merged(
            ContextUpdate::new().current_task(Some(task(&[Status::Done, Status::Error], Status::Error))),
        );
        assert_eq!(policy.decide(&finished), Decision::go(AgentState::Rethinking, Action::Rethink));
    }

    #[test]
    fn rethinking_rows() {
        let policy = DefaultPolicy::new(3);
        let plan = Plan {
            tasks: vec![
                task(&[Status::Done], Status::Done),
                task(&[Status::Pending], Status::Pending),
            ],
        };
        let base = in_state(AgentState::Rethinking).merged(ContextUpdate::new().plan(plan));

        assert_eq!(policy.decide(&base), Decision::go(AgentState::Executing, Action::ExecuteStep));

        let answered = base.merged(ContextUpdate::new().final_answer("4"));
        assert_eq!(policy.decide(&answered), Decision::stay(AgentState::Done));

        // the ceiling wins over everything else
        let exhausted = answered.merged(ContextUpdate::new().rethink_rounds(3));
        let d = policy.decide(&exhausted);
        assert_eq!(d.next_state, AgentState::Error);
        assert_eq!(d.error, Some(AgentError::MaxRethinkReached { rounds: 3 }));

        let nothing_left = in_state(AgentState::Rethinking).merged(ContextUpdate::new().plan(Plan {
            tasks: vec![task(&[Status::Done], Status::Done)],
        }));
        assert_eq!(policy.decide(&nothing_left), Decision::stay(AgentState::Done));
    }

    #[test]
    fn terminal_states_stay() {
        let policy = DefaultPolicy::default();
        for state in [AgentState::Done, AgentState::Error] {
            assert_eq!(policy.decide(&in_state(state)), Decision::stay(state));
        }
    }

    #[test]
    fn decisions_depend_only_on_input() {
        let policy = DefaultPolicy::default();
        let states = [
            AgentState::Idle,
            AgentState::Planning,
            AgentState::Executing,
            AgentState::Rethinking,
            AgentState::Done,
            AgentState::Error,
        ];
        let tasks = [
            None,
            Some(task(&[Status::Pending], Status::Pending)),
            Some(task(&[Status::Done], Status::Done)),
            Some(task(&[], Status::Pending)),
        ];
        for state in states {
            for current in &tasks {
                for rounds in [0, 5, 10, 11] {
                    for answer in [None, Some("a")] {
                        let mut ctx = in_state(state);
                        ctx.current_task = current.clone();
                        ctx.plan = current.clone().map(|t| Plan { tasks: vec![t] });
                        ctx.rethink_rounds = rounds;
                        ctx.final_answer = answer.map(String::from);

                        let first = policy.decide(&ctx);
                        assert_eq!(first, policy.decide(&ctx.clone()));
                        let expected = expected_state(&ctx);
                        assert_eq!(first.next_state, expected, "state {state} rounds {rounds}");
                    }
                }
            }
        }
    }

    /// The decision table, restated independently.
    fn expected_state(ctx: &StateContext) -> AgentState {
        match ctx.state {
            AgentState::Idle => AgentState::Planning,
            AgentState::Planning => match &ctx.plan {
                Some(p) if !p.is_empty() && ctx.error.is_none() => AgentState::Executing,
                _ => AgentState::Error,
            },
            AgentState::Executing => match &ctx.current_task {
                None => AgentState::Error,
                Some(t) if t.steps.iter().any(|s| s.status == Status::Pending) => AgentState::Executing,
                Some(_) => AgentState::Rethinking,
            },
            AgentState::Rethinking => {
                if ctx.rethink_rounds >= 10 {
                    AgentState::Error
                } else if ctx.final_answer.is_some() {
                    AgentState::Done
                } else if ctx
                    .plan
                    .as_ref()
                    .is_some_and(|p| p.tasks.iter().any(|t| t.status == Status::Pending))
                {
                    AgentState::Executing
                } else {
                    AgentState::Done
                }
            }
            s => s,
        }
    }

    #[test]
    fn always_continue_stops_after_exactly_max_rounds() {
        let policy = DefaultPolicy::default();
        let mut ctx = in_state(AgentState::Idle);
        ctx.plan = Some(Plan {
            tasks: vec![task(&[Status::Pending], Status::Pending)],
        });
        ctx.current_task = ctx.plan.as_ref().map(|p| p.tasks[0].clone());

        let mut rethinks = 0;
        for _ in 0..1000 {
            let decision = policy.decide(&ctx);
            ctx.state = decision.next_state;
            match decision.action {
                Some(Action::Plan) => {}
                // the step completes but the task stays pending in the plan
                Some(Action::ExecuteStep) => {
                    if let Some(t) = ctx.current_task.as_mut() {
                        t.steps[0].status = Status::Done;
                    }
                }
                // "continue": point back at the pending task
                Some(Action::Rethink) => {
                    rethinks += 1;
                    ctx.rethink_rounds += 1;
                    ctx.current_task = ctx.plan.as_ref().map(|p| p.tasks[0].clone());
                }
                None => {}
            }
            if ctx.state.is_terminal() {
                ctx.error = decision.error;
                break;
            }
        }
        assert_eq!(ctx.state, AgentState::Error);
        assert_eq!(rethinks, 10);
        assert_eq!(ctx.error, Some(AgentError::MaxRethinkReached { rounds: 10 }));
    }
}
