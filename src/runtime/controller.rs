//! Turn controller
//!
//! Drives one user message to completion: decision steps, dispatcher passes
//! and stage transitions alternate until the session waits for the user,
//! reaches `done`, or the iteration cap trips.

use super::dispatcher::dispatch;
use crate::decision::{decision_step, DecisionMaker};
use crate::operations::OperationRegistry;
use crate::state_machine::{transition, Event, InfoExtractor, SessionState, Stage};

/// Message shown when a turn cannot finish normally
const FAILURE_MESSAGE: &str =
    "Sorry, something went wrong on my side while working on your request. Please try again, or tell me what you would like to do next.";

/// Final state of a turn and the assistant messages it produced
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub state: SessionState,
    /// Assistant messages appended during the turn, in event order
    pub responses: Vec<String>,
}

/// Borrowed collaborators for one turn
pub struct TurnController<'a> {
    pub decision: &'a dyn DecisionMaker,
    pub registry: &'a OperationRegistry,
    pub extractor: &'a dyn InfoExtractor,
    pub max_iterations: usize,
}

impl TurnController<'_> {
    pub async fn run(&self, mut state: SessionState, user_text: &str) -> TurnOutcome {
        let start = state.history.len();
        state.last_operation_summary = None;

        let user = Event::user(user_text);
        state.history.push(user.clone());
        state = self.apply(&state, &[user]);

        let mut stopped = false;
        for iteration in 1..=self.max_iterations {
            let event = match decision_step(self.decision, &state).await {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(iteration, stage = %state.stage, error = %e, "Decision step failed");
                    abort(&mut state, format!("decision-maker failed: {e}"));
                    stopped = true;
                    break;
                }
            };

            match event {
                Event::OperationRequestBatch { requests } => {
                    state.history.push(Event::OperationRequestBatch {
                        requests: requests.clone(),
                    });
                    let outcome = dispatch(self.registry, &mut state, &requests).await;
                    if outcome.any_failed {
                        tracing::info!(iteration, summary = %outcome.summary, "Batch had failures");
                    }
                    let results: Vec<Event> = outcome.results.into_iter().map(Event::OperationResult).collect();
                    state.history.extend(results.iter().cloned());
                    state.last_operation_summary = Some(outcome.summary);
                    state = self.apply(&state, &results);
                }
                other => {
                    state.history.push(other.clone());
                    state = self.apply(&state, &[other]);
                }
            }

            if should_stop(&state) {
                tracing::debug!(iteration, stage = %state.stage, "Turn complete");
                stopped = true;
                break;
            }
        }

        if !stopped {
            tracing::error!(max = self.max_iterations, stage = %state.stage, "Turn hit the iteration cap");
            abort(
                &mut state,
                format!("turn exceeded {} decision steps without finishing", self.max_iterations),
            );
        }

        let responses = state
            .history
            .get(start..)
            .unwrap_or_default()
            .iter()
            .filter_map(|event| match event {
                Event::AssistantText { text } => Some(text.clone()),
                _ => None,
            })
            .collect();

        TurnOutcome { state, responses }
    }

    fn apply(&self, state: &SessionState, trigger: &[Event]) -> SessionState {
        let result = transition(state, trigger, self.extractor);
        if result.stage_changed() {
            tracing::info!(
                from = %result.previous_stage,
                to = %result.stage(),
                trigger = trigger.first().map_or("none", Event::kind),
                "Stage transition"
            );
        }
        result.new_state
    }
}

/// The session is done, or an assistant message leaves it waiting for the user
fn should_stop(state: &SessionState) -> bool {
    state.stage.is_terminal() || (state.stage.waits_for_user() && state.ends_with_assistant_text())
}

/// Force the error stage with an explanation for the user
fn abort(state: &mut SessionState, reason: String) {
    state.stage = Stage::Error;
    state.last_error = Some(reason);
    state.history.push(Event::assistant(FAILURE_MESSAGE));
}
