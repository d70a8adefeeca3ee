//! Pure stage transition function
//!
//! Given the same state, trigger events and extractor, `transition` always
//! produces the same next state and performs no I/O.

use super::event::{Event, OperationKind, OperationResult};
use super::extract::InfoExtractor;
use super::payload;
use super::state::{Offer, SessionState, Stage, WorkflowArtifacts};
use std::cmp::Reverse;

/// Phrases that show the user wants to start the purchase workflow
const INTENT_KEYWORDS: &[&str] = &["solar", "rooftop", "incentive", "flexibility program"];
/// Extra affirmations accepted once the welcome message has been shown
const WELCOME_AFFIRMATIONS: &[&str] = &["yes", "tell me more"];
const CANCEL_WORDS: &[&str] = &["cancel", "stop", "quit"];
const SELECTION_PREFIXES: &[&str] = &["select", "option", "choose", "pick", "number", "no.", "#"];

/// Result of a state transition
#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub previous_stage: Stage,
    pub new_state: SessionState,
}

impl TransitionResult {
    pub fn stage(&self) -> Stage {
        self.new_state.stage
    }

    pub fn stage_changed(&self) -> bool {
        self.previous_stage != self.new_state.stage
    }
}

/// Evaluate the stage rules against the events appended by the last step.
///
/// `trigger` is the single event of a user message or decision step, or the
/// results of one dispatcher pass in request order. `last_error` is cleared
/// once per evaluation of user input or operation results and only set by
/// failed operations; an assistant message leaves it in place.
pub fn transition(
    state: &SessionState,
    trigger: &[Event],
    extractor: &dyn InfoExtractor,
) -> TransitionResult {
    let mut next = state.clone();
    if trigger.iter().any(|e| !matches!(e, Event::AssistantText { .. })) {
        next.last_error = None;
    }

    for event in trigger {
        if let Event::OperationResult(result) = event {
            harvest(&mut next.artifacts, result);
        }
        next.stage = step(&mut next, event, extractor);
    }

    TransitionResult {
        previous_stage: state.stage,
        new_state: next,
    }
}

/// Apply one event to the state, returning the stage it leads to
fn step(state: &mut SessionState, event: &Event, extractor: &dyn InfoExtractor) -> Stage {
    match (state.stage, event) {
        // ============================================================
        // Classification
        // ============================================================
        (Stage::Intake | Stage::Error, Event::UserText { text }) => classify_intent(text, false),
        (Stage::Welcome, Event::UserText { text }) => classify_intent(text, true),

        // ============================================================
        // Information gathering
        // ============================================================
        (Stage::GatherInfo, Event::UserText { text }) => {
            let found = extractor.extract(text, &state.collected_info);
            state.collected_info.merge(found);
            if state.collected_info.ready_for_search() {
                Stage::SearchOffer
            } else {
                Stage::GatherInfo
            }
        }

        // ============================================================
        // Offer search and selection
        // ============================================================
        (Stage::SearchOffer, Event::OperationResult(result)) => match result.payload() {
            None => fail(state, result, Stage::Error),
            Some(p) if result.kind == OperationKind::OfferSearch => {
                if payload::catalog_items(p).is_empty() {
                    Stage::Welcome
                } else {
                    Stage::PresentOptions
                }
            }
            Some(_) => Stage::SearchOffer,
        },

        (Stage::PresentOptions, Event::UserText { text }) => {
            match parse_selection(text, &state.artifacts.offers) {
                Some(index) => {
                    state.artifacts.selected_offer = Some(state.artifacts.offers[index].clone());
                    Stage::ConfirmOffer
                }
                None if is_cancel(text) => Stage::Done,
                None => Stage::PresentOptions,
            }
        }

        (Stage::ConfirmOffer, Event::OperationResult(result)) => match result.payload() {
            None => fail(state, result, Stage::Error),
            Some(p) if result.kind == OperationKind::OfferConfirm => {
                if payload::order_id(p).is_some() {
                    Stage::SearchIncentives
                } else {
                    Stage::ReportStatus
                }
            }
            Some(_) => Stage::ConfirmOffer,
        },

        // ============================================================
        // Incentives (failures are soft)
        // ============================================================
        (Stage::SearchIncentives, Event::OperationResult(result)) => match result.payload() {
            None => fail(state, result, Stage::ProvisionResources),
            Some(p) if result.kind == OperationKind::IncentiveSearch => {
                if payload::catalog_items(p).is_empty() {
                    Stage::ProvisionResources
                } else {
                    Stage::ApplyIncentives
                }
            }
            Some(_) => Stage::SearchIncentives,
        },

        (Stage::ApplyIncentives, Event::OperationResult(result)) => {
            if result.is_success() {
                Stage::ProvisionResources
            } else {
                fail(state, result, Stage::ProvisionResources)
            }
        }

        // ============================================================
        // Provisioning (failures are fatal)
        // ============================================================
        (Stage::ProvisionResources, Event::OperationResult(result)) if !result.is_success() => {
            fail(state, result, Stage::Error)
        }
        (Stage::ProvisionResources, _) => {
            if state.artifacts.provisioning_complete() {
                Stage::ReportStatus
            } else {
                Stage::ProvisionResources
            }
        }

        // ============================================================
        // Completion
        // ============================================================
        (Stage::ReportStatus, Event::OperationResult(result)) if !result.is_success() => {
            fail(state, result, Stage::Done)
        }
        (Stage::ReportStatus, _) => Stage::Done,
        (Stage::Done, _) => Stage::Done,

        // ============================================================
        // Everything else
        // ============================================================
        (Stage::Error, _) => Stage::Error,

        // Failures in stages without a softer rule are fatal
        (stage, Event::OperationResult(result)) => {
            if result.is_success() {
                stage
            } else {
                fail(state, result, Stage::Error)
            }
        }

        (stage, _) => stage,
    }
}

/// Record a failed operation and move to `target`
fn fail(state: &mut SessionState, result: &OperationResult, target: Stage) -> Stage {
    let detail = result.error().unwrap_or("unknown error");
    state.last_error = Some(format!("{} failed: {detail}", result.operation));
    target
}

fn classify_intent(text: &str, welcomed: bool) -> Stage {
    let lowered = text.to_lowercase();
    let interested = INTENT_KEYWORDS.iter().any(|k| lowered.contains(k))
        || (welcomed && WELCOME_AFFIRMATIONS.iter().any(|k| contains_phrase(&lowered, k)));
    if interested {
        Stage::GatherInfo
    } else {
        Stage::Welcome
    }
}

/// Whole-word phrase match on already lowercased text
fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

fn contains_phrase(lowered: &str, phrase: &str) -> bool {
    let needle = words(phrase);
    !needle.is_empty() && words(lowered).windows(needle.len()).any(|w| w == needle.as_slice())
}

fn is_cancel(text: &str) -> bool {
    let lowered = text.to_lowercase();
    CANCEL_WORDS.iter().any(|w| contains_phrase(&lowered, w))
}

/// Resolve a user's pick against the cached offers.
///
/// Accepts a 1-based ordinal ("2", "select 2", "option #2"), an offer's exact
/// name, or text containing an offer's name as whole words. The longest
/// contained name wins, and cancelling text never selects by containment.
/// Returns the zero-based index.
pub fn parse_selection(text: &str, offers: &[Offer]) -> Option<usize> {
    if offers.is_empty() {
        return None;
    }
    let lowered = text.trim().to_lowercase();

    let mut rest = lowered.as_str();
    while let Some(stripped) = SELECTION_PREFIXES
        .iter()
        .find_map(|p| rest.trim_start().strip_prefix(p))
    {
        rest = stripped;
    }
    let ordinal = rest
        .trim()
        .trim_end_matches(['.', '!', ')'])
        .trim_start_matches('#')
        .parse::<usize>()
        .ok();
    if let Some(n) = ordinal {
        return (1..=offers.len()).contains(&n).then(|| n - 1);
    }

    let names: Vec<String> = offers.iter().map(|o| o.name.trim().to_lowercase()).collect();
    if let Some(exact) = names.iter().position(|n| !n.is_empty() && *n == lowered) {
        return Some(exact);
    }
    if is_cancel(&lowered) {
        return None;
    }

    names
        .iter()
        .enumerate()
        .filter(|(_, n)| contains_phrase(&lowered, n))
        .min_by_key(|(i, n)| (Reverse(n.len()), *i))
        .map(|(i, _)| i)
}

/// Record identifiers carried by a successful result
fn harvest(artifacts: &mut WorkflowArtifacts, result: &OperationResult) {
    let Some(p) = result.payload() else {
        return;
    };

    match result.kind {
        OperationKind::OfferSearch => {
            let offers = payload::catalog_items(p);
            if !offers.is_empty() {
                artifacts.offers = offers;
            }
        }
        OperationKind::IncentiveSearch => {
            let incentives = payload::catalog_items(p);
            if !incentives.is_empty() {
                artifacts.incentives = incentives;
            }
        }
        OperationKind::OfferConfirm => {
            if let Some(id) = payload::order_id(p) {
                artifacts.order_id = Some(id);
            }
        }
        OperationKind::IncentiveConfirm => {
            if let Some(id) = payload::order_id(p) {
                artifacts.incentive_order_id = Some(id);
            }
        }
        OperationKind::UtilityLookup => {
            if payload::has_utilities(p) {
                artifacts.utility_data = Some(p.clone());
            }
        }
        OperationKind::CreateResource => {
            if let Some(id) = payload::created_id(p) {
                artifacts.resource_id = Some(id);
            }
        }
        OperationKind::CreateMeter => {
            if let Some(id) = payload::created_id(p) {
                artifacts.meter_id = Some(id);
            }
        }
        OperationKind::CreateDevice => {
            if let Some(id) = payload::created_id(p) {
                artifacts.add_device(id);
            }
        }
        OperationKind::OfferSelect
        | OperationKind::OfferInit
        | OperationKind::OrderStatus
        | OperationKind::ConnectionSearch
        | OperationKind::ToggleDevice
        | OperationKind::Unknown => {}
    }
}
