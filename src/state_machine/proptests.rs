//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::event::{OperationKind, OperationResult};
use super::extract::KeywordExtractor;
use super::state::*;
use super::transition::*;
use super::Event;
use proptest::prelude::*;
use serde_json::{json, Value};

// ============================================================================
// Test Helpers
// ============================================================================

fn step(state: &SessionState, event: Event) -> SessionState {
    transition(state, &[event], &KeywordExtractor::new()).new_state
}

fn state_in(stage: Stage) -> SessionState {
    SessionState {
        stage,
        ..SessionState::initial()
    }
}

fn catalog(count: usize) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|i| json!({"id": format!("item-{i}"), "descriptor": {"name": format!("Offer {i}")}}))
        .collect();
    json!({"message": {"catalog": {"items": items}}})
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_stage() -> impl Strategy<Value = Stage> {
    proptest::sample::select(Stage::ALL.to_vec())
}

fn arb_kind() -> impl Strategy<Value = OperationKind> {
    prop_oneof![
        Just(OperationKind::OfferSearch),
        Just(OperationKind::OfferSelect),
        Just(OperationKind::OfferInit),
        Just(OperationKind::OfferConfirm),
        Just(OperationKind::OrderStatus),
        Just(OperationKind::IncentiveSearch),
        Just(OperationKind::IncentiveConfirm),
        Just(OperationKind::UtilityLookup),
        Just(OperationKind::CreateResource),
        Just(OperationKind::CreateMeter),
        Just(OperationKind::CreateDevice),
        Just(OperationKind::ToggleDevice),
        Just(OperationKind::Unknown),
    ]
}

fn arb_payload() -> impl Strategy<Value = Value> {
    prop_oneof![
        (0usize..4).prop_map(catalog),
        "[a-z0-9]{1,8}".prop_map(|id| json!({"message": {"order": {"id": id}}})),
        (1u32..1000).prop_map(|id| json!({"data": {"id": id}})),
        Just(json!({"utilities": [{"substations": [{"transformers": [{"id": 4}]}]}]})),
        Just(json!({})),
    ]
}

fn arb_failure() -> impl Strategy<Value = Event> {
    (arb_kind(), "[a-zA-Z ]{1,30}").prop_map(|(kind, error)| {
        Event::OperationResult(OperationResult::failure("c", "op", kind, error))
    })
}

fn arb_result() -> impl Strategy<Value = Event> {
    prop_oneof![
        (arb_kind(), arb_payload()).prop_map(|(kind, payload)| {
            Event::OperationResult(OperationResult::success("c", "op", kind, payload))
        }),
        arb_failure(),
    ]
}

fn arb_user_text() -> impl Strategy<Value = String> {
    let words = vec![
        "hello", "solar", "rooftop", "yes", "I", "live", "in", "Austin", "bill", "$120", "2",
        "option", "stop", "name", "is", "jane", "kwh", "please", "incentive", "94103",
    ];
    proptest::collection::vec(proptest::sample::select(words), 1..8).prop_map(|w| w.join(" "))
}

/// Sentences that carry no consumption signal for the keyword extractor
fn arb_text_without_consumption() -> impl Strategy<Value = String> {
    let words = vec![
        "hello", "I", "live", "in", "Austin", "my", "name", "is", "sam", "thanks", "ok", "94103",
        "what", "next", "solar",
    ];
    proptest::collection::vec(proptest::sample::select(words), 1..10).prop_map(|w| w.join(" "))
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_user_text().prop_map(Event::user),
        "[a-zA-Z ]{1,30}".prop_map(Event::assistant),
        arb_result(),
    ]
}

fn arb_state() -> impl Strategy<Value = SessionState> {
    (arb_stage(), 0usize..4, any::<bool>()).prop_map(|(stage, offers, located)| {
        let mut state = state_in(stage);
        state.artifacts.offers = super::payload::catalog_items(&catalog(offers));
        if located {
            state.collected_info.mark_provided(LOCATION);
        }
        state
    })
}

fn known_entries(state: &SessionState) -> Vec<(String, String)> {
    state
        .collected_info
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn artifacts_preserved(before: &WorkflowArtifacts, after: &WorkflowArtifacts) -> bool {
    let kept = |a: &Option<String>, b: &Option<String>| a.is_none() || b.is_some();
    kept(&before.order_id, &after.order_id)
        && kept(&before.incentive_order_id, &after.incentive_order_id)
        && kept(&before.resource_id, &after.resource_id)
        && kept(&before.meter_id, &after.meter_id)
        && (before.selected_offer.is_none() || after.selected_offer.is_some())
        && (before.utility_data.is_none() || after.utility_data.is_some())
        && (before.offers.is_empty() || !after.offers.is_empty())
        && (before.incentives.is_empty() || !after.incentives.is_empty())
        && before.device_ids.iter().all(|id| after.device_ids.contains(id))
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Classification is deterministic for a fresh welcome state
    #[test]
    fn prop_classification_is_deterministic(text in arb_user_text()) {
        let state = state_in(Stage::Welcome);
        let first = step(&state, Event::user(text.clone()));
        let second = step(&state, Event::user(text));
        prop_assert_eq!(first.stage, second.stage);
        prop_assert!(matches!(first.stage, Stage::Welcome | Stage::GatherInfo));
    }

    // collected_info and artifacts never lose entries
    #[test]
    fn prop_state_is_monotonic(
        initial in arb_state(),
        events in proptest::collection::vec(arb_event(), 0..25)
    ) {
        let mut state = initial;
        for event in events {
            let next = step(&state, event);
            for (key, value) in known_entries(&state) {
                prop_assert!(next.collected_info.contains(&key), "lost {}", key);
                if value == PROVIDED {
                    prop_assert!(next.collected_info.is_provided(&key));
                }
            }
            prop_assert!(
                artifacts_preserved(&state.artifacts, &next.artifacts),
                "artifacts shrank: {:?} -> {:?}",
                state.artifacts,
                next.artifacts
            );
            state = next;
        }
    }

    // Provisioning failures are fatal
    #[test]
    fn prop_provision_failure_is_fatal(failure in arb_failure()) {
        let next = step(&state_in(Stage::ProvisionResources), failure);
        prop_assert_eq!(next.stage, Stage::Error);
        prop_assert!(next.last_error.is_some());
    }

    // Incentive apply failures never block provisioning
    #[test]
    fn prop_apply_failure_is_soft(failure in arb_failure()) {
        let next = step(&state_in(Stage::ApplyIncentives), failure);
        prop_assert_eq!(next.stage, Stage::ProvisionResources);
        prop_assert!(next.last_error.is_some());
    }

    // Any successful apply result also continues to provisioning
    #[test]
    fn prop_apply_any_outcome_continues(result in arb_result()) {
        let next = step(&state_in(Stage::ApplyIncentives), result);
        prop_assert_eq!(next.stage, Stage::ProvisionResources);
    }

    // Assistant messages never move a waiting stage other than report_status
    #[test]
    fn prop_assistant_text_keeps_waiting_stage(
        stage in arb_stage(),
        text in "[a-zA-Z ]{1,30}"
    ) {
        prop_assume!(stage.waits_for_user() && stage != Stage::ReportStatus);
        let next = step(&state_in(stage), Event::assistant(text));
        prop_assert_eq!(next.stage, stage);
    }

    // last_error is only ever set by a failed operation and survives the
    // assistant message that explains it
    #[test]
    fn prop_last_error_only_from_failures(initial in arb_state(), event in arb_event()) {
        let mut state = initial;
        state.last_error = Some("stale".to_string());
        let failed = matches!(&event, Event::OperationResult(r) if !r.is_success());
        let assistant = matches!(&event, Event::AssistantText { .. });
        let next = step(&state, event);
        if assistant {
            prop_assert_eq!(next.last_error.as_deref(), Some("stale"));
        } else if !failed {
            prop_assert!(next.last_error.is_none());
        }
    }

    // Done absorbs every event
    #[test]
    fn prop_done_is_terminal(event in arb_event()) {
        prop_assert_eq!(step(&state_in(Stage::Done), event).stage, Stage::Done);
    }

    // Error is only left through user input
    #[test]
    fn prop_error_waits_for_user(event in prop_oneof![arb_result(), "[a-z ]{1,20}".prop_map(Event::assistant)]) {
        prop_assert_eq!(step(&state_in(Stage::Error), event).stage, Stage::Error);
    }

    // Scenario B: without consumption, gather_info never advances
    #[test]
    fn prop_gather_info_waits_for_consumption(text in arb_text_without_consumption()) {
        let mut state = state_in(Stage::GatherInfo);
        state.collected_info.mark_provided(LOCATION);
        let next = step(&state, Event::user(text));
        prop_assert_eq!(next.stage, Stage::GatherInfo);
    }

    // Ordinal selection resolves to the zero-based index
    #[test]
    fn prop_ordinal_selection(count in 1usize..6, pick in 1usize..6) {
        let offers = super::payload::catalog_items(&catalog(count));
        let expected = (pick <= count).then(|| pick - 1);
        prop_assert_eq!(parse_selection(&pick.to_string(), &offers), expected);
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn scenario_fresh_session_with_intent() {
    let next = step(&SessionState::initial(), Event::user("I want rooftop solar"));
    assert_eq!(next.stage, Stage::GatherInfo);
}

#[test]
fn scenario_select_second_of_three() {
    let mut state = state_in(Stage::PresentOptions);
    state.artifacts.offers = super::payload::catalog_items(&catalog(3));
    let next = step(&state, Event::user("2"));
    assert_eq!(next.stage, Stage::ConfirmOffer);
    assert_eq!(
        next.artifacts.selected_offer.map(|o| o.id),
        Some("item-1".to_string())
    );
}

#[test]
fn scenario_search_failure_sets_error() {
    let failure = OperationResult::failure("c", "solar_retail_search", OperationKind::OfferSearch, "timeout");
    let next = step(&state_in(Stage::SearchOffer), Event::OperationResult(failure));
    assert_eq!(next.stage, Stage::Error);
    assert!(!next.last_error.unwrap_or_default().is_empty());
}

#[test]
fn scenario_provisioning_completes_on_third_artifact() {
    let created = |kind, id: u32| {
        Event::OperationResult(OperationResult::success("c", "op", kind, json!({"data": {"id": id}})))
    };
    let mut state = state_in(Stage::ProvisionResources);

    state = step(&state, created(OperationKind::CreateResource, 1));
    assert_eq!(state.stage, Stage::ProvisionResources);
    state = step(&state, created(OperationKind::CreateMeter, 2));
    assert_eq!(state.stage, Stage::ProvisionResources);
    state = step(&state, created(OperationKind::CreateDevice, 3));
    assert_eq!(state.stage, Stage::ReportStatus);
}
