//! Decision step
//!
//! Assembles a bounded summary of the session and asks the decision-maker for
//! the next event. No workflow branching happens here.

mod llm;
mod prompt;

pub use llm::LlmDecisionMaker;

use crate::llm::LlmError;
use crate::state_machine::{
    CollectedInfo, Event, Offer, OperationRequest, SessionState, Stage,
};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Offers listed in the summary; the rest are only counted
const MAX_LISTED_OFFERS: usize = 10;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("decision-maker request failed: {0}")]
    Llm(#[from] LlmError),
    #[error("decision-maker returned neither text nor operations")]
    EmptyResponse,
    #[error("decision-maker unavailable: {0}")]
    Unavailable(String),
}

/// What the decision-maker wants to happen next
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Reply(String),
    Operations(Vec<OperationRequest>),
}

impl Decision {
    pub fn into_event(self) -> Event {
        match self {
            Decision::Reply(text) => Event::AssistantText { text },
            Decision::Operations(requests) => Event::OperationRequestBatch { requests },
        }
    }
}

/// Short view of an offer for the decision-maker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferBrief {
    /// 1-based position users select by
    pub number: usize,
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}

impl OfferBrief {
    fn new(number: usize, offer: &Offer) -> Self {
        let price = &offer.raw["price"];
        let price = price["value"].as_str().map(|value| match price["currency"].as_str() {
            Some(currency) => format!("{value} {currency}"),
            None => value.to_string(),
        });
        Self {
            number,
            id: offer.id.clone(),
            name: offer.name.clone(),
            provider_id: offer.provider_id.clone(),
            price,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProvisioningStatus {
    pub resource_id: Option<String>,
    pub meter_id: Option<String>,
    pub device_ids: Vec<String>,
}

/// Bounded context handed to the decision-maker alongside the history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    pub stage: Stage,
    pub collected_info: CollectedInfo,
    pub offer_count: usize,
    pub offers: Vec<OfferBrief>,
    pub selected_offer: Option<OfferBrief>,
    pub order_id: Option<String>,
    pub incentive_count: usize,
    pub incentives: Vec<OfferBrief>,
    pub incentive_order_id: Option<String>,
    pub provisioning: ProvisioningStatus,
    pub last_error: Option<String>,
    pub last_operation_summary: Option<String>,
}

impl ContextSummary {
    pub fn from_state(state: &SessionState) -> Self {
        let artifacts = &state.artifacts;
        let briefs = |offers: &[Offer]| -> Vec<OfferBrief> {
            offers
                .iter()
                .take(MAX_LISTED_OFFERS)
                .enumerate()
                .map(|(i, offer)| OfferBrief::new(i + 1, offer))
                .collect()
        };

        Self {
            stage: state.stage,
            collected_info: state.collected_info.clone(),
            offer_count: artifacts.offers.len(),
            offers: briefs(&artifacts.offers),
            selected_offer: artifacts.selected_offer.as_ref().map(|o| {
                let number = artifacts.offers.iter().position(|c| c.id == o.id).map_or(0, |i| i + 1);
                OfferBrief::new(number, o)
            }),
            order_id: artifacts.order_id.clone(),
            incentive_count: artifacts.incentives.len(),
            incentives: briefs(&artifacts.incentives),
            incentive_order_id: artifacts.incentive_order_id.clone(),
            provisioning: ProvisioningStatus {
                resource_id: artifacts.resource_id.clone(),
                meter_id: artifacts.meter_id.clone(),
                device_ids: artifacts.device_ids.clone(),
            },
            last_error: state.last_error.clone(),
            last_operation_summary: state.last_operation_summary.clone(),
        }
    }
}

/// Policy component producing either a user message or operation requests
#[async_trait]
pub trait DecisionMaker: Send + Sync {
    async fn decide(&self, history: &[Event], context: &ContextSummary) -> Result<Decision, DecisionError>;
}

#[async_trait]
impl<T: DecisionMaker + ?Sized> DecisionMaker for std::sync::Arc<T> {
    async fn decide(&self, history: &[Event], context: &ContextSummary) -> Result<Decision, DecisionError> {
        (**self).decide(history, context).await
    }
}

/// Stand-in used when no model is configured; every decision fails
pub struct UnavailableDecisionMaker {
    reason: String,
}

impl UnavailableDecisionMaker {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl DecisionMaker for UnavailableDecisionMaker {
    async fn decide(&self, _history: &[Event], _context: &ContextSummary) -> Result<Decision, DecisionError> {
        Err(DecisionError::Unavailable(self.reason.clone()))
    }
}

/// Run one decision step and return the event to append
pub async fn decision_step(maker: &dyn DecisionMaker, state: &SessionState) -> Result<Event, DecisionError> {
    let context = ContextSummary::from_state(state);
    let decision = maker.decide(&state.history, &context).await?;
    match &decision {
        Decision::Reply(text) => {
            tracing::debug!(stage = %state.stage, chars = text.len(), "Decision: reply");
        }
        Decision::Operations(requests) => {
            let names: Vec<&str> = requests.iter().map(|r| r.name.as_str()).collect();
            tracing::debug!(stage = %state.stage, operations = ?names, "Decision: operations");
        }
    }
    Ok(decision.into_event())
}
