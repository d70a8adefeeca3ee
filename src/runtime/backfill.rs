//! Argument backfill for operation requests
//!
//! Fills identifying arguments the decision-maker left out from collected
//! info and workflow artifacts. Only arguments the operation declares are
//! ever filled.

use crate::operations::{is_blank, missing_args, Operation, OperationError, OperationRegistry};
use crate::state_machine::payload::{first_transformer_id, has_utilities};
use crate::state_machine::state::{
    CUSTOMER_EMAIL, CUSTOMER_NAME, CUSTOMER_PHONE, FULFILLMENT_ID, PROVIDED,
};
use crate::state_machine::{OperationKind, SessionState};
use rand::Rng;
use serde_json::{Map, Value};

const CONTACT_FIELDS: &[&str] = &[CUSTOMER_NAME, CUSTOMER_PHONE, CUSTOMER_EMAIL];

/// Complete `args` for `op`, failing if required arguments remain missing.
///
/// May persist a generated fulfillment id into `collected_info` and cache
/// utility data fetched for a meter parent lookup.
pub async fn backfill(
    registry: &OperationRegistry,
    op: &dyn Operation,
    state: &mut SessionState,
    args: &mut Map<String, Value>,
) -> Result<(), OperationError> {
    let mut filler = Filler { op, args };

    match op.kind() {
        OperationKind::OfferSelect | OperationKind::OfferInit | OperationKind::OfferConfirm => {
            if let Some(offer) = &state.artifacts.selected_offer {
                if let Some(provider) = &offer.provider_id {
                    filler.fill("provider_id", provider.as_str());
                }
                filler.fill("item_id", offer.id.as_str());
            }
        }
        OperationKind::IncentiveConfirm => {
            if let Some(incentive) = state.artifacts.incentives.first() {
                if let Some(provider) = &incentive.provider_id {
                    filler.fill("provider_id", provider.as_str());
                }
                filler.fill("item_id", incentive.id.as_str());
            }
        }
        OperationKind::OrderStatus => {
            if let Some(order_id) = &state.artifacts.order_id {
                filler.fill("order_id", order_id.as_str());
            }
        }
        OperationKind::CreateDevice => {
            if let Some(resource_id) = &state.artifacts.resource_id {
                filler.fill("energy_resource_id", resource_id.as_str());
            }
        }
        OperationKind::CreateMeter => {
            if let Some(resource_id) = &state.artifacts.resource_id {
                filler.fill("energy_resource", resource_id.as_str());
            }
        }
        _ => {}
    }

    if matches!(op.kind(), OperationKind::OfferConfirm | OperationKind::IncentiveConfirm) {
        for field in CONTACT_FIELDS {
            if let Some(value) = state.collected_info.get(field).filter(|v| *v != PROVIDED) {
                filler.fill(field, value);
            }
        }
        if filler.wants(FULFILLMENT_ID) {
            let id = match state.collected_info.get(FULFILLMENT_ID) {
                Some(id) => id.to_string(),
                None => {
                    let id = rand::thread_rng().gen_range(10_000..=99_999).to_string();
                    tracing::debug!(fulfillment_id = %id, "Generated fulfillment id");
                    state.collected_info.set(FULFILLMENT_ID, id.clone());
                    id
                }
            };
            filler.fill(FULFILLMENT_ID, id.as_str());
        }
    }

    if op.kind() == OperationKind::CreateMeter && filler.wants("parent") {
        let parent = resolve_meter_parent(registry, state).await?;
        filler.fill("parent", parent);
    }

    let missing = missing_args(op, args);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(OperationError::MissingArgs(missing))
    }
}

/// First transformer from cached utility data, else from a fresh lookup
async fn resolve_meter_parent(
    registry: &OperationRegistry,
    state: &mut SessionState,
) -> Result<Value, OperationError> {
    if let Some(id) = state.artifacts.utility_data.as_ref().and_then(first_transformer_id) {
        return Ok(id);
    }

    let lookup = registry
        .find_kind(OperationKind::UtilityLookup)
        .ok_or_else(|| OperationError::Unresolved("no utility lookup operation available to find a meter parent".to_string()))?;

    tracing::info!(operation = lookup.name(), "Looking up transformer for meter parent");
    let payload = lookup.invoke(Map::new()).await.map_err(|e| {
        OperationError::Unresolved(format!("utility lookup for meter parent failed: {e}"))
    })?;

    let parent = first_transformer_id(&payload);
    if has_utilities(&payload) {
        state.artifacts.utility_data = Some(payload);
    }
    parent.ok_or_else(|| OperationError::Unresolved("could not find a parent transformer for the meter".to_string()))
}

/// Inserts values only for declared arguments the request left empty
struct Filler<'a> {
    op: &'a dyn Operation,
    args: &'a mut Map<String, Value>,
}

impl Filler<'_> {
    fn declares(&self, name: &str) -> bool {
        self.op.required_args().contains(&name) || self.op.optional_args().contains(&name)
    }

    fn wants(&self, name: &str) -> bool {
        self.declares(name) && self.args.get(name).map_or(true, is_blank)
    }

    fn fill(&mut self, name: &str, value: impl Into<Value>) {
        if self.wants(name) {
            self.args.insert(name.to_string(), value.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::MockOperation;
    use crate::state_machine::Offer;
    use serde_json::json;
    use std::sync::Arc;

    fn offer(id: &str, provider: &str) -> Offer {
        Offer {
            id: id.to_string(),
            name: format!("Offer {id}"),
            provider_id: Some(provider.to_string()),
            raw: Value::Null,
        }
    }

    fn confirm_op() -> MockOperation {
        MockOperation::new("solar_retail_confirm", OperationKind::OfferConfirm).with_required(&[
            "provider_id",
            "item_id",
            "fulfillment_id",
            "customer_name",
            "customer_phone",
            "customer_email",
        ])
    }

    #[tokio::test]
    async fn test_confirm_pulls_offer_and_contact() {
        let registry = OperationRegistry::new();
        let mut state = SessionState::initial();
        state.artifacts.selected_offer = Some(offer("item-2", "prov-1"));
        state.collected_info.set(CUSTOMER_NAME, "Jane Doe");
        state.collected_info.set(CUSTOMER_PHONE, "415-555-0100");
        state.collected_info.set(CUSTOMER_EMAIL, "jane@example.com");

        let mut args = Map::new();
        args.insert("item_id".to_string(), json!("explicit"));
        backfill(&registry, &confirm_op(), &mut state, &mut args).await.unwrap();

        assert_eq!(args["item_id"], "explicit");
        assert_eq!(args["provider_id"], "prov-1");
        assert_eq!(args["customer_name"], "Jane Doe");

        let generated = args["fulfillment_id"].as_str().unwrap().to_string();
        assert_eq!(generated.len(), 5);
        assert_eq!(state.collected_info.get(FULFILLMENT_ID), Some(generated.as_str()));

        // The persisted id is reused on retry
        let mut retry = Map::new();
        backfill(&registry, &confirm_op(), &mut state, &mut retry).await.unwrap();
        assert_eq!(retry["fulfillment_id"], generated.as_str());
    }

    #[tokio::test]
    async fn test_missing_contact_fails_locally() {
        let registry = OperationRegistry::new();
        let mut state = SessionState::initial();
        state.artifacts.selected_offer = Some(offer("item-2", "prov-1"));
        state.collected_info.mark_provided(CUSTOMER_NAME);

        let err = backfill(&registry, &confirm_op(), &mut state, &mut Map::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required argument(s): customer_name, customer_phone, customer_email"
        );
    }

    #[tokio::test]
    async fn test_incentive_confirm_uses_first_incentive() {
        let registry = OperationRegistry::new();
        let op = MockOperation::new("subsidy_confirm", OperationKind::IncentiveConfirm)
            .with_required(&["provider_id", "item_id"]);
        let mut state = SessionState::initial();
        state.artifacts.incentives = vec![offer("rebate-1", "gov"), offer("rebate-2", "gov")];
        state.artifacts.selected_offer = Some(offer("item-2", "prov-1"));

        let mut args = Map::new();
        backfill(&registry, &op, &mut state, &mut args).await.unwrap();
        assert_eq!(args["item_id"], "rebate-1");
        assert_eq!(args["provider_id"], "gov");
    }

    #[tokio::test]
    async fn test_undeclared_args_are_not_filled() {
        let registry = OperationRegistry::new();
        let op = MockOperation::new("status", OperationKind::OrderStatus);
        let mut state = SessionState::initial();
        state.artifacts.order_id = Some("o-1".to_string());

        let mut args = Map::new();
        backfill(&registry, &op, &mut state, &mut args).await.unwrap();
        assert!(args.is_empty());

        // Optional arguments count as declared
        let op = MockOperation::new("status", OperationKind::OrderStatus).with_optional(&["order_id"]);
        backfill(&registry, &op, &mut state, &mut args).await.unwrap();
        assert_eq!(args["order_id"], "o-1");
    }

    #[tokio::test]
    async fn test_meter_parent_from_lookup() {
        let lookup = Arc::new(
            MockOperation::new("utilities_lookup", OperationKind::UtilityLookup).with_payload(json!({
                "utilities": [{"substations": [{"transformers": [{"id": 41}]}]}]
            })),
        );
        let registry = OperationRegistry::new().with(lookup.clone());
        let meter = MockOperation::new("create_meter", OperationKind::CreateMeter)
            .with_required(&["parent", "energy_resource"]);
        let mut state = SessionState::initial();
        state.artifacts.resource_id = Some("12".to_string());

        let mut args = Map::new();
        backfill(&registry, &meter, &mut state, &mut args).await.unwrap();
        assert_eq!(args["parent"], 41);
        assert_eq!(args["energy_resource"], "12");
        assert!(state.artifacts.utility_data.is_some());
        assert_eq!(lookup.invocation_count(), 1);

        // Cached utility data avoids a second lookup
        let mut again = Map::new();
        backfill(&registry, &meter, &mut state, &mut again).await.unwrap();
        assert_eq!(lookup.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_meter_without_transformer_fails() {
        let registry = OperationRegistry::new().with(Arc::new(
            MockOperation::new("utilities_lookup", OperationKind::UtilityLookup)
                .with_payload(json!({"utilities": []})),
        ));
        let meter = MockOperation::new("create_meter", OperationKind::CreateMeter).with_required(&["parent"]);
        let err = backfill(&registry, &meter, &mut SessionState::initial(), &mut Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "could not find a parent transformer for the meter");
    }
}
