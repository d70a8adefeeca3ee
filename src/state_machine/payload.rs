//! Readers for the payload shapes returned by commerce and provisioning operations

use super::state::Offer;
use serde_json::Value;

/// Render a JSON id (string or number) as a string
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Offers in a catalog response.
///
/// Accepts both flat `message.catalog.items` (each item naming its provider)
/// and nested `message.catalog.providers[].items`.
pub fn catalog_items(payload: &Value) -> Vec<Offer> {
    let catalog = &payload["message"]["catalog"];
    let mut offers = Vec::new();

    if let Some(items) = catalog["items"].as_array() {
        offers.extend(items.iter().filter_map(|item| parse_offer(item, None)));
    }

    if let Some(providers) = catalog["providers"].as_array() {
        for provider in providers {
            let provider_id = id_string(&provider["id"]);
            if let Some(items) = provider["items"].as_array() {
                offers.extend(
                    items
                        .iter()
                        .filter_map(|item| parse_offer(item, provider_id.clone())),
                );
            }
        }
    }

    offers
}

fn parse_offer(item: &Value, provider_id: Option<String>) -> Option<Offer> {
    let id = id_string(&item["id"])?;
    let name = item["descriptor"]["name"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let provider_id = id_string(&item["provider"]["id"]).or(provider_id);
    Some(Offer {
        id,
        name,
        provider_id,
        raw: item.clone(),
    })
}

/// `message.order.id` of a confirm response
pub fn order_id(payload: &Value) -> Option<String> {
    id_string(&payload["message"]["order"]["id"])
}

/// `data.id` of a provisioning create response
pub fn created_id(payload: &Value) -> Option<String> {
    id_string(&payload["data"]["id"])
}

/// First transformer id found in a utility tree
pub fn first_transformer_id(utility_data: &Value) -> Option<Value> {
    let utilities = utility_data["utilities"]
        .as_array()
        .or_else(|| utility_data.as_array())?;

    utilities
        .iter()
        .filter_map(|u| u["substations"].as_array())
        .flatten()
        .filter_map(|s| s["transformers"].as_array())
        .flatten()
        .map(|t| t["id"].clone())
        .find(|id| !id.is_null())
}

/// Whether a utility lookup payload carries any utilities at all
pub fn has_utilities(payload: &Value) -> bool {
    payload["utilities"]
        .as_array()
        .or_else(|| payload.as_array())
        .is_some_and(|u| !u.is_empty())
}
