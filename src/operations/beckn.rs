//! Commerce network (Beckn) operations
//!
//! Every call POSTs `{context, message}` to `{base_url}/{action}`, with a
//! fresh transaction and message id per request.

use super::{arg_string, read_json, Operation, OperationError};
use crate::config::BecknConfig;
use crate::state_machine::OperationKind;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

const PROTOCOL_VERSION: &str = "1.1.0";
const COUNTRY_CODE: &str = "USA";
const CITY_CODE: &str = "NANP:628";

const RETAIL: &str = "deg:retail";
const SERVICE: &str = "deg:service";
const SCHEMES: &str = "deg:schemes";

const ORDER_ARGS: &[&str] = &["provider_id", "item_id"];
const CONFIRM_ARGS: &[&str] = &[
    "provider_id",
    "item_id",
    "fulfillment_id",
    "customer_name",
    "customer_phone",
    "customer_email",
];
const STATUS_ARGS: &[&str] = &["order_id"];

/// HTTP client bound to one network participant identity
pub struct BecknClient {
    client: Client,
    config: BecknConfig,
}

impl BecknClient {
    pub fn new(config: BecknConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Request context for one protocol call
    pub fn context(&self, action: &str, domain: &str) -> Value {
        json!({
            "domain": domain,
            "action": action,
            "location": {
                "country": {"code": COUNTRY_CODE},
                "city": {"code": CITY_CODE}
            },
            "version": PROTOCOL_VERSION,
            "bap_id": self.config.bap_id,
            "bap_uri": self.config.bap_uri,
            "bpp_id": self.config.bpp_id,
            "bpp_uri": self.config.bpp_uri,
            "transaction_id": uuid::Uuid::new_v4().to_string(),
            "message_id": uuid::Uuid::new_v4().to_string(),
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    pub async fn call(&self, action: &str, domain: &str, message: Value) -> Result<Value, OperationError> {
        let url = format!("{}/{action}", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "context": self.context(action, domain),
            "message": message,
        });
        tracing::debug!(%url, domain, "Beckn request");
        let response = self.client.post(&url).json(&body).send().await?;
        read_json(response).await
    }
}

/// Builds the protocol `message` from validated arguments
type MessageBuilder = fn(&Map<String, Value>) -> Result<Value, OperationError>;

/// Static description of one protocol call
struct BecknAction {
    name: &'static str,
    description: &'static str,
    kind: OperationKind,
    action: &'static str,
    domain: &'static str,
    required: &'static [&'static str],
    message: MessageBuilder,
}

const ACTIONS: &[BecknAction] = &[
    BecknAction {
        name: "solar_retail_search",
        description: "Search the retail catalog for rooftop solar offers. Call once the user's location and electricity consumption are known.",
        kind: OperationKind::OfferSearch,
        action: "search",
        domain: RETAIL,
        required: &[],
        message: solar_intent,
    },
    BecknAction {
        name: "solar_retail_select",
        description: "Select a solar offer from the latest search results.",
        kind: OperationKind::OfferSelect,
        action: "select",
        domain: RETAIL,
        required: ORDER_ARGS,
        message: order_message,
    },
    BecknAction {
        name: "solar_retail_init",
        description: "Initialise an order for the selected solar offer.",
        kind: OperationKind::OfferInit,
        action: "init",
        domain: RETAIL,
        required: ORDER_ARGS,
        message: order_message,
    },
    BecknAction {
        name: "solar_retail_confirm",
        description: "Confirm the order for the selected solar offer with the customer's contact details.",
        kind: OperationKind::OfferConfirm,
        action: "confirm",
        domain: RETAIL,
        required: CONFIRM_ARGS,
        message: confirm_message,
    },
    BecknAction {
        name: "solar_retail_status",
        description: "Check the status of a confirmed solar order.",
        kind: OperationKind::OrderStatus,
        action: "status",
        domain: RETAIL,
        required: STATUS_ARGS,
        message: status_message,
    },
    BecknAction {
        name: "connection_search",
        description: "Search for grid connection services.",
        kind: OperationKind::ConnectionSearch,
        action: "search",
        domain: SERVICE,
        required: &[],
        message: connection_intent,
    },
    BecknAction {
        name: "subsidy_search",
        description: "Search for incentive and subsidy programs available after a solar purchase.",
        kind: OperationKind::IncentiveSearch,
        action: "search",
        domain: SCHEMES,
        required: &[],
        message: incentive_intent,
    },
    BecknAction {
        name: "subsidy_confirm",
        description: "Enrol the customer in an incentive program from the latest incentive search.",
        kind: OperationKind::IncentiveConfirm,
        action: "confirm",
        domain: SCHEMES,
        required: CONFIRM_ARGS,
        message: confirm_message,
    },
];

fn intent(name: &str) -> Value {
    json!({"intent": {"item": {"descriptor": {"name": name}}}})
}

fn solar_intent(_: &Map<String, Value>) -> Result<Value, OperationError> {
    Ok(intent("solar"))
}

fn connection_intent(_: &Map<String, Value>) -> Result<Value, OperationError> {
    Ok(intent("Connection"))
}

fn incentive_intent(_: &Map<String, Value>) -> Result<Value, OperationError> {
    Ok(intent("incentive"))
}

fn order_message(args: &Map<String, Value>) -> Result<Value, OperationError> {
    Ok(json!({
        "order": {
            "provider": {"id": arg_string(args, "provider_id")?},
            "items": [{"id": arg_string(args, "item_id")?}]
        }
    }))
}

fn confirm_message(args: &Map<String, Value>) -> Result<Value, OperationError> {
    let mut message = order_message(args)?;
    message["order"]["fulfillments"] = json!([{
        "id": arg_string(args, "fulfillment_id")?,
        "customer": {
            "person": {"name": arg_string(args, "customer_name")?},
            "contact": {
                "phone": arg_string(args, "customer_phone")?,
                "email": arg_string(args, "customer_email")?
            }
        }
    }]);
    Ok(message)
}

fn status_message(args: &Map<String, Value>) -> Result<Value, OperationError> {
    Ok(json!({"order_id": arg_string(args, "order_id")?}))
}

/// One protocol call exposed as an operation
pub struct BecknOperation {
    action: &'static BecknAction,
    client: Arc<BecknClient>,
}

impl BecknOperation {
    /// Every commerce operation, sharing one client
    pub fn all(client: &Arc<BecknClient>) -> Vec<Self> {
        ACTIONS
            .iter()
            .map(|action| Self {
                action,
                client: client.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl Operation for BecknOperation {
    fn name(&self) -> &str {
        self.action.name
    }

    fn description(&self) -> String {
        self.action.description.to_string()
    }

    fn kind(&self) -> OperationKind {
        self.action.kind
    }

    fn required_args(&self) -> &'static [&'static str] {
        self.action.required
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Value, OperationError> {
        let message = (self.action.message)(&args)?;
        self.client
            .call(self.action.action, self.action.domain, message)
            .await
    }
}
