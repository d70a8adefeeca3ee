//! Provisioning (World Engine) operations

use super::{arg_string, read_json, Operation, OperationError};
use crate::state_machine::OperationKind;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub struct WorldEngineClient {
    client: Client,
    base_url: String,
}

impl WorldEngineClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn get(&self, path: &str) -> Result<Value, OperationError> {
        let response = self.client.get(self.url(path)).send().await?;
        read_json(response).await
    }

    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<Value, OperationError> {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        read_json(request.send().await?).await
    }
}

/// Read a numeric argument, accepting numeric strings
fn arg_number(args: &Map<String, Value>, name: &str) -> Result<Value, OperationError> {
    match args.get(name) {
        Some(Value::Number(n)) => Ok(Value::Number(n.clone())),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|f| {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    #[allow(clippy::cast_possible_truncation)]
                    Some(json!(f as i64))
                } else {
                    serde_json::Number::from_f64(f).map(Value::Number)
                }
            })
            .ok_or_else(|| OperationError::InvalidArg {
                name: name.to_string(),
                reason: format!("'{s}' is not a number"),
            }),
        Some(Value::Null) | None => Err(OperationError::MissingArgs(vec![name.to_string()])),
        Some(other) => Err(OperationError::InvalidArg {
            name: name.to_string(),
            reason: format!("expected number, got {other}"),
        }),
    }
}

fn optional_number(args: &Map<String, Value>, name: &str) -> Result<Option<Value>, OperationError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => arg_number(args, name).map(Some),
    }
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "required": required,
        "properties": properties,
    })
}

// ============================================================================
// Utility lookup
// ============================================================================

/// Read-only view of utilities, substations and transformers
pub struct UtilitiesLookupOperation {
    client: Arc<WorldEngineClient>,
}

impl UtilitiesLookupOperation {
    pub fn new(client: Arc<WorldEngineClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Operation for UtilitiesLookupOperation {
    fn name(&self) -> &'static str {
        "utilities_lookup"
    }

    fn description(&self) -> String {
        "Fetch the utility, substation and transformer tree. A transformer id is needed as the parent of a new meter.".to_string()
    }

    fn kind(&self) -> OperationKind {
        OperationKind::UtilityLookup
    }

    fn required_args(&self) -> &'static [&'static str] {
        &[]
    }

    async fn invoke(&self, _args: Map<String, Value>) -> Result<Value, OperationError> {
        self.client.get("/utility/detailed").await
    }
}

// ============================================================================
// Energy resource
// ============================================================================

/// Creates the household energy resource
pub struct CreateEnergyResourceOperation {
    client: Arc<WorldEngineClient>,
}

impl CreateEnergyResourceOperation {
    pub fn new(client: Arc<WorldEngineClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Operation for CreateEnergyResourceOperation {
    fn name(&self) -> &'static str {
        "create_energy_resource"
    }

    fn description(&self) -> String {
        "Create the customer's household energy resource. Do this first when provisioning.".to_string()
    }

    fn kind(&self) -> OperationKind {
        OperationKind::CreateResource
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn optional_args(&self) -> &'static [&'static str] {
        &["type", "meter"]
    }

    fn input_schema(&self) -> Value {
        schema(
            json!({
                "name": {"type": "string", "description": "Display name, e.g. \"Jane's Home\""},
                "type": {"type": "string", "enum": ["CONSUMER", "PROSUMER"]},
                "meter": {"type": "integer", "description": "Existing meter id"}
            }),
            self.required_args(),
        )
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Value, OperationError> {
        let mut data = json!({
            "name": arg_string(&args, "name")?,
            "type": args.get("type").and_then(Value::as_str).unwrap_or("CONSUMER"),
        });
        if let Some(meter) = optional_number(&args, "meter")? {
            data["meter"] = meter;
        }
        self.client
            .post("/energy-resources", Some(&json!({ "data": data })))
            .await
    }
}

// ============================================================================
// Meter
// ============================================================================

/// Creates a meter under a transformer
pub struct CreateMeterOperation {
    client: Arc<WorldEngineClient>,
}

impl CreateMeterOperation {
    pub fn new(client: Arc<WorldEngineClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Operation for CreateMeterOperation {
    fn name(&self) -> &'static str {
        "create_meter"
    }

    fn description(&self) -> String {
        "Create a smart meter for the customer's energy resource. The parent is a transformer id; it is looked up automatically when omitted.".to_string()
    }

    fn kind(&self) -> OperationKind {
        OperationKind::CreateMeter
    }

    fn required_args(&self) -> &'static [&'static str] {
        &[
            "code",
            "city",
            "state",
            "latitude",
            "longitude",
            "pincode",
            "parent",
            "energy_resource",
        ]
    }

    fn optional_args(&self) -> &'static [&'static str] {
        &["type", "consumption_load_factor", "production_load_factor"]
    }

    fn input_schema(&self) -> Value {
        schema(
            json!({
                "code": {"type": "string", "description": "Unique meter code, e.g. METER003"},
                "type": {"type": "string", "enum": ["SMART", "ANALOG"]},
                "city": {"type": "string"},
                "state": {"type": "string"},
                "latitude": {"type": "number"},
                "longitude": {"type": "number"},
                "pincode": {"type": "string"},
                "parent": {"type": "integer", "description": "Transformer id"},
                "energy_resource": {"type": "integer", "description": "Energy resource id"},
                "consumption_load_factor": {"type": "number"},
                "production_load_factor": {"type": "number"}
            }),
            &["code", "city", "state", "latitude", "longitude", "pincode"],
        )
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Value, OperationError> {
        let data = json!({
            "code": arg_string(&args, "code")?,
            "parent": arg_number(&args, "parent")?,
            "energyResource": arg_number(&args, "energy_resource")?,
            "consumptionLoadFactor": optional_number(&args, "consumption_load_factor")?.unwrap_or(json!(1.0)),
            "productionLoadFactor": optional_number(&args, "production_load_factor")?.unwrap_or(json!(0.0)),
            "type": args.get("type").and_then(Value::as_str).unwrap_or("SMART"),
            "city": arg_string(&args, "city")?,
            "state": arg_string(&args, "state")?,
            "latitude": arg_number(&args, "latitude")?,
            "longitude": arg_number(&args, "longitude")?,
            "pincode": arg_string(&args, "pincode")?,
        });
        self.client.post("/meters", Some(&json!({ "data": data }))).await
    }
}

// ============================================================================
// Distributed energy resource
// ============================================================================

/// Registers an appliance as a DER of the energy resource
pub struct CreateDerOperation {
    client: Arc<WorldEngineClient>,
}

impl CreateDerOperation {
    pub fn new(client: Arc<WorldEngineClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Operation for CreateDerOperation {
    fn name(&self) -> &'static str {
        "create_der"
    }

    fn description(&self) -> String {
        "Register the purchased solar system as a distributed energy resource (DER) of the customer's energy resource.".to_string()
    }

    fn kind(&self) -> OperationKind {
        OperationKind::CreateDevice
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["energy_resource_id", "appliance_id"]
    }

    fn optional_args(&self) -> &'static [&'static str] {
        &["switched_on"]
    }

    fn input_schema(&self) -> Value {
        schema(
            json!({
                "energy_resource_id": {"type": "integer"},
                "appliance_id": {"type": "integer"},
                "switched_on": {"type": "boolean"}
            }),
            &["appliance_id"],
        )
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Value, OperationError> {
        let body = json!({
            "energy_resource": arg_number(&args, "energy_resource_id")?,
            "appliance": arg_number(&args, "appliance_id")?,
            "switched_on": args.get("switched_on").and_then(Value::as_bool).unwrap_or(true),
        });
        self.client.post("/der", Some(&body)).await
    }
}

/// Flips a DER's switching state
pub struct ToggleDerOperation {
    client: Arc<WorldEngineClient>,
}

impl ToggleDerOperation {
    pub fn new(client: Arc<WorldEngineClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Operation for ToggleDerOperation {
    fn name(&self) -> &'static str {
        "toggle_der_switching"
    }

    fn description(&self) -> String {
        "Toggle a DER on or off.".to_string()
    }

    fn kind(&self) -> OperationKind {
        OperationKind::ToggleDevice
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["der_id"]
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Value, OperationError> {
        let id = arg_string(&args, "der_id")?;
        self.client.post(&format!("/toggle-der/{id}"), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };

    async fn fake_world_engine() -> Arc<WorldEngineClient> {
        let app = Router::new()
            .route(
                "/utility/detailed",
                get(|| async {
                    Json(json!({"utilities": [{"substations": [{"transformers": [{"id": 7}]}]}]}))
                }),
            )
            .route(
                "/meters",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({"data": {"id": 31, "received": body["data"]}}))
                }),
            )
            .route(
                "/der",
                post(|Json(body): Json<Value>| async move { Json(json!({"data": {"id": 5, "received": body}})) }),
            )
            .route(
                "/toggle-der/:id",
                post(|Path(id): Path<String>| async move {
                    if id == "404" {
                        Err((StatusCode::NOT_FOUND, "no such der"))
                    } else {
                        Ok(Json(json!({"data": {"id": id, "switched_on": false}})))
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Arc::new(WorldEngineClient::new(&format!("http://{addr}/")))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_arg_number_parses_strings() {
        let a = args(json!({"a": "12", "b": "37.5", "c": "x", "d": 3}));
        assert_eq!(arg_number(&a, "a").unwrap(), json!(12));
        assert_eq!(arg_number(&a, "b").unwrap(), json!(37.5));
        assert!(matches!(arg_number(&a, "c"), Err(OperationError::InvalidArg { .. })));
        assert_eq!(arg_number(&a, "d").unwrap(), json!(3));
    }

    #[tokio::test]
    async fn test_utilities_lookup() {
        let op = UtilitiesLookupOperation::new(fake_world_engine().await);
        let payload = op.invoke(Map::new()).await.unwrap();
        assert_eq!(
            crate::state_machine::payload::first_transformer_id(&payload),
            Some(json!(7))
        );
    }

    #[tokio::test]
    async fn test_create_meter_body() {
        let op = CreateMeterOperation::new(fake_world_engine().await);
        let payload = op
            .invoke(args(json!({
                "code": "METER003", "city": "San Francisco", "state": "California",
                "latitude": 37.7749, "longitude": "-122.4194", "pincode": 94103,
                "parent": 7, "energy_resource": "12"
            })))
            .await
            .unwrap();
        let sent = &payload["data"]["received"];
        assert_eq!(sent["energyResource"], json!(12));
        assert_eq!(sent["parent"], json!(7));
        assert_eq!(sent["pincode"], "94103");
        assert_eq!(sent["type"], "SMART");
        assert_eq!(sent["consumptionLoadFactor"], json!(1.0));
    }

    #[tokio::test]
    async fn test_create_der_defaults_switched_on() {
        let op = CreateDerOperation::new(fake_world_engine().await);
        let payload = op
            .invoke(args(json!({"energy_resource_id": 12, "appliance_id": 3})))
            .await
            .unwrap();
        assert_eq!(payload["data"]["received"]["switched_on"], true);
        assert_eq!(payload["data"]["received"]["energy_resource"], 12);
    }

    #[tokio::test]
    async fn test_toggle_status_error() {
        let op = ToggleDerOperation::new(fake_world_engine().await);
        assert!(op.invoke(args(json!({"der_id": 9}))).await.is_ok());
        let err = op.invoke(args(json!({"der_id": 404}))).await.unwrap_err();
        assert!(matches!(err, OperationError::Status { status: 404, .. }));
    }
}
