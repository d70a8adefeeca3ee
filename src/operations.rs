//! Operations the decision-maker can request
//!
//! Every operation declares its name, kind and argument contract up front so
//! the dispatcher can backfill and validate arguments before invoking it.

mod beckn;
mod world_engine;

pub use beckn::{BecknClient, BecknOperation};
pub use world_engine::{
    CreateDerOperation, CreateEnergyResourceOperation, CreateMeterOperation,
    ToggleDerOperation, UtilitiesLookupOperation, WorldEngineClient,
};

use crate::config::Config;
use crate::llm::ToolDefinition;
use crate::state_machine::OperationKind;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Why an operation invocation failed
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("operation not found: {0}")]
    NotFound(String),
    #[error("missing required argument(s): {}", .0.join(", "))]
    MissingArgs(Vec<String>),
    #[error("invalid argument '{name}': {reason}")]
    InvalidArg { name: String, reason: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("remote error: {0}")]
    Remote(String),
    /// A backfilled argument could not be derived from the session
    #[error("{0}")]
    Unresolved(String),
}

/// A named, side-effecting external call
#[async_trait]
pub trait Operation: Send + Sync {
    fn name(&self) -> &str;

    /// Description offered to the decision-maker
    fn description(&self) -> String;

    fn kind(&self) -> OperationKind;

    fn required_args(&self) -> &'static [&'static str];

    fn optional_args(&self) -> &'static [&'static str] {
        &[]
    }

    /// JSON schema for the arguments; string-typed unless overridden
    fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .required_args()
            .iter()
            .chain(self.optional_args())
            .map(|arg| ((*arg).to_string(), json!({"type": "string"})))
            .collect();
        json!({
            "type": "object",
            "required": self.required_args(),
            "properties": properties,
        })
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Value, OperationError>;
}

/// Required arguments absent, null or blank in `args`
pub fn missing_args(op: &dyn Operation, args: &Map<String, Value>) -> Vec<String> {
    op.required_args()
        .iter()
        .filter(|arg| args.get(**arg).map_or(true, is_blank))
        .map(|arg| (*arg).to_string())
        .collect()
}

/// Null or a string with nothing but whitespace
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Read an argument as a string, accepting numbers
pub(crate) fn arg_string(args: &Map<String, Value>, name: &str) -> Result<String, OperationError> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Null) | None => Err(OperationError::MissingArgs(vec![name.to_string()])),
        Some(other) => Err(OperationError::InvalidArg {
            name: name.to_string(),
            reason: format!("expected string, got {other}"),
        }),
    }
}

/// Turn an HTTP response into a JSON payload, surfacing remote errors
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value, OperationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OperationError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let payload: Value = response.json().await?;
    match payload.get("error") {
        None | Some(Value::Null) => Ok(payload),
        Some(Value::String(message)) => Err(OperationError::Remote(message.clone())),
        Some(other) => Err(OperationError::Remote(other.to_string())),
    }
}

/// Operations available to sessions.
///
/// Read-only after construction and shared by all turns.
#[derive(Default)]
pub struct OperationRegistry {
    operations: Vec<Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every operation whose backing service is configured
    pub fn standard(config: &Config) -> Self {
        let mut registry = Self::new();

        match &config.beckn {
            Some(beckn) => {
                let client = Arc::new(BecknClient::new(beckn.clone()));
                for op in BecknOperation::all(&client) {
                    registry.register(Arc::new(op));
                }
            }
            None => tracing::warn!("BECKN_BASE_URL not set, commerce operations disabled"),
        }

        match &config.world_engine_url {
            Some(url) => {
                let client = Arc::new(WorldEngineClient::new(url));
                registry.register(Arc::new(UtilitiesLookupOperation::new(client.clone())));
                registry.register(Arc::new(CreateEnergyResourceOperation::new(client.clone())));
                registry.register(Arc::new(CreateMeterOperation::new(client.clone())));
                registry.register(Arc::new(CreateDerOperation::new(client.clone())));
                registry.register(Arc::new(ToggleDerOperation::new(client)));
            }
            None => tracing::warn!("WORLD_ENGINE_BASE_URL not set, provisioning operations disabled"),
        }

        tracing::info!(count = registry.len(), "Operation registry ready");
        registry
    }

    /// Add an operation, replacing any existing one with the same name
    pub fn register(&mut self, op: Arc<dyn Operation>) {
        self.operations.retain(|existing| existing.name() != op.name());
        self.operations.push(op);
    }

    #[cfg(test)]
    #[must_use]
    pub fn with(mut self, op: Arc<dyn Operation>) -> Self {
        self.register(op);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.iter().find(|op| op.name() == name).cloned()
    }

    /// First registered operation of the given kind
    pub fn find_kind(&self, kind: OperationKind) -> Option<Arc<dyn Operation>> {
        self.operations.iter().find(|op| op.kind() == kind).cloned()
    }

    #[cfg(test)]
    pub fn names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Definitions offered to the decision-maker as tools
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.operations
            .iter()
            .map(|op| ToolDefinition {
                name: op.name().to_string(),
                description: op.description(),
                input_schema: op.input_schema(),
            })
            .collect()
    }

    /// Look up, validate and invoke one operation
    pub async fn invoke(&self, name: &str, args: Map<String, Value>) -> Result<Value, OperationError> {
        let op = self
            .get(name)
            .ok_or_else(|| OperationError::NotFound(name.to_string()))?;
        let missing = missing_args(op.as_ref(), &args);
        if !missing.is_empty() {
            return Err(OperationError::MissingArgs(missing));
        }
        op.invoke(args).await
    }
}
