//! Events recorded in a session's history

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entries of the conversation record. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    UserText { text: String },
    AssistantText { text: String },
    OperationRequestBatch { requests: Vec<OperationRequest> },
    OperationResult(OperationResult),
}

impl Event {
    pub fn user(text: impl Into<String>) -> Self {
        Event::UserText { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Event::AssistantText { text: text.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::UserText { .. } => "user_text",
            Event::AssistantText { .. } => "assistant_text",
            Event::OperationRequestBatch { .. } => "operation_request_batch",
            Event::OperationResult(_) => "operation_result",
        }
    }
}

/// What an operation does, as far as the workflow is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    OfferSearch,
    OfferSelect,
    OfferInit,
    OfferConfirm,
    OrderStatus,
    ConnectionSearch,
    IncentiveSearch,
    IncentiveConfirm,
    UtilityLookup,
    CreateResource,
    CreateMeter,
    CreateDevice,
    ToggleDevice,
    /// Name did not resolve to a registered operation
    Unknown,
}

/// One operation invocation requested by the decision-maker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub correlation_id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl OperationRequest {
    pub fn new(correlation_id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Success payload or failure detail of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationOutcome {
    Success { payload: Value },
    Failure { error: String },
}

/// Outcome of one request, correlated back to its batch entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub correlation_id: String,
    pub operation: String,
    pub kind: OperationKind,
    pub outcome: OperationOutcome,
}

impl OperationResult {
    pub fn success(
        correlation_id: impl Into<String>,
        operation: impl Into<String>,
        kind: OperationKind,
        payload: Value,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            operation: operation.into(),
            kind,
            outcome: OperationOutcome::Success { payload },
        }
    }

    pub fn failure(
        correlation_id: impl Into<String>,
        operation: impl Into<String>,
        kind: OperationKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            operation: operation.into(),
            kind,
            outcome: OperationOutcome::Failure {
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, OperationOutcome::Success { .. })
    }

    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            OperationOutcome::Success { payload } => Some(payload),
            OperationOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            OperationOutcome::Success { .. } => None,
            OperationOutcome::Failure { error } => Some(error),
        }
    }
}
