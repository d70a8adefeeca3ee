//! API request and response types

use crate::state_machine::{CollectedInfo, Event, SessionState, Stage, WorkflowArtifacts};
use serde::{Deserialize, Serialize};

/// Request to process one user message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_message: String,
}

/// Persisted view of a session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub stage: Stage,
    pub history: Vec<Event>,
    pub collected_info: CollectedInfo,
    pub artifacts: WorkflowArtifacts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SessionResponse {
    pub fn new(session_id: String, state: SessionState) -> Self {
        Self {
            session_id,
            stage: state.stage,
            history: state.history,
            collected_info: state.collected_info,
            artifacts: state.artifacts,
            last_error: state.last_error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
