//! Session state types

use super::event::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Stage
// ============================================================================

/// Position of a session in the purchase workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Fresh session, nothing classified yet
    #[default]
    Intake,
    Welcome,
    GatherInfo,
    SearchOffer,
    PresentOptions,
    ConfirmOffer,
    SearchIncentives,
    ApplyIncentives,
    ProvisionResources,
    ReportStatus,
    Done,
    /// Re-entered on every fatal failure; left only by fresh user input
    Error,
}

impl Stage {
    #[cfg(test)]
    pub const ALL: [Stage; 12] = [
        Stage::Intake,
        Stage::Welcome,
        Stage::GatherInfo,
        Stage::SearchOffer,
        Stage::PresentOptions,
        Stage::ConfirmOffer,
        Stage::SearchIncentives,
        Stage::ApplyIncentives,
        Stage::ProvisionResources,
        Stage::ReportStatus,
        Stage::Done,
        Stage::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Welcome => "welcome",
            Stage::GatherInfo => "gather_info",
            Stage::SearchOffer => "search_offer",
            Stage::PresentOptions => "present_options",
            Stage::ConfirmOffer => "confirm_offer",
            Stage::SearchIncentives => "search_incentives",
            Stage::ApplyIncentives => "apply_incentives",
            Stage::ProvisionResources => "provision_resources",
            Stage::ReportStatus => "report_status",
            Stage::Done => "done",
            Stage::Error => "error",
        }
    }

    /// The workflow is fully finished
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done)
    }

    /// Stages where an assistant message ends the turn and the session waits
    /// for the next user message.
    pub fn waits_for_user(self) -> bool {
        matches!(
            self,
            Stage::Welcome
                | Stage::GatherInfo
                | Stage::PresentOptions
                | Stage::ReportStatus
                | Stage::Error
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Collected Info
// ============================================================================

pub const LOCATION: &str = "location";
pub const CONSUMPTION: &str = "consumption";
pub const CUSTOMER_NAME: &str = "customer_name";
pub const CUSTOMER_PHONE: &str = "customer_phone";
pub const CUSTOMER_EMAIL: &str = "customer_email";
pub const FULFILLMENT_ID: &str = "fulfillment_id";

/// Marker stored for fields whose presence matters more than their value
pub const PROVIDED: &str = "provided";

/// User details accumulated across turns.
///
/// Keys are only ever added or overwritten, never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectedInfo(BTreeMap<String, String>);

impl CollectedInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    /// Mark a field as provided without recording a concrete value
    pub fn mark_provided(&mut self, field: impl Into<String>) {
        self.set(field, PROVIDED);
    }

    pub fn is_provided(&self, field: &str) -> bool {
        self.get(field).is_some_and(|v| !v.is_empty())
    }

    /// Both mandatory search inputs are present
    pub fn ready_for_search(&self) -> bool {
        self.is_provided(LOCATION) && self.is_provided(CONSUMPTION)
    }

    /// Fold another partial mapping into this one
    pub fn merge(&mut self, other: CollectedInfo) {
        self.0.extend(other.0);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CollectedInfo {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ============================================================================
// Workflow Artifacts
// ============================================================================

/// A purchasable item returned by a catalog search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Raw catalog entry, kept for presenting prices and details
    #[serde(default)]
    pub raw: Value,
}

/// Identifiers produced by successful operations.
///
/// Identifiers are only ever set, never cleared, for the life of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowArtifacts {
    /// Latest non-empty offer search result
    #[serde(default)]
    pub offers: Vec<Offer>,
    #[serde(default)]
    pub selected_offer: Option<Offer>,
    #[serde(default)]
    pub order_id: Option<String>,
    /// Latest non-empty incentive search result
    #[serde(default)]
    pub incentives: Vec<Offer>,
    #[serde(default)]
    pub incentive_order_id: Option<String>,
    /// Utility/substation/transformer tree from the provisioning service
    #[serde(default)]
    pub utility_data: Option<Value>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub meter_id: Option<String>,
    #[serde(default)]
    pub device_ids: Vec<String>,
}

impl WorkflowArtifacts {
    /// Resource, meter and at least one device exist
    pub fn provisioning_complete(&self) -> bool {
        self.resource_id.is_some() && self.meter_id.is_some() && !self.device_ids.is_empty()
    }

    pub fn add_device(&mut self, id: String) {
        if !self.device_ids.contains(&id) {
            self.device_ids.push(id);
        }
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Complete per-session record, replaced atomically at the end of each turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub stage: Stage,
    #[serde(default)]
    pub history: Vec<Event>,
    #[serde(default)]
    pub collected_info: CollectedInfo,
    #[serde(default)]
    pub artifacts: WorkflowArtifacts,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Only lives for the turn that produced it
    #[serde(skip)]
    pub last_operation_summary: Option<String>,
}

impl SessionState {
    /// The fixed record every new session starts from
    pub fn initial() -> Self {
        Self::default()
    }

    pub fn last_event(&self) -> Option<&Event> {
        self.history.last()
    }

    /// True when the most recent event is an assistant message
    pub fn ends_with_assistant_text(&self) -> bool {
        matches!(self.last_event(), Some(Event::AssistantText { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = SessionState::initial();
        assert_eq!(state.stage, Stage::Intake);
        assert!(state.history.is_empty());
        assert!(state.collected_info.is_empty());
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_summary_is_not_persisted() {
        let mut state = SessionState::initial();
        state.last_operation_summary = Some("Operation 'x' succeeded.".to_string());
        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert!(back.last_operation_summary.is_none());
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&Stage::ProvisionResources).unwrap();
        assert_eq!(json, "\"provision_resources\"");
        for stage in Stage::ALL {
            assert_eq!(format!("\"{stage}\""), serde_json::to_string(&stage).unwrap());
        }
    }

    #[test]
    fn test_merge_keeps_existing_fields() {
        let mut info: CollectedInfo = [(LOCATION, PROVIDED)].into_iter().collect();
        info.merge([(CONSUMPTION, PROVIDED)].into_iter().collect());
        assert!(info.ready_for_search());
        assert_eq!(info.len(), 2);
    }

    #[test]
    fn test_provisioning_complete_requires_all_three() {
        let mut artifacts = WorkflowArtifacts {
            resource_id: Some("1".to_string()),
            meter_id: Some("2".to_string()),
            ..Default::default()
        };
        assert!(!artifacts.provisioning_complete());
        artifacts.add_device("3".to_string());
        artifacts.add_device("3".to_string());
        assert!(artifacts.provisioning_complete());
        assert_eq!(artifacts.device_ids.len(), 1);
    }
}
