//! Workflow state machine
//!
//! Session state, history events and the pure stage transition function.

pub mod event;
pub mod extract;
pub mod payload;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use event::{Event, OperationKind, OperationOutcome, OperationRequest, OperationResult};
pub use extract::{InfoExtractor, KeywordExtractor};
pub use state::{CollectedInfo, Offer, SessionState, Stage, WorkflowArtifacts};
pub use transition::transition;
