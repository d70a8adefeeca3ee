//! Runtime for processing turns
//!
//! Turns for one session run strictly one after another; turns for
//! different sessions run in parallel.

mod backfill;
mod controller;
mod dispatcher;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::*;

use controller::TurnController;

use crate::decision::DecisionMaker;
use crate::operations::OperationRegistry;
use crate::state_machine::{InfoExtractor, SessionState, Stage};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::Instrument;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("invalid turn: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Visible result of one turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResponse {
    pub session_id: String,
    pub responses: Vec<String>,
    pub stage: Stage,
}

type SessionLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Shared entry point for all sessions
pub struct RuntimeManager {
    store: Arc<dyn SessionStore>,
    decision: Arc<dyn DecisionMaker>,
    registry: Arc<OperationRegistry>,
    extractor: Arc<dyn InfoExtractor>,
    max_iterations: usize,
    locks: SessionLocks,
}

impl RuntimeManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        decision: Arc<dyn DecisionMaker>,
        registry: Arc<OperationRegistry>,
        extractor: Arc<dyn InfoExtractor>,
        max_iterations: usize,
    ) -> Self {
        Self {
            store,
            decision,
            registry,
            extractor,
            max_iterations: max_iterations.max(1),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one user message to completion and persist the result.
    ///
    /// Workflow failures come back as responses; only invalid input and
    /// storage failures are errors.
    pub async fn process_turn(&self, session_id: &str, user_text: &str) -> Result<TurnResponse, TurnError> {
        if session_id.trim().is_empty() {
            return Err(TurnError::Validation("session_id must not be empty".to_string()));
        }
        if user_text.trim().is_empty() {
            return Err(TurnError::Validation("user_message must not be empty".to_string()));
        }

        let span = tracing::info_span!("turn", session_id = %session_id);
        async {
            let slot = self.session_slot(session_id);
            let _guard = slot.mutex.lock().await;

            let state = self.store.get_or_create(session_id).await?;
            tracing::info!(stage = %state.stage, "Processing turn");

            let controller = TurnController {
                decision: self.decision.as_ref(),
                registry: self.registry.as_ref(),
                extractor: self.extractor.as_ref(),
                max_iterations: self.max_iterations,
            };
            let outcome = controller.run(state, user_text).await;

            self.store.put(session_id, &outcome.state).await?;
            tracing::info!(
                stage = %outcome.state.stage,
                responses = outcome.responses.len(),
                "Turn finished"
            );

            Ok(TurnResponse {
                session_id: session_id.to_string(),
                responses: outcome.responses,
                stage: outcome.state.stage,
            })
        }
        .instrument(span)
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        self.store.load(session_id).await
    }

    /// Evict a session; a turn in flight for it finishes first
    pub async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        let result = {
            let slot = self.session_slot(session_id);
            let _guard = slot.mutex.lock().await;
            self.store.delete(session_id).await
        };
        tracing::info!(session_id = %session_id, deleted = result.is_ok(), "Session eviction");
        result
    }

    fn session_slot(&self, session_id: &str) -> SessionSlot<'_> {
        let mutex = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.to_string())
            .or_default()
            .clone();
        SessionSlot {
            locks: &self.locks,
            session_id: session_id.to_string(),
            mutex,
        }
    }
}

/// A claim on one session's turn mutex.
///
/// The map entry lives while any slot for the session exists, so every
/// waiter queues on the same mutex. The last slot dropped removes it.
struct SessionSlot<'a> {
    locks: &'a SessionLocks,
    session_id: String,
    mutex: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for SessionSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Held only by the map and this slot
        if Arc::strong_count(&self.mutex) == 2 {
            locks.remove(&self.session_id);
        }
    }
}
