//! Mock implementations for testing
//!
//! These mocks enable turn-level testing without network I/O.

use crate::decision::{ContextSummary, Decision, DecisionError, DecisionMaker};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use crate::operations::{Operation, OperationError};
use crate::state_machine::{Event, OperationKind, OperationRequest};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock LLM Service
// ============================================================================

/// Mock LLM service that returns queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Mock Decision Maker
// ============================================================================

/// Decision-maker that replays queued decisions and records its inputs
pub struct MockDecisionMaker {
    decisions: Mutex<VecDeque<Result<Decision, DecisionError>>>,
    calls: Mutex<Vec<(Vec<Event>, ContextSummary)>>,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MockDecisionMaker {
    pub fn new() -> Self {
        Self {
            decisions: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Most decide calls that were ever in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn queue_reply(&self, text: &str) {
        self.decisions
            .lock()
            .unwrap()
            .push_back(Ok(Decision::Reply(text.to_string())));
    }

    pub fn queue_operations(&self, requests: Vec<OperationRequest>) {
        self.decisions
            .lock()
            .unwrap()
            .push_back(Ok(Decision::Operations(requests)));
    }

    /// Queue a single request with a generated correlation id
    pub fn queue_operation(&self, name: &str, args: Value) {
        let n = self.calls.lock().unwrap().len() + self.decisions.lock().unwrap().len();
        let args = args.as_object().cloned().unwrap_or_default();
        self.queue_operations(vec![OperationRequest::new(format!("call-{n}"), name, args)]);
    }

    pub fn queue_error(&self, error: DecisionError) {
        self.decisions.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_calls(&self) -> Vec<(Vec<Event>, ContextSummary)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.decisions.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionMaker for MockDecisionMaker {
    async fn decide(&self, history: &[Event], context: &ContextSummary) -> Result<Decision, DecisionError> {
        self.calls
            .lock()
            .unwrap()
            .push((history.to_vec(), context.clone()));
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(DecisionError::Unavailable("no mock decision queued".to_string())))
    }
}

// ============================================================================
// Mock Operation
// ============================================================================

/// Operation with a canned outcome and an optional delay
pub struct MockOperation {
    name: String,
    kind: OperationKind,
    required: &'static [&'static str],
    optional: &'static [&'static str],
    response: Mutex<Result<Value, String>>,
    delay: Duration,
    /// Arguments of every invocation, in call order
    pub invocations: Mutex<Vec<Map<String, Value>>>,
}

impl MockOperation {
    pub fn new(name: &str, kind: OperationKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: &[],
            optional: &[],
            response: Mutex::new(Ok(json!({"ok": true}))),
            delay: Duration::ZERO,
            invocations: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_required(mut self, args: &'static [&'static str]) -> Self {
        self.required = args;
        self
    }

    #[must_use]
    pub fn with_optional(mut self, args: &'static [&'static str]) -> Self {
        self.optional = args;
        self
    }

    #[must_use]
    pub fn with_payload(self, payload: Value) -> Self {
        *self.response.lock().unwrap() = Ok(payload);
        self
    }

    #[must_use]
    pub fn with_failure(self, error: &str) -> Self {
        *self.response.lock().unwrap() = Err(error.to_string());
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn last_args(&self) -> Option<Map<String, Value>> {
        self.invocations.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Operation for MockOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Mock {}", self.name)
    }

    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn required_args(&self) -> &'static [&'static str] {
        self.required
    }

    fn optional_args(&self) -> &'static [&'static str] {
        self.optional
    }

    async fn invoke(&self, args: Map<String, Value>) -> Result<Value, OperationError> {
        self.invocations.lock().unwrap().push(args);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response
            .lock()
            .unwrap()
            .clone()
            .map_err(OperationError::Remote)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::SessionState;

    #[tokio::test]
    async fn test_mock_llm_service() {
        let mock = MockLlmService::new();
        mock.queue_response(LlmResponse {
            text: "Hello".to_string(),
            ..LlmResponse::default()
        });

        let request = LlmRequest {
            system: vec![],
            messages: vec![],
            tools: vec![],
            max_tokens: 100,
        };

        let response = mock.complete(&request).await.unwrap();
        assert_eq!(response.text, "Hello");

        // Second call should fail (no more responses)
        assert!(mock.complete(&request).await.is_err());
        assert_eq!(mock.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_decision_maker_runs_dry() {
        let maker = MockDecisionMaker::new();
        maker.queue_operation("solar_retail_search", json!({}));
        let context = ContextSummary::from_state(&SessionState::initial());

        assert!(matches!(
            maker.decide(&[], &context).await,
            Ok(Decision::Operations(requests)) if requests[0].correlation_id == "call-0"
        ));
        assert!(matches!(
            maker.decide(&[], &context).await,
            Err(DecisionError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_operation_records_and_fails() {
        let op = MockOperation::new("subsidy_search", OperationKind::IncentiveSearch).with_failure("down");
        let err = op.invoke(Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "remote error: down");
        assert_eq!(op.invocation_count(), 1);
    }
}
