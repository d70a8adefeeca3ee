//! Decision-maker backed by an LLM with tool use

use super::prompt::{session_prompt, BASE_PROMPT};
use super::{ContextSummary, Decision, DecisionError, DecisionMaker};
use crate::llm::{
    ChatMessage, ContentBlock, LlmRequest, LlmResponse, LlmService, PromptSection, Role,
    ToolDefinition,
};
use crate::state_machine::{Event, OperationOutcome, OperationRequest};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
/// Longest operation payload echoed back to the model
const MAX_RESULT_CHARS: usize = 8_000;
const MAX_TOKENS: u32 = 2048;

pub struct LlmDecisionMaker {
    service: Arc<dyn LlmService>,
    tools: Vec<ToolDefinition>,
    base_backoff: Duration,
}

impl LlmDecisionMaker {
    pub fn new(service: Arc<dyn LlmService>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            service,
            tools,
            base_backoff: BASE_BACKOFF,
        }
    }

    /// Override the delay before the first retry (doubles per attempt)
    #[cfg(test)]
    #[must_use]
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    fn build_request(&self, history: &[Event], context: &ContextSummary) -> LlmRequest {
        LlmRequest {
            system: vec![
                PromptSection::stable(BASE_PROMPT),
                PromptSection::per_request(session_prompt(context)),
            ],
            messages: history_to_messages(history),
            tools: self.tools.clone(),
            max_tokens: MAX_TOKENS,
        }
    }
}

#[async_trait]
impl DecisionMaker for LlmDecisionMaker {
    async fn decide(&self, history: &[Event], context: &ContextSummary) -> Result<Decision, DecisionError> {
        let request = self.build_request(history, context);
        let mut attempt = 1;
        loop {
            match self.service.complete(&request).await {
                Ok(response) => return response_to_decision(&response),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = e
                        .retry_after
                        .unwrap_or(self.base_backoff * 2u32.pow(attempt - 1));
                    tracing::warn!(
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Retrying decision-maker request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Tool calls win over text; text alone becomes a reply
fn response_to_decision(response: &LlmResponse) -> Result<Decision, DecisionError> {
    if !response.calls.is_empty() {
        let requests = response
            .calls
            .iter()
            .map(|call| {
                let args = call.input.as_object().cloned().unwrap_or_default();
                OperationRequest::new(&call.id, &call.name, args)
            })
            .collect();
        return Ok(Decision::Operations(requests));
    }

    let text = response.text.trim();
    if text.is_empty() {
        return Err(DecisionError::EmptyResponse);
    }
    Ok(Decision::Reply(text.to_string()))
}

/// Translate the session history into alternating chat messages.
///
/// Requests become tool uses and results become tool results keyed by
/// correlation id; consecutive blocks of the same role are merged.
fn history_to_messages(history: &[Event]) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::new();

    for event in history {
        let (role, blocks) = match event {
            Event::UserText { text } => (Role::User, vec![ContentBlock::text(text)]),
            Event::AssistantText { text } => (Role::Assistant, vec![ContentBlock::text(text)]),
            Event::OperationRequestBatch { requests } => (
                Role::Assistant,
                requests
                    .iter()
                    .map(|r| {
                        ContentBlock::call(&r.correlation_id, &r.name, serde_json::Value::Object(r.args.clone()))
                    })
                    .collect(),
            ),
            Event::OperationResult(result) => {
                let (content, is_error) = match &result.outcome {
                    OperationOutcome::Success { payload } => (truncate(&payload.to_string()), false),
                    OperationOutcome::Failure { error } => (error.clone(), true),
                };
                (
                    Role::User,
                    vec![ContentBlock::call_result(&result.correlation_id, content, is_error)],
                )
            }
        };

        if blocks.is_empty() {
            continue;
        }
        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => messages.push(ChatMessage { role, content: blocks }),
        }
    }

    messages
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_RESULT_CHARS) {
        Some((idx, _)) => format!("{}... [truncated]", s.get(..idx).unwrap_or(s)),
        None => s.to_string(),
    }
}
