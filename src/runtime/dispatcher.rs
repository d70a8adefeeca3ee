//! Operation dispatcher
//!
//! Resolves, backfills and invokes one batch of operation requests. Results
//! come back in request order whatever order the invocations finish in.

use super::backfill::backfill;
use crate::operations::{OperationError, OperationRegistry};
use crate::state_machine::{OperationKind, OperationRequest, OperationResult, SessionState};
use futures::future::join_all;
use serde_json::{Map, Value};

/// Results of one dispatcher pass
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// One result per request, in request order
    pub results: Vec<OperationResult>,
    pub summary: String,
    pub any_failed: bool,
}

/// A request after resolution and backfill
enum Prepared {
    Ready {
        request: OperationRequest,
        kind: OperationKind,
        args: Map<String, Value>,
    },
    Rejected(OperationResult),
}

/// Run every request of a batch.
///
/// Backfill runs first, one request at a time, since it may write to
/// `state.collected_info` and `state.artifacts.utility_data`. Invocations then
/// run concurrently. Stage is never touched here.
pub async fn dispatch(
    registry: &OperationRegistry,
    state: &mut SessionState,
    requests: &[OperationRequest],
) -> BatchOutcome {
    let mut prepared = Vec::with_capacity(requests.len());
    for request in requests {
        prepared.push(prepare(registry, state, request).await);
    }

    let results = join_all(prepared.into_iter().map(|p| async move {
        match p {
            Prepared::Rejected(result) => result,
            Prepared::Ready { request, kind, args } => invoke(registry, request, kind, args).await,
        }
    }))
    .await;

    let any_failed = results.iter().any(|r| !r.is_success());
    let summary = summarize(&results);
    BatchOutcome {
        results,
        summary,
        any_failed,
    }
}

async fn prepare(registry: &OperationRegistry, state: &mut SessionState, request: &OperationRequest) -> Prepared {
    let Some(op) = registry.get(&request.name) else {
        tracing::warn!(operation = %request.name, correlation_id = %request.correlation_id, "Unknown operation requested");
        return Prepared::Rejected(OperationResult::failure(
            &request.correlation_id,
            &request.name,
            OperationKind::Unknown,
            OperationError::NotFound(request.name.clone()).to_string(),
        ));
    };

    let mut args = request.args.clone();
    match backfill(registry, op.as_ref(), state, &mut args).await {
        Ok(()) => Prepared::Ready {
            request: request.clone(),
            kind: op.kind(),
            args,
        },
        Err(e) => {
            tracing::warn!(
                operation = %request.name,
                correlation_id = %request.correlation_id,
                error = %e,
                "Operation rejected before dispatch"
            );
            Prepared::Rejected(OperationResult::failure(
                &request.correlation_id,
                &request.name,
                op.kind(),
                e.to_string(),
            ))
        }
    }
}

async fn invoke(
    registry: &OperationRegistry,
    request: OperationRequest,
    kind: OperationKind,
    args: Map<String, Value>,
) -> OperationResult {
    let started = std::time::Instant::now();
    let outcome = registry.invoke(&request.name, args).await;
    let elapsed_ms = started.elapsed().as_millis();

    match outcome {
        Ok(payload) => {
            tracing::info!(
                operation = %request.name,
                correlation_id = %request.correlation_id,
                elapsed_ms = %elapsed_ms,
                "Operation succeeded"
            );
            OperationResult::success(request.correlation_id, request.name, kind, payload)
        }
        Err(e) => {
            tracing::warn!(
                operation = %request.name,
                correlation_id = %request.correlation_id,
                elapsed_ms = %elapsed_ms,
                error = %e,
                "Operation failed"
            );
            OperationResult::failure(request.correlation_id, request.name, kind, e.to_string())
        }
    }
}

fn summarize(results: &[OperationResult]) -> String {
    if results.is_empty() {
        return "No operations were requested.".to_string();
    }
    results
        .iter()
        .map(|r| match r.error() {
            None => format!("Operation '{}' succeeded.", r.operation),
            Some(error) => format!("Operation '{}' failed: {error}", r.operation),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
