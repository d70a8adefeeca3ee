//! Inergy - conversational assistant for buying rooftop solar
//!
//! A Rust backend driving a purchase workflow state machine: a decision-maker
//! picks replies or operations, the state machine decides what stage follows.

mod api;
mod config;
mod db;
mod decision;
mod llm;
mod operations;
mod runtime;
mod state_machine;

use api::{create_router, AppState};
use config::Config;
use db::Database;
use decision::{DecisionMaker, LlmDecisionMaker, UnavailableDecisionMaker};
use llm::{AnthropicService, LlmService, LoggingService};
use operations::OperationRegistry;
use runtime::{DatabaseSessionStore, RuntimeManager};
use state_machine::{KeywordExtractor, Stage};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inergy=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    // Initialize database
    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;
    let stuck = db.list_sessions_in_stage(Stage::Error)?;
    if !stuck.is_empty() {
        tracing::info!(count = stuck.len(), "Sessions waiting for user input after an error");
    }

    let registry = Arc::new(OperationRegistry::standard(&config));
    if registry.is_empty() {
        tracing::warn!("No operations configured; every purchase step will fail");
    }
    let decision = decision_maker(&config, &registry);

    let runtime = RuntimeManager::new(
        Arc::new(DatabaseSessionStore::new(db)),
        decision,
        registry,
        Arc::new(KeywordExtractor::new()),
        config.max_iterations,
    );
    let state = AppState::new(Arc::new(runtime));

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new().gzip(true).br(true).deflate(true).zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Inergy server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// LLM-backed decision-maker, or one that always fails when no model is configured
fn decision_maker(config: &Config, registry: &OperationRegistry) -> Arc<dyn DecisionMaker> {
    let llm = &config.llm;
    if llm.anthropic_api_key.is_none() && llm.gateway.is_none() {
        tracing::warn!("No LLM configured. Set ANTHROPIC_API_KEY or LLM_GATEWAY.");
        return Arc::new(UnavailableDecisionMaker::new("no LLM configured"));
    }

    let service: Arc<dyn LlmService> = Arc::new(AnthropicService::new(
        llm.anthropic_api_key.clone().unwrap_or_default(),
        llm.model.as_deref(),
        llm.gateway.as_deref(),
    ));
    tracing::info!(model = %service.model_id(), tools = registry.len(), "Decision-maker ready");

    Arc::new(LlmDecisionMaker::new(
        Arc::new(LoggingService::new(service)),
        registry.definitions(),
    ))
}
