mod config;
mod db;
mod errors;
mod extraction;
mod llm_client;
mod models;
mod pipeline;
mod resumes;
mod routes;
mod scoring;
mod state;
#[cfg(test)]
mod test_support;
mod verification;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::extraction::tagger::LlmEntityTagger;
use crate::extraction::ClaimExtractor;
use crate::llm_client::LlmClient;
use crate::pipeline::ResumePipeline;
use crate::resumes::jobs::{JobRegistry, RetentionSweeper};
use crate::resumes::postgres::PgResumeRepository;
use crate::resumes::repository::{InMemoryResumeRepository, ResumeRepository};
use crate::routes::build_router;
use crate::scoring::classifier::EvidenceClassifier;
use crate::state::AppState;
use crate::verification::certificate::SignatureInspector;
use crate::verification::github::GitHubClient;
use crate::verification::orchestrator::VerificationOrchestrator;

const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let repository = build_repository(&config).await?;
    let pipeline = Arc::new(build_pipeline(&config)?);
    let jobs = JobRegistry::new();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = RetentionSweeper {
        repository: repository.clone(),
        jobs: jobs.clone(),
        retention: config.retention,
        every: SWEEP_INTERVAL,
    }
    .spawn(shutdown_rx);

    let state = AppState {
        config: config.clone(),
        repository,
        pipeline,
        jobs,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        warn!("Retention sweeper ended abnormally: {e}");
    }
    info!("Shutdown complete");
    Ok(())
}

async fn build_repository(config: &Config) -> Result<Arc<dyn ResumeRepository>> {
    match &config.database_url {
        Some(url) => {
            let repo = PgResumeRepository::new(create_pool(url).await?);
            repo.ensure_schema().await?;
            Ok(Arc::new(repo))
        }
        None => {
            warn!("DATABASE_URL not set; resumes are kept in memory only");
            Ok(Arc::new(InMemoryResumeRepository::new()))
        }
    }
}

fn build_pipeline(config: &Config) -> Result<ResumePipeline> {
    let extractor = match &config.anthropic_api_key {
        Some(key) => {
            let llm = LlmClient::new(key.clone())?;
            info!("Entity tagger enabled (model: {})", llm_client::MODEL);
            ClaimExtractor::new(Arc::new(LlmEntityTagger::new(llm)))
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set; claim extraction runs in pattern-only mode");
            ClaimExtractor::pattern_only()
        }
    };

    if config.github_token.is_none() {
        warn!("GITHUB_TOKEN not set; GitHub requests are unauthenticated and heavily rate limited");
    }
    let github = GitHubClient::new(config.github_api_url.clone(), config.github_token.clone())?;

    let orchestrator = VerificationOrchestrator::standard(
        Arc::new(github),
        Arc::new(SignatureInspector),
        config.verify_max_concurrency,
        config.verify_engine_timeout,
    )
    .with_claim_parallelism(config.verify_claim_parallelism);
    info!(
        max_concurrency = config.verify_max_concurrency,
        claim_parallelism = config.verify_claim_parallelism,
        engine_timeout_secs = config.verify_engine_timeout.as_secs(),
        "Verification orchestrator ready"
    );

    Ok(ResumePipeline::new(
        extractor,
        Arc::new(orchestrator),
        Arc::new(EvidenceClassifier::default()),
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
