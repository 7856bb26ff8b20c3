mod config;
mod db;
mod embedding;
mod errors;
mod llm_client;
mod matching;
mod models;
mod profile;
mod routes;
mod screening;
mod state;
mod store;
mod tasks;
#[cfg(test)]
mod testing;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::db::create_pool;
use crate::embedding::client::HttpEmbeddingClient;
use crate::embedding::EmbeddingGateway;
use crate::llm_client::LlmClient;
use crate::matching::scorer::MatchScorer;
use crate::matching::vector_index::PgVectorIndex;
use crate::profile::document::DocumentTextExtractor;
use crate::profile::extractor::ProfileExtractor;
use crate::routes::build_router;
use crate::screening::orchestrator::ScreeningOrchestrator;
use crate::state::AppState;
use crate::store::documents::S3DocumentStore;
use crate::store::postgres::PgStore;
use crate::tasks::executor::PipelineExecutor;
use crate::tasks::queue::PgWorkQueue;
use crate::tasks::runner::TaskRunner;
use crate::tasks::signal::RedisSignal;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TalentMatch API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize Redis (worker wake-up signal)
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Initialize S3 / MinIO (resume documents)
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Initialize AI providers
    let llm = Arc::new(LlmClient::new(
        config.anthropic_api_key.clone(),
        config.provider_timeout,
    ));
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let embeddings = Arc::new(EmbeddingGateway::new(
        Arc::new(HttpEmbeddingClient::new(
            config.embedding.api_url.clone(),
            config.embedding.api_key.clone(),
            config.embedding.model.clone(),
            config.provider_timeout,
        )),
        config.embedding.dimensions,
        config.embedding.max_chars,
        config.provider_timeout,
    ));
    info!(
        "Embedding gateway initialized ({}, {} dimensions)",
        config.embedding.model, config.embedding.dimensions
    );

    // Persistence seams
    let store = Arc::new(PgStore::new(db.clone()));
    let queue = Arc::new(PgWorkQueue::new(db.clone()));
    let signal = Arc::new(RedisSignal::new(redis));
    let documents = Arc::new(S3DocumentStore::new(s3, config.s3_bucket.clone()));
    let vector_index = Arc::new(PgVectorIndex::new(db));

    let scorer = Arc::new(MatchScorer::new(config.matching.clone()));
    let screening = Arc::new(ScreeningOrchestrator::new(
        store.clone(),
        store.clone(),
        llm.clone(),
        scorer.clone(),
        config.screening_stale_after,
    ));

    // Background workers
    let executor = Arc::new(PipelineExecutor::new(
        store.clone(),
        documents.clone(),
        Arc::new(DocumentTextExtractor),
        ProfileExtractor::new(llm),
        embeddings,
        screening.clone(),
        queue.clone(),
        signal.clone(),
    ));
    let runner = Arc::new(TaskRunner::new(
        queue.clone(),
        executor,
        signal.clone(),
        config.runner.clone(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = runner.spawn(shutdown_rx);

    // Build app state
    let state = AppState {
        store,
        queue,
        signal,
        documents,
        vector_index,
        scorer,
        screening,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    // In-flight items finish; anything abandoned is recovered by the lease sweep.
    shutdown_tx.send_replace(true);
    for worker in workers {
        let _ = worker.await;
    }
    info!("Workers stopped");

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "talentmatch-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    // MinIO needs path-style addressing.
    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
