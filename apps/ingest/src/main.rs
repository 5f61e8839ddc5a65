mod cache;
mod config;
mod db;
mod errors;
mod llm_client;
mod metrics;
mod posts;
mod reddit;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::SubredditCache;
use crate::config::{Config, LogFormat};
use crate::db::create_pool;
use crate::posts::filter::PostFilter;
use crate::posts::ingest::Ingestor;
use crate::posts::query::QueryService;
use crate::posts::store::{PgPostStore, PostStore};
use crate::posts::summary::Summarizer;
use crate::posts::writer::DedupWriter;
use crate::reddit::RedditClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
    });
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    info!("Starting ingest service v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let store: Arc<dyn PostStore> = Arc::new(PgPostStore::new(db));

    // Initialize Redis (optional)
    let redis = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).context("Invalid REDIS_URL")?;
            info!("Redis client initialized");
            Some(client)
        }
        None => {
            info!("REDIS_URL not set, subreddit cache disabled");
            None
        }
    };
    let cache = SubredditCache::new(redis, config.cache_ttl);

    // Initialize Reddit client
    let reddit = Arc::new(RedditClient::new(config.reddit.clone())?);
    info!(
        "Reddit client initialized ({} requests/min)",
        config.reddit.rate_limit_per_minute
    );

    // Initialize LLM provider
    let llm = llm_client::build_provider(&config.llm).await?;
    info!("LLM provider initialized: {}", llm.name());

    let queries = QueryService::new(store.clone());
    let ingestor = Ingestor::new(
        reddit,
        DedupWriter::new(store.clone()),
        PostFilter::new(config.filter.clone()),
        config.scoring.clone(),
        cache.clone(),
    );

    let metrics = ingestor.metrics();

    // Build app state
    let state = AppState {
        store,
        queries: queries.clone(),
        ingestor: Arc::new(ingestor),
        summarizer: Summarizer::new(queries, llm),
        cache,
        metrics,
    };

    // Build router (correlation ids and request tracing are applied inside)
    let app = build_router(state).layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
