mod config;
mod db;
mod errors;
mod llm_client;
mod mailbox;
mod mapping;
mod models;
mod parser;
mod routes;
mod state;
mod store;
mod sync;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::mailbox::gmail::GmailGateway;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::PgStore;
use crate::sync::scheduler::run_scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (panics on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gastos Sync API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL and apply pending migrations
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!().run(&pool).await?;

    // Initialize the mailbox gateway
    let mailbox = GmailGateway::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    );
    info!("Gmail gateway initialized");

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Build app state
    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        mailbox: Arc::new(mailbox),
        llm: Arc::new(llm),
        config: config.clone(),
    };

    // Background scheduler: periodic sync of every active connection
    tokio::spawn(run_scheduler(state.clone()));

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
