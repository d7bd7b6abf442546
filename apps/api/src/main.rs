use std::sync::Arc;
use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::AppointmentBoard;
use reference_cell::{EndpointCatalog, LastKnownGoodDirectory, LazyReferenceResolver};
use shared_config::AppConfig;
use shared_database::RestClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic portal API server");

    // Load configuration
    let config = AppConfig::from_env();

    let backend = Arc::new(RestClient::new(&config)?);

    let directory = LastKnownGoodDirectory::from_config(&config).unwrap_or_else(|e| {
        warn!("Ignoring last-known-good directory: {}", e);
        LastKnownGoodDirectory::new()
    });

    let resolver = Arc::new(LazyReferenceResolver::new(
        backend,
        EndpointCatalog::default(),
        Arc::new(directory),
    ));
    let board = Arc::new(AppointmentBoard::new(resolver));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(board)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
