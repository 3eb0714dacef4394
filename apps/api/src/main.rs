use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use shared_cache::ResilientCacheClient;
use shared_config::AppConfig;
use slot_cell::{
    BifrostSlotProvider, ListingServiceResolver, PackageOnboardingResolver, ReferenceClock,
    SlotOrchestrator, SlotServices,
};

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

    info!("Starting PME slot API server");

    // Load configuration
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Cache with background health checks
    let cache = Arc::new(ResilientCacheClient::new(config.redis.clone())?);
    cache.start();

    let services = SlotServices {
        cache: cache.clone(),
        provider: Arc::new(BifrostSlotProvider::new(&config.upstream)?),
        facility_resolver: Arc::new(ListingServiceResolver::new(&config.upstream)?),
        package_resolver: Arc::new(PackageOnboardingResolver::new(&config.upstream, &config.tenants)?),
        clock: Arc::new(ReferenceClock::from_offset_minutes(
            config.slots.reference_utc_offset_minutes,
        )),
    };
    let orchestrator = Arc::new(SlotOrchestrator::new(&config, services));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(orchestrator)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    cache.close().await;
    info!("Slot cache closed");

    served.context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
