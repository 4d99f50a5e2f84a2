use anyhow::Context;
use peer_search_manager::{
    api::{build_router, AppState},
    config::Config,
    scheduler::PruneScheduler,
    search::{SearchService, SearchServiceDeps, SimulatedPeerClient, StaticGroupResolver},
    state::{create_store, SearchCache, SearchRepository},
    websocket::WebSocketState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    init_tracing(&config);

    tracing::info!(
        service = %config.observability.service_name,
        "Starting Peer Search Manager v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = peer_search_manager::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        }
    } else {
        tracing::info!("Prometheus metrics disabled in configuration");
    }

    // Initialize storage backend
    tracing::info!("Storage backend: {:?}", config.state.backend);
    let store = create_store(&config.state)
        .await
        .context("failed to initialize search store")?;
    let repository = SearchRepository::new(
        store,
        SearchCache::new(config.search.cache_capacity, config.search.cache_ttl()),
    );

    // Initialize WebSocket state
    let ws_state = Arc::new(WebSocketState::new(config.websocket.clone()));

    let cleanup_state = ws_state.clone();
    tokio::spawn(async move {
        peer_search_manager::websocket::cleanup_task(cleanup_state).await;
    });

    // Search lifecycle
    let search_service = Arc::new(SearchService::new(
        SearchServiceDeps {
            client: Arc::new(SimulatedPeerClient::new(config.simulation.clone())),
            repository,
            broadcaster: ws_state.broadcaster.clone(),
            users: Arc::new(StaticGroupResolver::new(&config.users)),
        },
        config.search.response_throttle(),
    ));
    tracing::info!(
        throttle_ms = config.search.response_throttle_ms,
        "Search service initialized with the simulated peer network"
    );

    let mut scheduler = PruneScheduler::new(search_service.clone(), &config.search).await?;
    scheduler.start().await?;

    let app_state = AppState::new(search_service.clone(), ws_state.clone(), config.clone());
    let app = build_router(app_state);

    // Start HTTP server
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind {}", http_addr))?;

    tracing::info!("HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Search API: http://{}/api/v0/searches", http_addr);
    tracing::info!("   WebSocket Streaming: ws://{}/ws", http_addr);

    axum::serve(
        http_listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutting down gracefully...");
    search_service.shutdown().await;
    scheduler.shutdown().await?;
    ws_state.broadcaster.close("server shutting down");

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "peer_search_manager={},tower_http=info",
            config.observability.log_level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
