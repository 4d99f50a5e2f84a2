use crate::api::{handlers, middleware, AppState};
use crate::metrics::MetricsLayer;
use crate::websocket::websocket_handler;
use axum::{
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState) -> Router {
    let searches = Router::new()
        .route(
            "/api/v0/searches",
            get(handlers::list_searches).post(handlers::create_search),
        )
        .route(
            "/api/v0/searches/:id",
            get(handlers::get_search)
                .put(handlers::stop_search)
                .delete(handlers::delete_search),
        )
        .route(
            "/api/v0/searches/:id/responses",
            get(handlers::search_responses),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::rate_limit));

    let websocket = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state.websocket.clone());

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::health_check))
        .route("/health/ready", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .merge(searches)
        // Add state
        .with_state(state.clone())
        .merge(websocket)
        // Add middleware
        .layer(MetricsLayer::new())
        .layer(from_fn_with_state(state, middleware::security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
