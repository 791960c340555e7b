use axum::{
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::rtc_ws::rtc_ws_handler;
use super::ws::ws_handler;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/info", get(handlers::system_info))
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/:id", get(handlers::get_session))
        // Proctor event stream
        .route("/ws", any(ws_handler));

    // Signaling, one peer connection per socket
    let rtc_routes = Router::new()
        .route("/ws/rtc", any(rtc_ws_handler))
        .route("/ws/rtc/", any(rtc_ws_handler));

    Router::new()
        .nest("/api", api_routes)
        .merge(rtc_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
