pub mod config;
pub mod db;
pub mod fetch_log;
pub mod forecast;
pub mod geocoding;
pub mod handlers;
pub mod openapi;
pub mod service;
pub mod snapshot_store;

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: handlers::AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/weather", get(handlers::get_weather))
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
