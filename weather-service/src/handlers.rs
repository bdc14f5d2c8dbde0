use axum::{
    extract::{Query, State},
    http::HeaderName,
    response::{IntoResponse, Json},
};
use common::errors::AppError;
use common::models::ErrorResponse;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::service::WeatherService;

pub const CACHE_HEADER: HeaderName = HeaderName::from_static("x-cache");

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WeatherService>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health check")
    )
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "weather-service" }))
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
}

#[utoipa::path(
    get,
    path = "/weather",
    params(
        ("city" = String, Query, description = "City name, matched exactly")
    ),
    responses(
        (status = 200, description = "Current conditions as returned by Open-Meteo; `x-cache` tells whether a stored snapshot was used"),
        (status = 400, description = "Missing or blank city", body = ErrorResponse),
        (status = 404, description = "City could not be geocoded", body = ErrorResponse),
        (status = 502, description = "Geocoding or weather upstream failed", body = ErrorResponse),
        (status = 504, description = "Upstream timed out", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "weather"
)]
pub async fn get_weather(
    State(state): State<AppState>,
    Query(params): Query<WeatherQuery>,
) -> Result<impl IntoResponse, AppError> {
    let city = params
        .city
        .ok_or_else(|| AppError::validation("city query parameter is required"))?;

    info!(city = %city, "Weather request received");

    let report = state.service.current_weather(&city).await?;

    Ok(([(CACHE_HEADER, report.cache.as_str())], Json(report.payload)))
}
