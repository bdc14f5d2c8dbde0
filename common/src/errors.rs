use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::models::ErrorResponse;

pub const GEOCODING_FAILED: &str = "Failed to get latitude and longitude.";
pub const WEATHER_FAILED: &str = "Failed to get weather data.";

/// Structured error types for the weather service
#[derive(Error, Debug)]
pub enum AppError {
    /// The geocoder answered but had no match for the city
    #[error("{}", GEOCODING_FAILED)]
    LocationNotFound(String),

    /// The geocoder could not be reached or returned something unusable
    #[error("{}", GEOCODING_FAILED)]
    GeocodingUnavailable(String),

    #[error("{}", GEOCODING_FAILED)]
    GeocodingTimeout(String),

    #[error("{}", WEATHER_FAILED)]
    WeatherUnavailable(String),

    #[error("{}", WEATHER_FAILED)]
    WeatherTimeout(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::HttpError {
            status,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::TimeoutError(message.into())
    }

    pub fn location_not_found(city: impl Into<String>) -> Self {
        Self::LocationNotFound(city.into())
    }

    pub fn geocoding(detail: impl Into<String>) -> Self {
        Self::GeocodingUnavailable(detail.into())
    }

    pub fn weather(detail: impl Into<String>) -> Self {
        Self::WeatherUnavailable(detail.into())
    }

    /// Re-tag an outbound HTTP failure as a geocoding failure, keeping timeouts apart.
    pub fn into_geocoding(self) -> Self {
        match self {
            Self::TimeoutError(detail) => Self::GeocodingTimeout(detail),
            other => Self::GeocodingUnavailable(other.to_string()),
        }
    }

    /// Re-tag an outbound HTTP failure as a weather failure, keeping timeouts apart.
    pub fn into_weather(self) -> Self {
        match self {
            Self::TimeoutError(detail) => Self::WeatherTimeout(detail),
            other => Self::WeatherUnavailable(other.to_string()),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::DatabaseError(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::LocationNotFound(_) => StatusCode::NOT_FOUND,
            AppError::GeocodingUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::GeocodingTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::WeatherUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::WeatherTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::TimeoutError(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::HttpError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::NetworkError(_) => StatusCode::BAD_GATEWAY,
            AppError::ParseError(_) => StatusCode::BAD_GATEWAY,
            AppError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = ?self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = ?self, "Request rejected");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_failures_keep_their_literal_messages() {
        assert_eq!(
            AppError::location_not_found("Atlantis").to_string(),
            "Failed to get latitude and longitude."
        );
        assert_eq!(
            AppError::geocoding("connection refused").to_string(),
            "Failed to get latitude and longitude."
        );
        assert_eq!(
            AppError::weather("empty body").to_string(),
            "Failed to get weather data."
        );
    }

    #[test]
    fn each_kind_has_its_own_status() {
        assert_eq!(
            AppError::location_not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::geocoding("x").status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::weather("x").status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::timeout("x").status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::database("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::http(42, "x").status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn upstream_timeouts_keep_their_message_and_answer_504() {
        let geocoding = AppError::timeout("Request to /search timed out").into_geocoding();
        assert!(matches!(geocoding, AppError::GeocodingTimeout(_)));
        assert_eq!(geocoding.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(geocoding.to_string(), "Failed to get latitude and longitude.");

        let weather = AppError::timeout("Request to /v1/forecast timed out").into_weather();
        assert!(matches!(weather, AppError::WeatherTimeout(_)));
        assert_eq!(weather.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(weather.to_string(), "Failed to get weather data.");
    }

    #[test]
    fn other_upstream_failures_stay_bad_gateway() {
        let geocoding = AppError::http(503, "HTTP error: 503").into_geocoding();
        assert!(matches!(geocoding, AppError::GeocodingUnavailable(ref d) if d.contains("503")));
        assert_eq!(geocoding.status_code(), StatusCode::BAD_GATEWAY);

        let weather = AppError::http(500, "HTTP error: 500").into_weather();
        assert_eq!(weather.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn io_errors_become_storage_errors() {
        let err: AppError = std::io::Error::other("disk full").into();
        assert!(matches!(err, AppError::StorageError(ref m) if m.contains("disk full")));
    }
}
