use common::errors::AppError;
use common::http_client::HttpClient;
use common::models::Coordinates;
use serde_json::Value;
use tracing::{info, instrument, warn};

const CURRENT_FIELDS: &str = "temperature_2m,rain,showers,snowfall";

/// Current-conditions client for the Open-Meteo forecast API.
///
/// The upstream body is handed back untouched so that callers see exactly the
/// fields Open-Meteo chose to return.
pub struct OpenMeteoClient {
    http_client: HttpClient,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(http_client: HttpClient, base_url: String) -> Self {
        Self {
            http_client,
            base_url,
        }
    }

    #[instrument(skip(self), fields(latitude = coordinates.latitude, longitude = coordinates.longitude))]
    pub async fn current(&self, coordinates: Coordinates) -> Result<Value, AppError> {
        let url = format!(
            "{}?latitude={}&longitude={}&current={}&timezone=auto&forecast_days=1",
            self.base_url, coordinates.latitude, coordinates.longitude, CURRENT_FIELDS
        );

        let body: Value = self.http_client.get_json(&url).await.map_err(|e| {
            warn!(error = %e, "Weather request failed");
            e.into_weather()
        })?;

        if is_empty(&body) {
            warn!("Weather service returned an empty payload");
            return Err(AppError::weather("empty payload"));
        }

        info!("Fetched current weather");
        Ok(body)
    }
}

fn is_empty(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
