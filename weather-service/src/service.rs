use chrono::{Local, Utc};
use common::errors::AppError;
use common::models::{CacheStatus, FetchLogEntry, TIMESTAMP_FORMAT};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::fetch_log::FetchLogStore;
use crate::forecast::OpenMeteoClient;
use crate::geocoding::NominatimClient;
use crate::snapshot_store::SnapshotStore;

/// A weather payload together with how it was obtained
#[derive(Debug)]
pub struct WeatherReport {
    pub payload: Value,
    pub cache: CacheStatus,
}

pub struct WeatherService {
    geocoder: NominatimClient,
    forecast: OpenMeteoClient,
    snapshots: Arc<SnapshotStore>,
    fetch_log: Arc<dyn FetchLogStore>,
}

impl WeatherService {
    pub fn new(
        geocoder: NominatimClient,
        forecast: OpenMeteoClient,
        snapshots: Arc<SnapshotStore>,
        fetch_log: Arc<dyn FetchLogStore>,
    ) -> Self {
        Self {
            geocoder,
            forecast,
            snapshots,
            fetch_log,
        }
    }

    /// Current weather for `city`, served from a fresh snapshot when one exists.
    ///
    /// On a miss the city is geocoded, the forecast fetched, the payload
    /// written to disk and the fetch logged, in that order.
    #[instrument(skip(self))]
    pub async fn current_weather(&self, city: &str) -> Result<WeatherReport, AppError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(AppError::validation("city must not be empty"));
        }

        if let Some(payload) = self.snapshots.lookup_fresh(city, Utc::now()).await {
            info!(city = %city, "Cache hit");
            return Ok(WeatherReport {
                payload,
                cache: CacheStatus::Hit,
            });
        }

        let coordinates = self.geocoder.locate(city).await?;
        let payload = self.forecast.current(coordinates).await?;

        let fetched_at = Utc::now();
        // A failed write still gets logged, just without a file reference.
        let file_path = match self.snapshots.save(city, &payload, fetched_at).await {
            Ok(path) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                error!(city = %city, error = %e, "Failed to write snapshot");
                None
            }
        };

        let entry = FetchLogEntry {
            city: city.to_string(),
            timestamp: fetched_at
                .with_timezone(&Local)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            file_path,
        };
        self.fetch_log.record(&entry).await?;

        info!(city = %city, file_path = ?entry.file_path, "Weather fetched");
        Ok(WeatherReport {
            payload,
            cache: CacheStatus::Miss,
        })
    }

    pub async fn shutdown(&self) {
        self.fetch_log.close().await;
    }
}
