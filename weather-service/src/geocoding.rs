use common::errors::AppError;
use common::http_client::HttpClient;
use common::models::Coordinates;
use serde::Deserialize;
use tracing::{info, instrument, warn};

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Forward geocoding against a Nominatim `/search` endpoint
pub struct NominatimClient {
    http_client: HttpClient,
    base_url: String,
}

impl NominatimClient {
    pub fn new(http_client: HttpClient, base_url: String) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a city name to the coordinates of Nominatim's best match.
    #[instrument(skip(self), fields(city = %city))]
    pub async fn locate(&self, city: &str) -> Result<Coordinates, AppError> {
        let url = format!(
            "{}/search?q={}&format=json&limit=1",
            self.base_url,
            urlencoding::encode(city)
        );

        let places: Vec<NominatimPlace> = self.http_client.get_json(&url).await.map_err(|e| {
            warn!(city = %city, error = %e, "Geocoding request failed");
            e.into_geocoding()
        })?;

        let Some(place) = places.into_iter().next() else {
            info!(city = %city, "No geocoding match");
            return Err(AppError::location_not_found(city));
        };

        let coordinates = parse_coordinates(&place)?;
        info!(
            city = %city,
            latitude = coordinates.latitude,
            longitude = coordinates.longitude,
            place = place.display_name.as_deref().unwrap_or_default(),
            "Geocoded city"
        );

        Ok(coordinates)
    }
}

fn parse_coordinates(place: &NominatimPlace) -> Result<Coordinates, AppError> {
    let latitude = place
        .lat
        .trim()
        .parse::<f64>()
        .map_err(|e| AppError::geocoding(format!("invalid latitude {:?}: {}", place.lat, e)))?;
    let longitude = place
        .lon
        .trim()
        .parse::<f64>()
        .map_err(|e| AppError::geocoding(format!("invalid longitude {:?}: {}", place.lon, e)))?;

    Ok(Coordinates {
        latitude,
        longitude,
    })
}
