use std::env;
use std::path::PathBuf;

use common::http_client::DEFAULT_USER_AGENT;

pub struct Config {
    pub port: u16,
    pub storage_dir: PathBuf,
    /// Postgres connection string for the fetch log. Kept out of source; when
    /// unset the log is held in memory.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_acquire_timeout_seconds: u64,
    pub nominatim_url: String,
    pub open_meteo_url: String,
    pub cache_ttl_seconds: u64,
    pub http_timeout_seconds: u64,
    pub user_agent: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3002),
            storage_dir: env::var("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            db_acquire_timeout_seconds: env::var("DB_ACQUIRE_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            nominatim_url: env::var("NOMINATIM_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
            open_meteo_url: env::var("OPEN_METEO_URL")
                .unwrap_or_else(|_| "https://api.open-meteo.com/v1/forecast".to_string()),
            cache_ttl_seconds: env::var("CACHE_TTL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300), // 5 minutes default
            http_timeout_seconds: env::var("HTTP_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            user_agent: env::var("HTTP_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
        }
    }
}
