use common::http_client::HttpClient;
use common::tracing::{LogFormat, init_tracing};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use weather_service::config::Config;
use weather_service::db;
use weather_service::fetch_log::{FetchLogStore, MemoryFetchLogStore, PgFetchLogStore};
use weather_service::forecast::OpenMeteoClient;
use weather_service::geocoding::NominatimClient;
use weather_service::handlers::AppState;
use weather_service::service::WeatherService;
use weather_service::snapshot_store::SnapshotStore;
use weather_service::create_router;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(LogFormat::from_env());

    let config = Config::from_env();

    let fetch_log: Arc<dyn FetchLogStore> = match &config.database_url {
        Some(url) => {
            let settings = db::PoolSettings {
                max_connections: config.db_max_connections,
                acquire_timeout: Duration::from_secs(config.db_acquire_timeout_seconds),
            };
            Arc::new(PgFetchLogStore::new(db::create_pool(url, &settings).await?))
        }
        None => {
            warn!("DATABASE_URL not set, fetch log is kept in memory only");
            Arc::new(MemoryFetchLogStore::new())
        }
    };

    let http_client = HttpClient::new(config.http_timeout_seconds, &config.user_agent)?;
    let snapshots = Arc::new(
        SnapshotStore::open(config.storage_dir.clone(), config.cache_ttl_seconds).await,
    );
    let service = Arc::new(WeatherService::new(
        NominatimClient::new(http_client.clone(), config.nominatim_url.clone()),
        OpenMeteoClient::new(http_client, config.open_meteo_url.clone()),
        snapshots,
        fetch_log,
    ));

    let app = create_router(AppState {
        service: service.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Weather service starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown().await;
    info!("Weather service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }

    warn!("Shutting down gracefully...");
}
