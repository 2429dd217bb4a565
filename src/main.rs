use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use cart_auth::auth::{TokenCodec, TokenManager};
use cart_auth::configuration::get_configuration;
use cart_auth::startup::run;
use cart_auth::store::PgRefreshStore;
use cart_auth::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    // Key material is read exactly once and shared read-only from here on
    let signing_key = configuration.jwt.signing_key().map_err(|e| {
        tracing::error!("Failed to load signing key: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Signing key error")
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to migrate the database: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "Database migration error")
        })?;

    tracing::info!("Database connection pool created successfully");

    let store = Arc::new(PgRefreshStore::new(pool));
    let manager = TokenManager::new(TokenCodec::new(&signing_key), store, &configuration.jwt);

    match manager.prune_expired().await {
        Ok(removed) => tracing::info!(removed = removed, "Startup housekeeping done"),
        Err(e) => tracing::warn!(error = %e, "Startup housekeeping failed"),
    }

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(
        listener,
        manager,
        configuration.cookie.clone(),
        configuration.application.subject_header.clone(),
        configuration.application.trusted_peers.clone(),
    )?;

    server.await
}
